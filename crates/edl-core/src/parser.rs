//! Parser for EDM `.edl` text → `EdmScreen`.
//!
//! An explicit scanner with a byte cursor. Line-level grammar (size lines,
//! indexed list entries, object headers) is parsed with `winnow`; construct
//! boundaries (`beginGroup`/`endGroup` nesting) are found with a depth
//! counter. Unrecognized text never aborts a parse: the cursor moves to the
//! next line and a diagnostic is recorded.
//!
//! Handles: the screen-properties block, `object` constructs, nested
//! `activeGroupClass` containers, multi-line `key { ... }` properties,
//! comments, and symbol objects (expanded through a `SymbolSource`).

use crate::error::{ConvertError, Diagnostic, Severity};
use crate::model::*;
use crate::palette::ColorTable;
use crate::symbol;
use winnow::ascii::{digit1, multispace0, space1};
use winnow::combinator::{alt, delimited, opt};
use winnow::error::ContextError;
use winnow::prelude::*;
// The combinator trait is shadowed by the `Parser` struct below.
use winnow::Parser as _;
use winnow::token::{one_of, rest, take_while};

/// Lines of a property block that never become properties.
const IGNORED_PREFIXES: &[&str] = &["#", "x ", "y ", "w ", "h ", "major ", "minor ", "release "];

/// Nested symbol files deeper than this are not expanded.
const MAX_SYMBOL_DEPTH: usize = 8;

const BEGIN_OBJECT: &str = "beginObjectProperties";
const END_OBJECT: &str = "endObjectProperties";
const BEGIN_GROUP: &str = "beginGroup";
const END_GROUP: &str = "endGroup";

/// Provides the (already macro-substituted and reference-rewritten) text of
/// symbol files by name.
pub trait SymbolSource {
    /// `Ok(None)` when the file cannot be found.
    fn load(&mut self, file: &str) -> Result<Option<String>, ConvertError>;
}

/// Result of parsing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScreen {
    pub screen: EdmScreen,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a screen without symbol expansion support.
#[must_use = "parsing result should be used"]
pub fn parse_screen(text: &str, colors: &ColorTable) -> Result<ParsedScreen, ConvertError> {
    Parser::new(colors).parse(text)
}

pub struct Parser<'a> {
    colors: &'a ColorTable,
    symbols: Option<&'a mut dyn SymbolSource>,
    diagnostics: Vec<Diagnostic>,
    symbol_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(colors: &'a ColorTable) -> Self {
        Self {
            colors,
            symbols: None,
            diagnostics: Vec::new(),
            symbol_depth: 0,
        }
    }

    pub fn with_symbols(mut self, source: &'a mut dyn SymbolSource) -> Self {
        self.symbols = Some(source);
        self
    }

    /// Parse a whole file: the mandatory screen block, then the widget forest.
    pub fn parse(mut self, text: &str) -> Result<ParsedScreen, ConvertError> {
        let (screen_text, body_start) =
            screen_block(text).ok_or(ConvertError::MissingScreenProperties)?;

        let size = scan_size_strict(screen_text)?;
        let properties = scan_properties(screen_text);
        let background = properties
            .text("bgColor")
            .map(|spec| self.colors.resolve_or_default(spec));

        let mut root = EdmGroup::new(size, properties);
        self.parse_body(&text[body_start..], &mut root)?;
        log::debug!(
            "parsed screen {}x{} with {} objects",
            size.width,
            size.height,
            root.object_count()
        );

        Ok(ParsedScreen {
            screen: EdmScreen { root, background },
            diagnostics: self.diagnostics,
        })
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => log::warn!("{}", diagnostic.message),
            Severity::Info => log::info!("{}", diagnostic.message),
        }
        self.diagnostics.push(diagnostic);
    }

    // ─── Body scanner ───────────────────────────────────────────────────

    /// Parse objects and groups from `text` into `parent`.
    ///
    /// Every iteration advances `pos`.
    fn parse_body(&mut self, text: &str, parent: &mut EdmGroup) -> Result<(), ConvertError> {
        let mut pos = 0;
        while pos < text.len() {
            pos = skip_ws_and_comments(text, pos);
            if pos >= text.len() {
                break;
            }

            let mut cursor = &text[pos..];
            let class = parse_object_header.parse_next(&mut cursor).ok();
            let consumed = text.len() - pos - cursor.len();

            pos = match class {
                Some(class) if class.eq_ignore_ascii_case("activeGroupClass") => {
                    match self.parse_group(text, pos)? {
                        Some((group, end)) => {
                            parent.push(EdmNode::Group(group));
                            end
                        }
                        None => {
                            let snippet = snippet(&text[pos..]);
                            self.note(Diagnostic::warning(
                                "malformed-group",
                                format!("skipping malformed group: '{snippet}'"),
                            ));
                            next_line(text, pos)
                        }
                    }
                }
                Some(class) => match object_span(text, pos + consumed) {
                    Some((body, end)) => {
                        let node = self.build_object(class, body)?;
                        parent.push(node);
                        end
                    }
                    None => {
                        self.note(Diagnostic::warning(
                            "unrecognized-text",
                            format!("object {class} has no property block"),
                        ));
                        next_line(text, pos)
                    }
                },
                None => {
                    let snippet = snippet(&text[pos..]);
                    self.note(Diagnostic::warning(
                        "unrecognized-text",
                        format!("unrecognized text: '{snippet}'"),
                    ));
                    next_line(text, pos)
                }
            };
        }
        Ok(())
    }

    /// Parse a group construct starting at `start`. Returns the group and the
    /// cursor after it, or `None` when its delimiters do not balance.
    fn parse_group(
        &mut self,
        text: &str,
        start: usize,
    ) -> Result<Option<(EdmGroup, usize)>, ConvertError> {
        let Some(begin_props) = find_from(text, BEGIN_OBJECT, start) else {
            return Ok(None);
        };
        let header_start = begin_props + BEGIN_OBJECT.len();
        let Some(begin_group) = find_from(text, BEGIN_GROUP, header_start) else {
            return Ok(None);
        };
        let Some(end_group) = find_matching_end_group(text, begin_group) else {
            return Ok(None);
        };
        let after_group = end_group + END_GROUP.len();

        // Properties may follow endGroup, up to this group's own
        // endObjectProperties, but never past the next object.
        let next_object = find_object_line(text, after_group).unwrap_or(text.len());
        let (suffix, end) = match find_from(text, END_OBJECT, after_group) {
            Some(end_props) if end_props < next_object => {
                (&text[after_group..end_props], end_props + END_OBJECT.len())
            }
            _ => ("", after_group),
        };

        let header = format!("{}\n{}", &text[header_start..begin_group], suffix);
        let bounds = self.scan_size(&header, "activeGroupClass");
        let mut group = EdmGroup::new(bounds, scan_properties(&header));
        self.parse_body(&text[begin_group + BEGIN_GROUP.len()..end_group], &mut group)?;
        log::trace!("group with {} nodes", group.nodes.len());
        Ok(Some((group, end)))
    }

    fn build_object(&mut self, class: &str, body: &str) -> Result<EdmNode, ConvertError> {
        let name = class.replace(':', "");
        let bounds = self.scan_size(body, &name);
        let properties = scan_properties(body);

        if symbol::is_symbol_class(&name) {
            return self.expand_symbol(&properties, bounds).map(EdmNode::Group);
        }
        Ok(EdmNode::Object(EdmObject::new(name, bounds, properties)))
    }

    fn expand_symbol(
        &mut self,
        properties: &Properties,
        bounds: Bounds,
    ) -> Result<EdmGroup, ConvertError> {
        let empty = || EdmGroup::new(bounds, Properties::new());

        let Some(file) = symbol::symbol_file(properties) else {
            self.note(Diagnostic::warning("symbol-file", "symbol object has no file"));
            return Ok(empty());
        };
        if self.symbol_depth >= MAX_SYMBOL_DEPTH {
            self.note(Diagnostic::warning(
                "symbol-depth",
                format!("symbol {file} nested too deeply; not expanded"),
            ));
            return Ok(empty());
        }
        let loaded = match self.symbols.as_deref_mut() {
            Some(source) => source.load(&file)?,
            None => None,
        };
        let Some(embedded_text) = loaded else {
            self.note(Diagnostic::warning(
                "symbol-file",
                format!("symbol file {file} not found"),
            ));
            return Ok(empty());
        };

        let body_start = screen_block(&embedded_text).map_or(0, |(_, end)| end);
        let mut embedded = EdmGroup::default();
        self.symbol_depth += 1;
        let parsed = self.parse_body(&embedded_text[body_start..], &mut embedded);
        self.symbol_depth -= 1;
        parsed?;

        let available = embedded.nodes.len();
        log::debug!("expanding symbol {file} with {available} states");
        let group = symbol::expand(embedded, properties, bounds)?;
        if group.nodes.len() < available {
            self.note(Diagnostic::info(
                "symbol-states",
                format!("symbol {file}: kept {} of {available} state groups", group.nodes.len()),
            ));
        }
        Ok(group)
    }

    /// Lenient size scan: a missing value defaults to 1 with a diagnostic.
    fn scan_size(&mut self, text: &str, owner: &str) -> Bounds {
        let found = scan_size_values(text);
        let mut values = [1; 4];
        for (i, name) in SIZE_NAMES.iter().enumerate() {
            match found[i] {
                Some(v) => values[i] = v,
                None => self.note(Diagnostic::warning(
                    "default-size",
                    format!("{owner}: missing size property '{name}' (likely a macro); using 1"),
                )),
            }
        }
        Bounds::new(values[0], values[1], values[2], values[3])
    }
}

// ─── Construct boundaries ───────────────────────────────────────────────

/// Text between the screen-properties markers and the offset after them.
fn screen_block(text: &str) -> Option<(&str, usize)> {
    let begin = text.find("beginScreenProperties")? + "beginScreenProperties".len();
    let end = find_from(text, "endScreenProperties", begin)?;
    Some((&text[begin..end], end + "endScreenProperties".len()))
}

/// Body of an object's property block starting the search at `from`, and
/// the offset after its `endObjectProperties`.
fn object_span(text: &str, from: usize) -> Option<(&str, usize)> {
    let mut cursor = &text[from..];
    let _ = (multispace0::<_, ContextError>, BEGIN_OBJECT)
        .parse_next(&mut cursor)
        .ok()?;
    let body_start = text.len() - cursor.len();
    let end = find_from(text, END_OBJECT, body_start)?;
    Some((&text[body_start..end], end + END_OBJECT.len()))
}

/// Offset of the `endGroup` matching the `beginGroup` at `begin`.
///
/// Returns `None` when the delimiters do not balance.
pub fn find_matching_end_group(text: &str, begin: usize) -> Option<usize> {
    let mut pos = begin + BEGIN_GROUP.len();
    let mut depth = 1usize;
    while pos < text.len() {
        let next_end = find_from(text, END_GROUP, pos)?;
        match find_from(text, BEGIN_GROUP, pos) {
            Some(next_begin) if next_begin < next_end => {
                depth += 1;
                pos = next_begin + BEGIN_GROUP.len();
            }
            _ => {
                depth -= 1;
                if depth == 0 {
                    return Some(next_end);
                }
                pos = next_end + END_GROUP.len();
            }
        }
    }
    None
}

fn find_from(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|i| i + from)
}

/// Offset of the first line at or after `from` that opens an object.
fn find_object_line(text: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while pos < text.len() {
        let line = &text[pos..next_line(text, pos)];
        let trimmed = line.trim_start();
        if trimmed.starts_with("object ") || trimmed.starts_with("object\t") {
            return Some(pos + line.len() - trimmed.len());
        }
        pos = next_line(text, pos);
    }
    None
}

fn next_line(text: &str, pos: usize) -> usize {
    find_from(text, "\n", pos).map_or(text.len(), |i| i + 1)
}

fn skip_ws_and_comments(text: &str, mut pos: usize) -> usize {
    loop {
        let rest = &text[pos..];
        let trimmed = rest.trim_start();
        pos += rest.len() - trimmed.len();
        if trimmed.starts_with('#') {
            pos = next_line(text, pos);
            continue;
        }
        return pos;
    }
}

fn snippet(text: &str) -> &str {
    let line = text.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(80) {
        Some((i, _)) => &line[..i],
        None => line,
    }
}

// ─── Low-level parsers ──────────────────────────────────────────────────

/// `object <Class>[:discriminator]`
fn parse_object_header<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    let _ = "object".parse_next(input)?;
    let _ = space1.parse_next(input)?;
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == ':').parse_next(input)
}

/// `x 10`, `w -3` …
fn parse_size_line(input: &mut &str) -> ModalResult<(char, i32)> {
    let key = one_of(['x', 'y', 'w', 'h']).parse_next(input)?;
    let _ = space1.parse_next(input)?;
    let value = (opt('-'), digit1)
        .take()
        .try_map(str::parse::<i32>)
        .parse_next(input)?;
    Ok((key, value))
}

/// `"3" value` or `3 value` inside a list block.
fn parse_indexed_line<'a>(input: &mut &'a str) -> ModalResult<(usize, &'a str)> {
    let index = alt((delimited('"', digit1, '"'), digit1))
        .try_map(str::parse::<usize>)
        .parse_next(input)?;
    let _ = space1.parse_next(input)?;
    let value = rest.parse_next(input)?;
    Ok((index, value))
}

// ─── Property scanning ──────────────────────────────────────────────────

const SIZE_NAMES: [&str; 4] = ["x", "y", "width", "height"];

/// First value of each of x, y, w, h found at the start of a line.
fn scan_size_values(text: &str) -> [Option<i32>; 4] {
    let mut found = [None; 4];
    for line in text.lines() {
        let mut input = line.trim_start();
        if let Ok((key, value)) = parse_size_line.parse_next(&mut input) {
            let slot = match key {
                'x' => 0,
                'y' => 1,
                'w' => 2,
                _ => 3,
            };
            found[slot].get_or_insert(value);
        }
    }
    found
}

/// Strict size scan used for the screen block.
fn scan_size_strict(text: &str) -> Result<Bounds, ConvertError> {
    let found = scan_size_values(text);
    let mut values = [0; 4];
    for (i, name) in SIZE_NAMES.iter().enumerate() {
        values[i] = found[i].ok_or(ConvertError::MissingSizeProperty(name))?;
    }
    Ok(Bounds::new(values[0], values[1], values[2], values[3]))
}

/// Generic `key value` / bare `key` / `key { ... }` scanner.
pub fn scan_properties(text: &str) -> Properties {
    let mut properties = Properties::new();
    let mut block: Option<(String, Vec<String>)> = None;

    for raw in text.lines() {
        let line = raw.trim();

        if let Some((key, lines)) = block.as_mut() {
            if line == "}" {
                let lines = std::mem::take(lines);
                properties.insert(std::mem::take(key), PropValue::List(strip_indices(lines)));
                block = None;
            } else if !line.is_empty() {
                lines.push(line.to_string());
            }
            continue;
        }

        if line.is_empty() || IGNORED_PREFIXES.iter().any(|p| line.starts_with(p)) {
            continue;
        }

        match line.split_once(char::is_whitespace) {
            Some((key, value)) => {
                let value = value.trim();
                if value == "{" {
                    block = Some((key.to_string(), Vec::new()));
                } else {
                    properties.insert(key.to_string(), PropValue::Str(strip_quotes(value).to_string()));
                }
            }
            None if line.len() > 1 && line.ends_with('{') => {
                block = Some((line[..line.len() - 1].to_string(), Vec::new()));
            }
            None => {
                properties.insert(line.to_string(), PropValue::Flag);
            }
        }
    }

    if let Some((key, lines)) = block {
        log::warn!("unterminated list property '{key}'");
        properties.insert(key, PropValue::List(strip_indices(lines)));
    }

    properties
}

/// Strip surrounding spaces and quotes, as EDM writes string values.
fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c| c == ' ' || c == '"')
}

/// Drop `"<index>"` prefixes when the indices run densely from 0; otherwise
/// keep the lines as written.
pub fn strip_indices(lines: Vec<String>) -> Vec<String> {
    let mut values = Vec::with_capacity(lines.len());
    for (expected, line) in lines.iter().enumerate() {
        let mut input = line.as_str();
        match parse_indexed_line.parse_next(&mut input) {
            Ok((index, value)) if index == expected => values.push(strip_quotes(value).to_string()),
            _ => return lines.into_iter().map(unquote_whole).collect(),
        }
    }
    values
}

/// Remove quotes only when they wrap the entire line.
fn unquote_whole(line: String) -> String {
    let inner = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'));
    match inner {
        Some(inner) => inner.to_string(),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = "beginScreenProperties\nx 0\ny 0\nw 800\nh 600\nendScreenProperties";

    fn parse(text: &str) -> ParsedScreen {
        parse_screen(text, &ColorTable::default()).expect("parses")
    }

    fn object(node: &EdmNode) -> &EdmObject {
        match node {
            EdmNode::Object(o) => o,
            EdmNode::Group(_) => panic!("expected object"),
        }
    }

    fn group(node: &EdmNode) -> &EdmGroup {
        match node {
            EdmNode::Group(g) => g,
            EdmNode::Object(_) => panic!("expected group"),
        }
    }

    #[test]
    fn parse_minimal_screen() {
        let parsed = parse(MINIMAL);
        assert_eq!(parsed.screen.width(), 800);
        assert_eq!(parsed.screen.height(), 600);
        assert!(parsed.screen.root.nodes.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn missing_screen_block_is_fatal() {
        let err = parse_screen("object foo\n", &ColorTable::default()).unwrap_err();
        assert!(matches!(err, ConvertError::MissingScreenProperties));
    }

    #[test]
    fn missing_screen_size_is_fatal() {
        let text = "beginScreenProperties\nx 0\ny 0\nw 800\nendScreenProperties";
        let err = parse_screen(text, &ColorTable::default()).unwrap_err();
        assert!(matches!(err, ConvertError::MissingSizeProperty("height")));
    }

    #[test]
    fn screen_properties_and_background() {
        let text = "beginScreenProperties\nmajor 4\nx 0\ny 0\nw 10\nh 10\n\
                    title \"Main Screen\"\nbgColor rgb 10 20 30\nshowGrid\nendScreenProperties";
        let parsed = parse(text);
        let props = parsed.screen.properties();
        assert_eq!(props.text("title"), Some("Main Screen"));
        assert_eq!(props.get("showGrid"), Some(&PropValue::Flag));
        assert!(!props.contains_key("major"));
        assert_eq!(
            parsed.screen.background,
            Some(crate::palette::Rgba::new(10, 20, 30, 255))
        );
    }

    #[test]
    fn parse_object_with_colon_class() {
        let text = format!(
            "{MINIMAL}\n# widgets\nobject activeXTextDspClass:noedit\nbeginObjectProperties\n\
             major 4\nx 10\ny 20\nw 30\nh 40\ncontrolPv \"PV:1\"\neditable\nendObjectProperties\n"
        );
        let parsed = parse(&text);
        let obj = object(&parsed.screen.root.nodes[0]);
        assert_eq!(obj.name, "activeXTextDspClassnoedit");
        assert_eq!(obj.bounds, Bounds::new(10, 20, 30, 40));
        assert_eq!(obj.properties.text("controlPv"), Some("PV:1"));
        assert!(obj.properties.flag("editable"));
    }

    #[test]
    fn line_parsers_consume_their_tokens() {
        let mut input = "object activeMenuButtonClass:ext\nbeginObjectProperties";
        assert_eq!(
            parse_object_header.parse_next(&mut input).ok(),
            Some("activeMenuButtonClass:ext")
        );
        assert!(input.starts_with('\n'));

        let mut input = "w -12";
        assert_eq!(parse_size_line.parse_next(&mut input).ok(), Some(('w', -12)));
        assert!(parse_size_line.parse_next(&mut "width 3").is_err());

        let mut input = "\"2\" \"STOP\"";
        assert_eq!(parse_indexed_line.parse_next(&mut input).ok(), Some((2, "\"STOP\"")));
    }

    #[test]
    fn parse_nested_groups() {
        let text = format!(
            "{MINIMAL}
object activeGroupClass
beginObjectProperties
major 4
x 5
y 6
w 100
h 50

beginGroup

object activeRectangleClass
beginObjectProperties
x 1
y 2
w 3
h 4
endObjectProperties

object activeGroupClass
beginObjectProperties
x 7
y 8
w 9
h 10

beginGroup

object activeCircleClass
beginObjectProperties
x 0
y 0
w 5
h 5
endObjectProperties

endGroup

visPv \"INNER\"
endObjectProperties

endGroup

visPv \"OUTER\"
visMin \"1\"
endObjectProperties

object activeXTextClass
beginObjectProperties
x 0
y 0
w 1
h 1
endObjectProperties
"
        );
        let parsed = parse(&text);
        let nodes = &parsed.screen.root.nodes;
        assert_eq!(nodes.len(), 2);

        let outer = group(&nodes[0]);
        assert_eq!(outer.bounds, Bounds::new(5, 6, 100, 50));
        assert_eq!(outer.properties.text("visPv"), Some("OUTER"));
        assert_eq!(outer.properties.text("visMin"), Some("1"));
        assert_eq!(outer.nodes.len(), 2);
        assert_eq!(object(&outer.nodes[0]).name, "activeRectangleClass");

        let inner = group(&outer.nodes[1]);
        assert_eq!(inner.properties.text("visPv"), Some("INNER"));
        assert_eq!(object(&inner.nodes[0]).name, "activeCircleClass");

        assert_eq!(object(&nodes[1]).name, "activeXTextClass");
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn group_suffix_may_mention_object() {
        let text = format!(
            "{MINIMAL}
object activeGroupClass
beginObjectProperties
x 5
y 6
w 100
h 50

beginGroup

object activeRectangleClass
beginObjectProperties
x 1
y 2
w 3
h 4
endObjectProperties

endGroup

# object list follows
visPv \"object:STATE\"
endObjectProperties

object activeXTextClass
beginObjectProperties
x 0
y 0
w 1
h 1
endObjectProperties
"
        );
        let parsed = parse(&text);
        let nodes = &parsed.screen.root.nodes;
        assert_eq!(nodes.len(), 2);
        assert_eq!(group(&nodes[0]).properties.text("visPv"), Some("object:STATE"));
        assert_eq!(object(&nodes[1]).name, "activeXTextClass");
        assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
    }

    #[test]
    fn object_line_must_open_the_line() {
        let text = "visPv \"object:PV\"\n  object activeLineClass\n";
        assert_eq!(find_object_line(text, 0), Some(text.find("object act").unwrap()));
        assert_eq!(find_object_line("x 1\nobjects\n", 0), None);
    }

    #[test]
    fn matching_end_group_tracks_depth() {
        let text = "beginGroup a beginGroup b endGroup c endGroup d endGroup";
        let end = find_matching_end_group(text, 0).expect("balanced");
        assert_eq!(&text[end..end + END_GROUP.len() + 2], "endGroup d");
        assert_eq!(find_matching_end_group("beginGroup x beginGroup endGroup", 0), None);
    }

    #[test]
    fn unbalanced_group_is_skipped() {
        let text = format!(
            "{MINIMAL}\nobject activeGroupClass\nbeginObjectProperties\nx 1\ny 1\nw 1\nh 1\n\
             beginGroup\nobject activeRectangleClass\nbeginObjectProperties\nx 1\ny 1\nw 1\nh 1\n\
             endObjectProperties\n"
        );
        let parsed = parse(&text);
        assert!(parsed.diagnostics.iter().any(|d| d.rule == "malformed-group"));
        // Scanning resumes on the next line, so the inner rectangle survives.
        assert_eq!(parsed.screen.root.nodes.len(), 1);
        assert_eq!(object(&parsed.screen.root.nodes[0]).name, "activeRectangleClass");
    }

    #[test]
    fn unrecognized_text_advances() {
        let text = format!(
            "{MINIMAL}\ngarbage line here\nobject activeRectangleClass\nbeginObjectProperties\n\
             x 1\ny 1\nw 1\nh 1\nendObjectProperties\n"
        );
        let parsed = parse(&text);
        assert_eq!(parsed.screen.root.nodes.len(), 1);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].rule, "unrecognized-text");
    }

    #[test]
    fn macro_sized_object_defaults_to_one() {
        let text = format!(
            "{MINIMAL}\nobject activeRectangleClass\nbeginObjectProperties\n\
             x ${{X}}\ny 2\nw 3\nh 4\nendObjectProperties\n"
        );
        let parsed = parse(&text);
        let obj = object(&parsed.screen.root.nodes[0]);
        assert_eq!(obj.bounds, Bounds::new(1, 2, 3, 4));
        assert_eq!(parsed.diagnostics[0].rule, "default-size");
    }

    #[test]
    fn multi_line_list_strips_dense_indices() {
        let props = scan_properties("value {\n  \"0\" a\n  \"1\" b\n  \"2\" c\n}\n");
        assert_eq!(props.list("value"), Some(&["a", "b", "c"].map(String::from)[..]));
    }

    #[test]
    fn multi_line_list_keeps_sparse_indices() {
        let props = scan_properties("value {\n  \"0\" a\n  \"2\" c\n}\n");
        assert_eq!(
            props.list("value"),
            Some(&["\"0\" a", "\"2\" c"].map(String::from)[..])
        );
        let dup = scan_properties("value {\n  \"0\" a\n  \"0\" b\n}\n");
        assert_eq!(
            dup.list("value"),
            Some(&["\"0\" a", "\"0\" b"].map(String::from)[..])
        );
    }

    #[test]
    fn multi_line_plain_values() {
        let props = scan_properties("value {\n  \"Hello world\"\n}\nxPoints {\n  10\n  20\n}\n");
        assert_eq!(props.list("value"), Some(&["Hello world".to_string()][..]));
        assert_eq!(props.list("xPoints"), Some(&["10", "20"].map(String::from)[..]));
    }

    #[test]
    fn unquoted_indices_are_stripped() {
        let props = scan_properties("symbols {\n  0 \"P=A\"\n  1 \"P=B\"\n}\n");
        assert_eq!(props.list("symbols"), Some(&["P=A", "P=B"].map(String::from)[..]));
    }

    #[test]
    fn later_key_overrides_earlier() {
        let props = scan_properties("font \"a\"\nfont \"b\"\n");
        assert_eq!(props.text("font"), Some("b"));
        assert_eq!(props.len(), 1);
    }

    struct OneSymbol;

    impl SymbolSource for OneSymbol {
        fn load(&mut self, file: &str) -> Result<Option<String>, ConvertError> {
            assert_eq!(file, "valve.edl");
            Ok(Some(
                "beginScreenProperties\nx 0\ny 0\nw 20\nh 20\nendScreenProperties\n\
                 object activeGroupClass\nbeginObjectProperties\nx 0\ny 0\nw 20\nh 20\n\
                 beginGroup\nobject activeRectangleClass\nbeginObjectProperties\n\
                 x 2\ny 2\nw 5\nh 5\nendObjectProperties\nendGroup\nendObjectProperties\n\
                 object activeGroupClass\nbeginObjectProperties\nx 20\ny 0\nw 20\nh 20\n\
                 beginGroup\nobject activeCircleClass\nbeginObjectProperties\n\
                 x 22\ny 2\nw 5\nh 5\nendObjectProperties\nendGroup\nendObjectProperties\n"
                    .to_string(),
            ))
        }
    }

    #[test]
    fn symbol_objects_expand_through_source() {
        let text = format!(
            "{MINIMAL}\nobject activeSymbolClass\nbeginObjectProperties\nx 100\ny 200\nw 20\nh 20\n\
             file \"valve\"\nnumStates 2\nnumPvs 1\ncontrolPvs {{\n  \"0\" VALVE\n}}\n\
             minValues {{\n  \"0\" 0\n  \"1\" 1\n}}\nmaxValues {{\n  \"0\" 1\n  \"1\" 2\n}}\n\
             endObjectProperties\n"
        );
        let colors = ColorTable::default();
        let mut source = OneSymbol;
        let parsed = Parser::new(&colors)
            .with_symbols(&mut source)
            .parse(&text)
            .expect("parses");
        let symbol = group(&parsed.screen.root.nodes[0]);
        assert_eq!(symbol.bounds, Bounds::new(100, 200, 20, 20));
        assert_eq!(symbol.nodes.len(), 2);
        let second = group(&symbol.nodes[1]);
        assert_eq!(
            second.symbol_state.as_ref().and_then(|s| s.min.as_deref()),
            Some("1")
        );
        let circle = object(&second.nodes[0]);
        assert_eq!(circle.bounds, Bounds::new(2, 2, 5, 5));
        assert_eq!(circle.symbol_channel.as_deref(), Some("VALVE"));
    }

    #[test]
    fn dropped_symbol_states_are_reported() {
        let text = format!(
            "{MINIMAL}\nobject activeSymbolClass\nbeginObjectProperties\nx 0\ny 0\nw 20\nh 20\n\
             file \"valve\"\nendObjectProperties\n"
        );
        let colors = ColorTable::default();
        let mut source = OneSymbol;
        let parsed = Parser::new(&colors)
            .with_symbols(&mut source)
            .parse(&text)
            .expect("parses");
        assert_eq!(group(&parsed.screen.root.nodes[0]).nodes.len(), 1);
        let info = parsed
            .diagnostics
            .iter()
            .find(|d| d.rule == "symbol-states")
            .expect("info diagnostic");
        assert_eq!(info.severity, Severity::Info);
        assert!(info.message.contains("kept 1 of 2"));
    }

    #[test]
    fn symbol_without_source_is_empty_group() {
        let text = format!(
            "{MINIMAL}\nobject activeSymbolClass\nbeginObjectProperties\nx 1\ny 2\nw 3\nh 4\n\
             file \"missing\"\nendObjectProperties\n"
        );
        let parsed = parse(&text);
        let symbol = group(&parsed.screen.root.nodes[0]);
        assert!(symbol.nodes.is_empty());
        assert!(parsed.diagnostics.iter().any(|d| d.rule == "symbol-file"));
    }
}
