//! EDM palette (`colors.list`) loader and color resolution.
//!
//! Handles: the version line, `key=value` settings, `alias`, `static`
//! colors (plain or blinking), `rule` colors, `menumap` and `alarm` blocks.
//! A table is loaded once per conversion and only read afterwards.

use crate::error::ConvertError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use winnow::ascii::{digit1, hex_digit1, space0};
use winnow::combinator::{alt, preceded};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take_till;

/// Default component range when a palette does not declare `max`.
pub const DEFAULT_MAX: u32 = 0x10000;

/// Fallback for any color that cannot be resolved.
pub const DEFAULT_GRAY: Rgba = Rgba::new(128, 128, 128, 255);

// ─── Colors ──────────────────────────────────────────────────────────────

/// 8-bit RGBA color as written into the UI document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// CSS form used inside style sheets.
    pub fn to_css(self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticColor {
    pub name: String,
    pub rgb: [u32; 3],
    /// Second state of a blinking color; never rendered.
    pub blink: Option<[u32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCondition {
    pub condition: String,
    pub color: String,
}

/// A conditional color. Conditions are evaluated top to bottom at runtime
/// in EDM; a static conversion can only use the `default` branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorRule {
    pub name: String,
    pub conditions: Vec<RuleCondition>,
}

impl ColorRule {
    fn default_color(&self) -> Option<&str> {
        self.conditions
            .iter()
            .find(|c| c.condition == "default")
            .or_else(|| self.conditions.first())
            .map(|c| c.color.as_str())
    }
}

// ─── Table ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    pub version: Option<(u32, u32, u32)>,
    pub blink_ms: Option<u32>,
    pub columns: Option<u32>,
    /// One past the largest component value (`256` or `0x10000`).
    pub max: u32,
    pub statics: BTreeMap<u32, StaticColor>,
    pub rules: BTreeMap<u32, ColorRule>,
    pub aliases: HashMap<String, String>,
    pub menumap: Vec<String>,
    pub alarm: Vec<(String, String)>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self {
            version: None,
            blink_ms: None,
            columns: None,
            max: DEFAULT_MAX,
            statics: BTreeMap::new(),
            rules: BTreeMap::new(),
            aliases: HashMap::new(),
            menumap: Vec::new(),
            alarm: Vec::new(),
        }
    }
}

impl ColorTable {
    /// Load a palette file. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        if !path.is_file() {
            log::warn!(
                "palette file {} not found; colors fall back to gray",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        let table = Self::parse(&text)?;
        log::debug!(
            "loaded {} static and {} rule colors from {}",
            table.statics.len(),
            table.rules.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.rules.is_empty()
    }

    /// Parse `colors.list` text.
    pub fn parse(text: &str) -> Result<Self, ConvertError> {
        let mut table = Self::default();
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let first = lines
            .next()
            .ok_or_else(|| ConvertError::Palette("file is empty or missing version line".into()))?;
        table.version = Some(parse_version(first)?);

        while let Some(line) = lines.next() {
            if let Some(rest) = line.strip_prefix("static") {
                let color = parse_static(rest.trim_start())
                    .ok_or_else(|| ConvertError::Palette(format!("bad static color: {line}")))?;
                table.statics.insert(color.0, color.1);
            } else if let Some(rest) = line.strip_prefix("rule") {
                let (index, name) = parse_rule_header(rest)
                    .ok_or_else(|| ConvertError::Palette(format!("bad rule header: {line}")))?;
                let mut conditions = Vec::new();
                for inner in lines.by_ref() {
                    if inner.starts_with('}') {
                        break;
                    }
                    if inner == "{" {
                        continue;
                    }
                    if let Some((cond, color)) = inner.split_once(':') {
                        conditions.push(RuleCondition {
                            condition: cond.trim().to_string(),
                            color: unquote(color.trim()).to_string(),
                        });
                    }
                }
                table.rules.insert(index, ColorRule { name, conditions });
            } else if let Some(rest) = line.strip_prefix("alias") {
                let rest = rest.trim();
                match rest.split_once(char::is_whitespace) {
                    Some((alias, color)) => {
                        table
                            .aliases
                            .insert(unquote(alias).to_string(), unquote(color.trim()).to_string());
                    }
                    None => log::warn!("ignoring alias without target: '{line}'"),
                }
            } else if line.starts_with("menumap") {
                for inner in lines.by_ref() {
                    if inner.starts_with('}') {
                        break;
                    }
                    if inner != "{" {
                        table.menumap.push(unquote(inner).to_string());
                    }
                }
            } else if line.starts_with("alarm") {
                for inner in lines.by_ref() {
                    if inner.starts_with('}') {
                        break;
                    }
                    if let Some((state, color)) = inner.split_once(':') {
                        table
                            .alarm
                            .push((state.trim().to_string(), unquote(color.trim()).to_string()));
                    }
                }
            } else if let Some((key, value)) = line.split_once('=') {
                table.apply_setting(key.trim(), value.trim());
            } else {
                log::warn!("unrecognized line in colors.list: '{line}'");
            }
        }

        Ok(table)
    }

    fn apply_setting(&mut self, key: &str, value: &str) {
        let mut input = value;
        let parsed = parse_component(&mut input).ok();
        match (key, parsed) {
            ("max", Some(v)) if v > 1 => self.max = v,
            ("blinkms", Some(v)) => self.blink_ms = Some(v),
            ("columns", Some(v)) => self.columns = Some(v),
            _ => log::debug!("ignoring palette setting {key}={value}"),
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────────

    /// Resolve an EDM color reference (`index N`, `rgb r g b`, or a color
    /// name or alias) to 8-bit RGBA.
    pub fn resolve(&self, spec: &str) -> Option<Rgba> {
        let spec = unquote(spec.trim());
        if let Some(rest) = spec.strip_prefix("rgb") {
            let parts: Vec<u32> = rest
                .split([' ', ','])
                .filter(|p| !p.is_empty())
                .map(|p| {
                    let mut input = p;
                    parse_component(&mut input).ok()
                })
                .collect::<Option<_>>()?;
            if parts.len() < 3 {
                return None;
            }
            return Some(self.scale([parts[0], parts[1], parts[2]]));
        }
        if let Some(rest) = spec.strip_prefix("index") {
            let index: u32 = rest.trim().parse().ok()?;
            return self.resolve_index(index, 0);
        }
        self.resolve_name(spec, 0)
    }

    /// Like `resolve`, but falls back to the default gray with a warning.
    pub fn resolve_or_default(&self, spec: &str) -> Rgba {
        self.resolve(spec).unwrap_or_else(|| {
            log::warn!("could not resolve color '{spec}'; using default gray");
            DEFAULT_GRAY
        })
    }

    fn resolve_index(&self, index: u32, depth: u8) -> Option<Rgba> {
        if let Some(color) = self.statics.get(&index) {
            return Some(self.scale(color.rgb));
        }
        let rule = self.rules.get(&index)?;
        self.resolve_name(rule.default_color()?, depth + 1)
    }

    fn resolve_name(&self, name: &str, depth: u8) -> Option<Rgba> {
        // Aliases and rules may point at each other; bound the chain.
        if depth > 8 {
            return None;
        }
        if let Some(color) = self.statics.values().find(|c| c.name == name) {
            return Some(self.scale(color.rgb));
        }
        if let Some(target) = self.aliases.get(name) {
            return self.resolve_name(target, depth + 1);
        }
        let rule = self.rules.values().find(|r| r.name == name)?;
        self.resolve_name(rule.default_color()?, depth + 1)
    }

    /// Narrow wide components to 8 bits using the table's `max`.
    fn scale(&self, rgb: [u32; 3]) -> Rgba {
        let wide = rgb.iter().any(|&c| c > 255);
        let conv = |c: u32| -> u8 {
            let v = if wide {
                (u64::from(c) * 255 / u64::from(self.max.saturating_sub(1).max(1))) as u32
            } else {
                c
            };
            v.min(255) as u8
        };
        Rgba::new(conv(rgb[0]), conv(rgb[1]), conv(rgb[2]), 255)
    }
}

/// Locate the palette file: explicit path, `$EDMCOLORFILE`,
/// `$EDMFILES/colors.list`, then `/etc/edm/colors.list`.
pub fn find_palette(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit.filter(|p| p.is_file()) {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os("EDMCOLORFILE").map(PathBuf::from) {
        if path.is_file() {
            return Some(path);
        }
    }
    if let Some(dir) = std::env::var_os("EDMFILES") {
        let candidate = PathBuf::from(dir).join("colors.list");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    let system = PathBuf::from("/etc/edm/colors.list");
    system.is_file().then_some(system)
}

// ─── Low-level parsers ──────────────────────────────────────────────────

fn unquote(s: &str) -> &str {
    s.trim_matches('"')
}

/// Decimal or `0x` hexadecimal component.
fn parse_component(input: &mut &str) -> ModalResult<u32> {
    let _: Result<&str, winnow::error::ErrMode<ContextError>> = space0.parse_next(input);
    alt((
        preceded(alt(("0x", "0X")), hex_digit1)
            .try_map(|digits: &str| u32::from_str_radix(digits, 16)),
        digit1.try_map(|digits: &str| digits.parse::<u32>()),
    ))
    .parse_next(input)
}

fn parse_version(line: &str) -> Result<(u32, u32, u32), ConvertError> {
    let parts: Vec<u32> = line
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| ConvertError::Palette(format!("bad version line: {line}")))?;
    match parts.as_slice() {
        [major, minor, release] => Ok((*major, *minor, *release)),
        _ => Err(ConvertError::Palette(
            "version line must have exactly three integers, e.g. '4 0 0'".into(),
        )),
    }
}

/// `<index> <name|"quoted name"> { r g b [r g b] }` after the `static` keyword.
fn parse_static(input: &str) -> Option<(u32, StaticColor)> {
    let mut rest = input;
    let index: &str = digit1::<_, ContextError>.parse_next(&mut rest).ok()?;
    let index: u32 = index.parse().ok()?;
    rest = rest.trim_start();
    let name: &str = take_till::<_, _, ContextError>(0.., '{')
        .parse_next(&mut rest)
        .ok()?;
    let name = unquote(name.trim()).to_string();
    let body = rest.strip_prefix('{')?;
    let body = body.split('}').next()?;

    let values: Vec<u32> = body
        .split([' ', ',', '\t'])
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut input = p;
            parse_component(&mut input).ok()
        })
        .collect::<Option<_>>()?;
    let (rgb, blink) = match values.as_slice() {
        [r, g, b] => ([*r, *g, *b], None),
        [r, g, b, r2, g2, b2] => ([*r, *g, *b], Some([*r2, *g2, *b2])),
        _ => return None,
    };
    Some((index, StaticColor { name, rgb, blink }))
}

/// `<index> <name> [{]` after the `rule` keyword.
fn parse_rule_header(input: &str) -> Option<(u32, String)> {
    let rest = input.trim().trim_end_matches('{').trim();
    let (index, name) = rest.split_once(char::is_whitespace)?;
    Some((index.parse().ok()?, unquote(name.trim()).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PALETTE: &str = r#"
# sample palette
4 0 0

blinkms=750
columns=5
max=0x10000

alias red-alarm "blinking red"

static 25 Controller { 0 0 65535 }
static 26 "blinking red" { 65535 0 0 41120 0 0 }
static 27 Monitor { 0xafff 0xafff 0 }
static 3 black { 0, 0, 0 }

rule 100 exampleRule {
  =100 || =200 : Monitor
  default      : Controller
}

menumap {
  Controller
  Monitor
}

alarm {
  disconnected : black
  invalid : Monitor
}
"#;

    #[test]
    fn parse_full_grammar() {
        let table = ColorTable::parse(PALETTE).expect("palette parses");
        assert_eq!(table.version, Some((4, 0, 0)));
        assert_eq!(table.blink_ms, Some(750));
        assert_eq!(table.columns, Some(5));
        assert_eq!(table.max, 0x10000);
        assert_eq!(table.statics[&27].rgb, [45055, 45055, 0]);
        assert_eq!(table.statics[&26].blink, Some([41120, 0, 0]));
        assert_eq!(table.statics[&26].name, "blinking red");
        assert_eq!(table.rules[&100].conditions.len(), 2);
        assert_eq!(table.menumap, vec!["Controller", "Monitor"]);
        assert_eq!(table.alarm.len(), 2);
        assert_eq!(table.aliases["red-alarm"], "blinking red");
    }

    #[test]
    fn resolve_index_scales_wide_components() {
        let table = ColorTable::parse(PALETTE).expect("palette parses");
        assert_eq!(table.resolve("index 27"), Some(Rgba::new(175, 175, 0, 255)));
        assert_eq!(table.resolve("index 25"), Some(Rgba::new(0, 0, 255, 255)));
        assert_eq!(table.resolve("index 3"), Some(Rgba::new(0, 0, 0, 255)));
    }

    #[test]
    fn resolve_rule_uses_default_branch() {
        let table = ColorTable::parse(PALETTE).expect("palette parses");
        assert_eq!(table.resolve("index 100"), table.resolve("index 25"));
    }

    #[test]
    fn resolve_names_and_aliases() {
        let table = ColorTable::parse(PALETTE).expect("palette parses");
        assert_eq!(table.resolve("Monitor"), table.resolve("index 27"));
        assert_eq!(table.resolve("red-alarm"), Some(Rgba::new(255, 0, 0, 255)));
    }

    #[test]
    fn resolve_inline_rgb() {
        let table = ColorTable::default();
        assert_eq!(table.resolve("rgb 10 20 30"), Some(Rgba::new(10, 20, 30, 255)));
        assert_eq!(
            table.resolve("rgb 65535 0 32768"),
            Some(Rgba::new(255, 0, 127, 255))
        );
    }

    #[test]
    fn unknown_index_falls_back_to_gray() {
        let table = ColorTable::parse(PALETTE).expect("palette parses");
        assert_eq!(table.resolve("index 999"), None);
        assert_eq!(table.resolve_or_default("index 999"), DEFAULT_GRAY);
    }

    #[test]
    fn missing_version_is_an_error() {
        let err = ColorTable::parse("static 1 x { 0 0 0 }").unwrap_err();
        assert!(matches!(err, ConvertError::Palette(_)));
        assert!(ColorTable::parse("").is_err());
    }

    #[test]
    fn missing_file_gives_empty_table() {
        let table = ColorTable::load(Path::new("/nonexistent/colors.list")).expect("tolerated");
        assert!(table.is_empty());
        assert_eq!(table.resolve_or_default("index 1"), DEFAULT_GRAY);
    }

    #[test]
    fn small_max_palette_is_not_scaled() {
        let table = ColorTable::parse("4 0 0\nmax=256\nstatic 1 c { 10 200 255 }\n").expect("ok");
        assert_eq!(table.resolve("index 1"), Some(Rgba::new(10, 200, 255, 255)));
    }
}
