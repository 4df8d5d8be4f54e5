//! Calculation library (`calc.list`) and `CALC\` PV translation.
//!
//! A CALC reference is either a named entry of the library or an inline
//! `{expression}`, followed by a parenthesized argument list:
//!
//! ```text
//! CALC\sum(pv1, pv2)          → calc://sum?A=ca://pv1&B=ca://pv2&expr=A+B
//! CALC\{A*2}(pv1)             → calc://calc_1a2b3c4d?A=ca://pv1&expr=A*2
//! ```

use crate::error::ConvertError;
use crate::resolve::translate_loc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Argument letters, in order. Arguments past the last letter are dropped.
const LETTERS: &[u8; 12] = b"ABCDEFGHIJKL";

/// Protocols that an argument may already carry.
const PROTOCOLS: &[&str] = &["ca://", "pva://", "loc://", "calc://", "channel://"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalcEntry {
    /// Argument template without the leading `@`, e.g. `$(A),$(A).SEVR`.
    pub rewrite: Option<String>,
    pub expression: Option<String>,
}

/// Named calculations, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalcTable {
    entries: HashMap<String, CalcEntry>,
}

impl CalcTable {
    /// Load a library file. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        if !path.is_file() {
            log::warn!(
                "calc library {} not found; named CALC references will fail",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConvertError::io(path, e))?;
        let table = Self::parse(&text);
        log::debug!("loaded {} calculations from {}", table.len(), path.display());
        Ok(table)
    }

    /// Parse library text. The first line is a header and is ignored; each
    /// entry is a name, an optional `@rewrite` line, then the expression.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        let mut lines = text
            .lines()
            .skip(1)
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .peekable();

        while let Some(name) = lines.next() {
            let rewrite = lines
                .next_if(|l| l.starts_with('@'))
                .map(|l| l[1..].trim().to_string());
            let expression = lines.next().map(str::to_string);
            entries.insert(
                name.to_string(),
                CalcEntry {
                    rewrite,
                    expression,
                },
            );
        }

        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&CalcEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: CalcEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Locate the calc library: next to the input file, then `$EDMFILES`.
pub fn find_calc_list(input: &Path) -> Option<PathBuf> {
    let local = input
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("calc.list");
    if local.is_file() {
        return Some(local);
    }
    let dir = std::env::var_os("EDMFILES")?;
    let global = PathBuf::from(dir).join("calc.list");
    global.is_file().then_some(global)
}

// ─── Translation ─────────────────────────────────────────────────────────

/// A parsed `CALC\` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CalcRef {
    name_or_expr: String,
    args: Vec<String>,
    inline: bool,
}

/// Translate a `CALC\...` reference into a full `calc://` address.
pub fn translate_calc(
    reference: &str,
    table: &CalcTable,
    default_protocol: &str,
) -> Result<String, ConvertError> {
    let parsed = parse_calc_ref(reference)?;

    let (identifier, expression, args) = if parsed.inline {
        (inline_identifier(reference), parsed.name_or_expr, parsed.args)
    } else {
        let name = parsed.name_or_expr;
        let entry = table
            .get(&name)
            .ok_or_else(|| ConvertError::UnknownCalc(name.clone()))?;
        let expression = entry
            .expression
            .clone()
            .ok_or_else(|| ConvertError::CalcWithoutExpression(name.clone()))?;
        let args = match &entry.rewrite {
            Some(rule) => apply_rewrite(rule, &parsed.args),
            None => parsed.args,
        };
        (name, expression, args)
    };

    if args.len() > LETTERS.len() {
        log::warn!(
            "{reference}: {} arguments given, only the first {} are mapped",
            args.len(),
            LETTERS.len()
        );
    }

    let mut query: Vec<String> = args
        .iter()
        .zip(LETTERS.iter())
        .map(|(arg, &letter)| {
            let letter = letter as char;
            if PROTOCOLS.iter().any(|p| arg.starts_with(p)) {
                format!("{letter}={arg}")
            } else {
                format!("{letter}={default_protocol}{arg}")
            }
        })
        .collect();
    query.push(format!("expr={}", convert_expression(&expression)));

    Ok(format!("calc://{identifier}?{}", query.join("&")))
}

/// `calc_` followed by the first 8 hex digits of the SHA-256 of the text.
fn inline_identifier(reference: &str) -> String {
    let digest = Sha256::digest(reference.as_bytes());
    let hex: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("calc_{hex}")
}

/// EDM operators → Python operators.
fn convert_expression(expr: &str) -> String {
    expr.replace('^', "**").replace('#', "!=")
}

fn parse_calc_ref(reference: &str) -> Result<CalcRef, ConvertError> {
    let body = reference
        .strip_prefix("CALC\\")
        .ok_or_else(|| ConvertError::UnknownCalc(reference.to_string()))?;
    let (expr_part, args_part) = split_calc_groups(body);
    let mut name_or_expr = clean_escapes(expr_part);
    let arg_string = clean_escapes(args_part);

    let args = if arg_string.trim().is_empty() {
        Vec::new()
    } else {
        arg_string
            .split(',')
            .map(|arg| {
                let arg = arg.trim();
                if arg.starts_with("LOC\\") {
                    translate_loc(arg)
                } else {
                    Ok(arg.to_string())
                }
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    let inline = name_or_expr.len() >= 2 && name_or_expr.starts_with('{') && name_or_expr.ends_with('}');
    if inline {
        name_or_expr = name_or_expr[1..name_or_expr.len() - 1].to_string();
    }

    Ok(CalcRef {
        name_or_expr,
        args,
        inline,
    })
}

/// Split `name(args)` at the last balanced parenthesized group.
fn split_calc_groups(body: &str) -> (&str, &str) {
    let Some(close) = body.rfind(')') else {
        return match body.rfind('(') {
            Some(open) => {
                log::warn!("repairing CALC reference with unbalanced parentheses: {body}");
                (&body[..open], &body[open + 1..])
            }
            None => (body, ""),
        };
    };

    let mut depth = 0usize;
    for (i, c) in body[..=close].char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (&body[..i], &body[i + 1..close]);
                }
            }
            _ => {}
        }
    }

    log::warn!("repairing CALC reference with unbalanced parentheses: {body}");
    match body.rfind('(') {
        Some(open) => (&body[..open], &body[open + 1..close]),
        None => (&body[..close], ""),
    }
}

/// Drop leading backslashes and unescape `\{` / `\}`.
fn clean_escapes(s: &str) -> String {
    s.trim_start_matches('\\').replace("\\{", "{").replace("\\}", "}")
}

/// Expand `$(A)`, `$(B)`… placeholders of each comma-separated template part.
fn apply_rewrite(rule: &str, args: &[String]) -> Vec<String> {
    rule.split(',')
        .map(|part| {
            args.iter()
                .zip(LETTERS.iter())
                .fold(part.to_string(), |acc, (arg, &letter)| {
                    acc.replace(&format!("$({})", letter as char), arg)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIBRARY: &str = "\
CALC1 header line
# comments and blanks are skipped

sum
A+B

sevr
@$(A),$(A).SEVR
A#0 && B>1

broken
";

    fn table() -> CalcTable {
        CalcTable::parse(LIBRARY)
    }

    #[test]
    fn parse_library_entries() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get("sum").and_then(|e| e.expression.as_deref()), Some("A+B"));
        assert_eq!(
            t.get("sevr").and_then(|e| e.rewrite.as_deref()),
            Some("$(A),$(A).SEVR")
        );
        assert_eq!(t.get("broken").map(|e| e.expression.clone()), Some(None));
    }

    #[test]
    fn header_line_is_ignored() {
        let t = CalcTable::parse("sum\nA+B\n");
        // "sum" was the header; "A+B" becomes a name without expression.
        assert!(t.get("sum").is_none());
        assert!(t.get("A+B").is_some());
    }

    #[test]
    fn named_calc_translates() {
        let url = translate_calc("CALC\\sum(pv1, pv2)", &table(), "ca://").expect("ok");
        assert_eq!(url, "calc://sum?A=ca://pv1&B=ca://pv2&expr=A+B");
    }

    #[test]
    fn rewrite_rule_expands_arguments() {
        let url = translate_calc("CALC\\sevr(MY:PV)", &table(), "ca://").expect("ok");
        assert_eq!(
            url,
            "calc://sevr?A=ca://MY:PV&B=ca://MY:PV.SEVR&expr=A!=0 && B>1"
        );
    }

    #[test]
    fn inline_expression_gets_hashed_identifier() {
        let url = translate_calc("CALC\\\\\\{A^2\\}(pva://x)", &table(), "ca://").expect("ok");
        let (id, query) = url.split_once('?').expect("has query");
        assert!(id.starts_with("calc://calc_"));
        assert_eq!(id.len(), "calc://calc_".len() + 8);
        assert_eq!(query, "A=pva://x&expr=A**2");

        let again = translate_calc("CALC\\\\\\{A^2\\}(pva://x)", &table(), "ca://").expect("ok");
        assert_eq!(url, again);
        let other = translate_calc("CALC\\{A^3}(pva://x)", &table(), "ca://").expect("ok");
        assert_ne!(url.split('?').next(), other.split('?').next());
    }

    #[test]
    fn nested_parentheses_in_arguments() {
        let (expr, args) = split_calc_groups("{(A)+B}(x,y)");
        assert_eq!(expr, "{(A)+B}");
        assert_eq!(args, "x,y");
    }

    #[test]
    fn unbalanced_parentheses_are_repaired() {
        let (expr, args) = split_calc_groups("{A}(pv1");
        assert_eq!(expr, "{A}");
        assert_eq!(args, "pv1");
    }

    #[test]
    fn loc_arguments_are_converted() {
        let url = translate_calc("CALC\\{A+1}(LOC\\n=i:3)", &table(), "ca://").expect("ok");
        assert!(url.contains("A=loc://n?type=int&init=3"));
    }

    #[test]
    fn unknown_name_fails() {
        let err = translate_calc("CALC\\nope(a)", &table(), "ca://").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownCalc(name) if name == "nope"));
    }

    #[test]
    fn entry_without_expression_fails() {
        let err = translate_calc("CALC\\broken(a)", &table(), "ca://").unwrap_err();
        assert!(matches!(err, ConvertError::CalcWithoutExpression(_)));
    }

    #[test]
    fn extra_arguments_are_dropped() {
        let args: Vec<String> = (0..14).map(|i| format!("p{i}")).collect();
        let reference = format!("CALC\\{{A}}({})", args.join(","));
        let url = translate_calc(&reference, &table(), "ca://").expect("ok");
        assert!(url.contains("L=ca://p11"));
        assert!(!url.contains("p12"));
    }
}
