//! Macro substitution and indirect-PV resolution.
//!
//! Three rewrites happen before a channel string reaches a widget:
//!
//! - `$(name)` macros become `${name}` (the target's macro syntax);
//! - `CALC\...` references become `calc://` addresses;
//! - `LOC\...` references become `loc://` addresses.
//!
//! CALC/LOC translation is memoized per `Resolver`: the first occurrence of a
//! reference gets the full address with its query string, every later
//! identical occurrence gets the short `scheme://identifier` form. A
//! `Resolver` must never be shared between two files.

use crate::calc::{CalcTable, translate_calc};
use crate::error::ConvertError;
use std::collections::HashMap;

// ─── Macros ──────────────────────────────────────────────────────────────

/// Scope markers that have no counterpart in the target and are dropped.
const DROPPED_MACROS: &[&str] = &["$(!W)", "$(!A)"];

/// Rewrite every `$(name)` into `${name}`.
///
/// Backslashes escaping the `$` are removed along with it. Already
/// rewritten `${name}` text is left alone, so applying this twice is the
/// same as applying it once.
#[must_use]
pub fn substitute_macros(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in DROPPED_MACROS {
        cleaned = cleaned.replace(marker, "");
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut rest = cleaned.as_str();
    while let Some(pos) = rest.find("$(") {
        // Leading escape backslashes belong to the macro.
        let head = &rest[..pos];
        let kept = head.trim_end_matches('\\');
        let after = &rest[pos + 2..];
        match after.find([')', '\n']) {
            Some(end) if end > 0 && after.as_bytes()[end] == b')' => {
                out.push_str(kept);
                out.push_str("${");
                out.push_str(&after[..end]);
                out.push('}');
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(head);
                out.push_str("$(");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// ─── Local PVs ───────────────────────────────────────────────────────────

fn map_loc_type(type_char: &str) -> Option<&'static str> {
    match type_char {
        "d" => Some("float"),
        "i" | "e" => Some("int"),
        "s" => Some("str"),
        _ => None,
    }
}

/// Translate a `LOC\name=type:value` reference into a full `loc://` address.
pub fn translate_loc(reference: &str) -> Result<String, ConvertError> {
    let content = reference
        .strip_prefix("LOC\\")
        .ok_or_else(|| ConvertError::MalformedLoc(reference.to_string()))?;
    let content = content.trim_start_matches('\\');

    let Some((name, type_and_value)) = content.split_once('=') else {
        return Ok(format!("loc://{content}"));
    };
    let name = name.trim_start_matches('\\');
    let type_and_value = type_and_value.trim_start_matches('=');

    let (type_char, value) = split_loc_type(type_and_value)
        .ok_or_else(|| ConvertError::MalformedLoc(reference.to_string()))?;
    let type_char = type_char.to_ascii_lowercase();
    let pydm_type = map_loc_type(&type_char).ok_or_else(|| ConvertError::UnsupportedLocType {
        kind: type_char.clone(),
        pv: reference.to_string(),
    })?;

    if value.trim().eq_ignore_ascii_case("RAND()") {
        return Err(ConvertError::UnsupportedFunction {
            function: "RAND()".into(),
            pv: reference.to_string(),
        });
    }

    if type_char == "e" {
        let mut parts = value.split(',');
        let init = parts.next().unwrap_or_default();
        let labels: Vec<&str> = parts.collect();
        let labels = serde_json::to_string(&labels).unwrap_or_else(|_| "[]".into());
        return Ok(format!(
            "loc://{name}?type={pydm_type}&init={init}&enum_string={labels}"
        ));
    }

    Ok(format!("loc://{name}?type={pydm_type}&init={value}"))
}

/// Split the part after `=` into (type character, value).
///
/// Accepted forms: `t:value`, `t,value`, a bare type character, a bare
/// integer (int) and a bare float (float).
fn split_loc_type(type_and_value: &str) -> Option<(String, &str)> {
    if let Some((t, v)) = type_and_value.split_once(':') {
        return Some((t.to_string(), v));
    }
    let mut chars = type_and_value.chars();
    if let (Some(t), Some(',')) = (chars.next(), chars.next()) {
        if map_loc_type(&t.to_string()).is_some() {
            return Some((t.to_string(), &type_and_value[2..]));
        }
    }
    if map_loc_type(type_and_value).is_some() {
        return Some((type_and_value.to_string(), ""));
    }
    if type_and_value.trim().parse::<i64>().is_ok() {
        return Some(("i".into(), type_and_value));
    }
    if type_and_value.trim().parse::<f64>().is_ok() {
        return Some(("d".into(), type_and_value));
    }
    None
}

// ─── Resolver ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Memo {
    short: String,
}

/// Per-file CALC/LOC resolver.
#[derive(Debug)]
pub struct Resolver<'a> {
    calcs: &'a CalcTable,
    default_protocol: String,
    memo: HashMap<String, Memo>,
}

impl<'a> Resolver<'a> {
    pub fn new(calcs: &'a CalcTable, default_protocol: impl Into<String>) -> Self {
        Self {
            calcs,
            default_protocol: default_protocol.into(),
            memo: HashMap::new(),
        }
    }

    /// Number of distinct references seen so far.
    pub fn seen(&self) -> usize {
        self.memo.len()
    }

    /// Resolve one channel string. Plain channels pass through.
    pub fn resolve_channel(&mut self, raw: &str) -> Result<String, ConvertError> {
        let raw = raw.trim();
        if !(raw.starts_with("CALC\\") || raw.starts_with("LOC\\")) {
            return Ok(raw.to_string());
        }
        if let Some(memo) = self.memo.get(raw) {
            return Ok(memo.short.clone());
        }

        let full = if raw.starts_with("CALC\\") {
            translate_calc(raw, self.calcs, &self.default_protocol)?
        } else {
            translate_loc(raw)?
        };
        let short = full.split('?').next().unwrap_or(&full).to_string();
        log::trace!("resolved {raw} -> {full}");
        self.memo.insert(raw.to_string(), Memo { short });
        Ok(full)
    }

    /// Replace every double-quoted `CALC\` or `LOC\` value in `text`, in
    /// textual order. The quotes are consumed with the reference.
    pub fn rewrite_text(&mut self, text: &str) -> Result<String, ConvertError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = next_quoted_reference(rest) {
            let body = &rest[start + 1..];
            let Some(end) = body.find('"') else {
                break;
            };
            out.push_str(&rest[..start]);
            out.push_str(&self.resolve_channel(&body[..end])?);
            rest = &body[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Byte offset of the opening quote of the next `"CALC\` / `"LOC\` value.
fn next_quoted_reference(text: &str) -> Option<usize> {
    let calc = text.find("\"CALC\\");
    let loc = text.find("\"LOC\\");
    match (calc, loc) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
