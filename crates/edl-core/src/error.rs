//! Error and diagnostic types shared by every conversion stage.
//!
//! Fatal conditions are `ConvertError` values propagated to the caller of the
//! conversion entry point. Recoverable conditions never abort a conversion:
//! they are logged and collected as `Diagnostic`s next to the output.

use std::path::PathBuf;

/// A condition that aborts the conversion of one file.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("output file already exists: {} (enable overwrite to replace it)", .0.display())]
    OutputExists(PathBuf),

    #[error("screen has no beginScreenProperties/endScreenProperties block")]
    MissingScreenProperties,

    #[error("missing required size property '{0}' in screen properties")]
    MissingSizeProperty(&'static str),

    #[error("calculation '{0}' is not defined in the calc table")]
    UnknownCalc(String),

    #[error("calculation '{0}' has no expression")]
    CalcWithoutExpression(String),

    #[error("unsupported local PV type '{kind}' in {pv}")]
    UnsupportedLocType { kind: String, pv: String },

    #[error("malformed local PV: {0}")]
    MalformedLoc(String),

    #[error("special function {function} is not supported (in {pv})")]
    UnsupportedFunction { function: String, pv: String },

    #[error("malformed symbol range list: {0}")]
    MalformedSymbolRange(String),

    #[error("malformed palette file: {0}")]
    Palette(String),

    #[error("failed to write output document: {0}")]
    Emit(String),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ─── Diagnostics ────────────────────────────────────────────────────────

/// Severity of a recoverable finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Output is degraded: something was skipped or defaulted.
    Warning,
    /// Informational only.
    Info,
}

/// A recoverable finding recorded while parsing or mapping one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Short rule identifier (e.g. "unrecognized-text", "default-size").
    pub rule: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            rule,
            message: message.into(),
        }
    }

    pub fn info(rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            rule,
            message: message.into(),
        }
    }
}
