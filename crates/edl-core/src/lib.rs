pub mod calc;
pub mod convert;
pub mod emitter;
pub mod error;
pub mod mapper;
pub mod model;
pub mod palette;
pub mod parser;
pub mod resolve;
pub mod rules;
pub mod serialize;
pub mod symbol;
pub mod transform;
pub mod widget;

pub use calc::CalcTable;
pub use convert::{BatchReport, Conversion, ConvertConfig, Converter, convert_file};
pub use error::{ConvertError, Diagnostic, Severity};
pub use mapper::UnsupportedWidget;
pub use model::*;
pub use palette::{ColorTable, Rgba};
pub use parser::{ParsedScreen, Parser, SymbolSource, parse_screen};
pub use resolve::{Resolver, substitute_macros};
