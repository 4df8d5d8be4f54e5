//! Conversion pipeline and entry points.
//!
//! One conversion runs, strictly in order: decode → macro substitution →
//! CALC/LOC rewriting → parse (with symbol expansion) → map → serialize →
//! emit. Resolver memo and widget naming live for exactly one file.

use crate::calc::{CalcTable, find_calc_list};
use crate::emitter::{DEFAULT_TITLE, UiDocument, emit_document};
use crate::error::{ConvertError, Diagnostic};
use crate::mapper::{Mapper, UnsupportedWidget};
use crate::model::PropertiesExt;
use crate::palette::{ColorTable, find_palette};
use crate::parser::{Parser, SymbolSource};
use crate::resolve::{Resolver, substitute_macros};
use crate::serialize::serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

// ─── Configuration ───────────────────────────────────────────────────────

/// Conversion settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertConfig {
    pub scale: f64,
    pub offset_x: i32,
    pub offset_y: i32,
    /// Subtracted from every EDM font size (result stays ≥ 1).
    pub font_size_decrease: i32,
    /// Prefix for CALC arguments without a protocol.
    pub default_protocol: String,
    pub overwrite: bool,
    /// Wrap the widget tree in a `QScrollArea`.
    pub scrollable: bool,
    pub color_file: Option<PathBuf>,
    /// Explicit calc library; otherwise looked up next to each input.
    pub calc_file: Option<PathBuf>,
    /// Searched after the input file's own directory.
    pub symbol_search_paths: Vec<PathBuf>,
    /// Extension of inputs picked up by batch conversion.
    pub input_extension: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset_x: 0,
            offset_y: 0,
            font_size_decrease: 2,
            default_protocol: "ca://".to_string(),
            overwrite: false,
            scrollable: false,
            color_file: None,
            calc_file: None,
            symbol_search_paths: Vec::new(),
            input_extension: "edl".to_string(),
        }
    }
}

impl ConvertConfig {
    /// Defaults plus file locations from the EDM environment
    /// (`EDMCOLORFILE`, `EDMFILES`, `EDMDATAFILES`).
    pub fn from_env() -> Self {
        let data_files = std::env::var("EDMDATAFILES").unwrap_or_else(|_| ".".to_string());
        Self {
            color_file: find_palette(None),
            symbol_search_paths: std::env::split_paths(&data_files).collect(),
            ..Self::default()
        }
    }
}

// ─── Results ─────────────────────────────────────────────────────────────

/// Output of converting one screen.
#[derive(Debug)]
pub struct Conversion {
    /// The complete `.ui` document.
    pub document: String,
    /// Objects left for manual conversion.
    pub unsupported: Vec<UnsupportedWidget>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of a directory conversion.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Output files written.
    pub converted: Vec<PathBuf>,
    /// Inputs that failed, with their errors.
    pub failures: Vec<(PathBuf, ConvertError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── Converter ───────────────────────────────────────────────────────────

/// Holds the configuration and the palette shared by every conversion.
pub struct Converter {
    config: ConvertConfig,
    colors: ColorTable,
    calcs: Option<CalcTable>,
}

impl Converter {
    /// Load the palette and, if configured, the calc library.
    pub fn new(config: ConvertConfig) -> Result<Self, ConvertError> {
        let colors = match find_palette(config.color_file.as_deref()) {
            Some(path) => ColorTable::load(&path)?,
            None => {
                log::warn!("no colors.list found; colors fall back to gray");
                ColorTable::default()
            }
        };
        let calcs = config.calc_file.as_deref().map(CalcTable::load).transpose()?;
        Ok(Self::with_tables(config, colors, calcs))
    }

    /// Use already-loaded tables.
    pub fn with_tables(config: ConvertConfig, colors: ColorTable, calcs: Option<CalcTable>) -> Self {
        Self {
            config,
            colors,
            calcs,
        }
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Convert screen text. Symbol files are searched on the configured paths.
    pub fn convert_str(&self, text: &str) -> Result<Conversion, ConvertError> {
        let empty = CalcTable::default();
        let calcs = self.calcs.as_ref().unwrap_or(&empty);
        self.run(text, calcs, &self.config.symbol_search_paths)
    }

    /// Convert `input` and write the document to `output`.
    ///
    /// An existing `output` is an error unless overwrite is enabled; this is
    /// checked before the input is read.
    pub fn convert_file(&self, input: &Path, output: &Path) -> Result<Conversion, ConvertError> {
        if output.exists() && !self.config.overwrite {
            return Err(ConvertError::OutputExists(output.to_path_buf()));
        }
        if !input.is_file() {
            return Err(ConvertError::InputNotFound(input.to_path_buf()));
        }
        log::info!("converting {} -> {}", input.display(), output.display());

        let text = read_text(input)?;
        let local_calcs;
        let calcs = match &self.calcs {
            Some(table) => table,
            None => {
                local_calcs = match find_calc_list(input) {
                    Some(path) => CalcTable::load(&path)?,
                    None => CalcTable::default(),
                };
                &local_calcs
            }
        };

        let mut search = Vec::with_capacity(self.config.symbol_search_paths.len() + 1);
        if let Some(dir) = input.parent() {
            search.push(dir.to_path_buf());
        }
        search.extend(self.config.symbol_search_paths.iter().cloned());

        let conversion = self.run(&text, calcs, &search)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
        }
        std::fs::write(output, &conversion.document).map_err(|e| ConvertError::io(output, e))?;
        Ok(conversion)
    }

    /// Convert every matching file under `input_dir`, mirroring the layout
    /// under `output_dir`. A failing file does not stop the batch.
    pub fn convert_dir(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport, ConvertError> {
        if !input_dir.is_dir() {
            return Err(ConvertError::InputNotFound(input_dir.to_path_buf()));
        }
        let mut inputs = Vec::new();
        collect_inputs(input_dir, &self.config.input_extension, &mut inputs)?;

        let mut report = BatchReport::default();
        for input in inputs {
            let relative = input.strip_prefix(input_dir).unwrap_or(&input);
            let output = output_dir.join(relative).with_extension("ui");
            match self.convert_file(&input, &output) {
                Ok(conversion) => {
                    if !conversion.unsupported.is_empty() {
                        log::warn!(
                            "{}: {} unsupported widgets",
                            input.display(),
                            conversion.unsupported.len()
                        );
                    }
                    report.converted.push(output);
                }
                Err(err) => {
                    log::error!("{}: {err}", input.display());
                    report.failures.push((input, err));
                }
            }
        }
        log::info!(
            "converted {} files, {} failed",
            report.converted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn run(&self, text: &str, calcs: &CalcTable, search: &[PathBuf]) -> Result<Conversion, ConvertError> {
        let text = substitute_macros(text);
        let mut resolver = Resolver::new(calcs, self.config.default_protocol.as_str());
        let text = resolver.rewrite_text(&text)?;

        let parsed = {
            let mut symbols = FileSymbols::new(search, &mut resolver);
            Parser::new(&self.colors).with_symbols(&mut symbols).parse(&text)?
        };

        let mapped = Mapper::new(&self.colors, &mut resolver, &self.config).map_screen(&parsed.screen)?;

        let mut classes = BTreeSet::new();
        for widget in &mapped.widgets {
            widget.collect_classes(&mut classes);
        }
        let screen = &parsed.screen;
        let document = emit_document(&UiDocument {
            width: screen.width(),
            height: screen.height(),
            title: screen
                .properties()
                .text("title")
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TITLE)
                .to_string(),
            background: screen.background,
            scrollable: self.config.scrollable,
            widgets: mapped.widgets.iter().map(serialize).collect(),
            classes,
        })?;

        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(mapped.diagnostics);
        Ok(Conversion {
            document,
            unsupported: mapped.unsupported,
            diagnostics,
        })
    }
}

/// Convert one file with a one-off converter.
pub fn convert_file(input: &Path, output: &Path, config: ConvertConfig) -> Result<Conversion, ConvertError> {
    Converter::new(config)?.convert_file(input, output)
}

// ─── Files ───────────────────────────────────────────────────────────────

/// Read a file as text, decoding as Latin-1 when it is not UTF-8.
pub fn read_text(path: &Path) -> Result<String, ConvertError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConvertError::InputNotFound(path.to_path_buf()),
        _ => ConvertError::io(path, e),
    })?;
    Ok(decode(bytes, path))
}

fn decode(bytes: Vec<u8>, path: &Path) -> String {
    String::from_utf8(bytes).unwrap_or_else(|err| {
        log::warn!("{} is not valid UTF-8; reading as Latin-1", path.display());
        err.into_bytes().into_iter().map(char::from).collect()
    })
}

fn collect_inputs(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<(), ConvertError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| ConvertError::io(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_inputs(&path, extension, out)?;
        } else if path.extension().is_some_and(|ext| ext == extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Loads symbol files from disk, preprocessed like the main file.
///
/// Each file is looked up and read once per conversion. References are
/// rewritten on every load because the resolver memo moves on between
/// uses of the same symbol.
struct FileSymbols<'r, 'c> {
    search: &'r [PathBuf],
    resolver: &'r mut Resolver<'c>,
    cache: HashMap<String, Option<String>>,
}

impl<'r, 'c> FileSymbols<'r, 'c> {
    fn new(search: &'r [PathBuf], resolver: &'r mut Resolver<'c>) -> Self {
        Self {
            search,
            resolver,
            cache: HashMap::new(),
        }
    }

    fn locate(&self, file: &str) -> Option<PathBuf> {
        let direct = Path::new(file);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        self.search
            .iter()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.is_file())
    }
}

impl SymbolSource for FileSymbols<'_, '_> {
    fn load(&mut self, file: &str) -> Result<Option<String>, ConvertError> {
        if !self.cache.contains_key(file) {
            let text = match self.locate(file) {
                Some(path) => {
                    log::debug!("loading symbol file {}", path.display());
                    Some(substitute_macros(&read_text(&path)?))
                }
                None => None,
            };
            self.cache.insert(file.to_string(), text);
        }
        match self.cache.get(file) {
            Some(Some(text)) => self.resolver.rewrite_text(text).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "beginScreenProperties\nx 0\ny 0\nw 800\nh 600\nendScreenProperties\n";

    fn converter(config: ConvertConfig) -> Converter {
        Converter::with_tables(config, ColorTable::default(), None)
    }

    #[test]
    fn latin1_fallback() {
        let text = decode(vec![b'a', 0xE9, b'b'], Path::new("x.edl"));
        assert_eq!(text, "aéb");
    }

    #[test]
    fn convert_minimal_string() {
        let conversion = converter(ConvertConfig::default())
            .convert_str(MINIMAL)
            .expect("converts");
        assert!(conversion.document.contains("<width>800</width>"));
        assert!(conversion.unsupported.is_empty());
    }

    #[test]
    fn refuses_to_overwrite_before_reading() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("out.ui");
        std::fs::write(&output, "existing").expect("write");
        // The input does not exist: the overwrite check must fire first.
        let err = converter(ConvertConfig::default())
            .convert_file(&dir.path().join("missing.edl"), &output)
            .unwrap_err();
        assert!(matches!(err, ConvertError::OutputExists(_)));
    }

    #[test]
    fn missing_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = converter(ConvertConfig::default())
            .convert_file(&dir.path().join("missing.edl"), &dir.path().join("out.ui"))
            .unwrap_err();
        assert!(matches!(err, ConvertError::InputNotFound(_)));
    }

    #[test]
    fn overwrite_replaces_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("screen.edl");
        let output = dir.path().join("screen.ui");
        std::fs::write(&input, MINIMAL).expect("write");
        std::fs::write(&output, "old").expect("write");
        let config = ConvertConfig {
            overwrite: true,
            ..ConvertConfig::default()
        };
        converter(config).convert_file(&input, &output).expect("converts");
        let written = std::fs::read_to_string(&output).expect("read");
        assert!(written.contains("<ui version=\"4.0\">"));
    }

    #[test]
    fn batch_continues_after_failure() {
        let input = tempfile::tempdir().expect("tempdir");
        let output = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(input.path().join("sub")).expect("mkdir");
        std::fs::write(input.path().join("a.edl"), MINIMAL).expect("write");
        std::fs::write(input.path().join("broken.edl"), "no screen here").expect("write");
        std::fs::write(input.path().join("sub/b.edl"), MINIMAL).expect("write");
        std::fs::write(input.path().join("notes.txt"), "skip me").expect("write");

        let report = converter(ConvertConfig::default())
            .convert_dir(input.path(), output.path())
            .expect("batch runs");
        assert_eq!(
            report.converted,
            vec![output.path().join("a.ui"), output.path().join("sub/b.ui")]
        );
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].0.ends_with("broken.edl"));
        assert!(matches!(report.failures[0].1, ConvertError::MissingScreenProperties));
        assert!(output.path().join("sub/b.ui").is_file());
    }

    #[test]
    fn symbol_files_are_found_next_to_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("lamp.edl"),
            format!(
                "{MINIMAL}object activeGroupClass\nbeginObjectProperties\nx 0\ny 0\nw 10\nh 10\n\
                 beginGroup\nobject activeCircleClass\nbeginObjectProperties\nx 0\ny 0\nw 10\nh 10\n\
                 endObjectProperties\nendGroup\nendObjectProperties\n"
            ),
        )
        .expect("write");
        let input = dir.path().join("main.edl");
        std::fs::write(
            &input,
            format!(
                "{MINIMAL}object activeSymbolClass\nbeginObjectProperties\nx 5\ny 5\nw 10\nh 10\n\
                 file \"lamp\"\ncontrolPvs {{\n  \"0\" LAMP\n}}\nendObjectProperties\n"
            ),
        )
        .expect("write");

        let conversion = converter(ConvertConfig::default())
            .convert_file(&input, &dir.path().join("main.ui"))
            .expect("converts");
        assert!(conversion.document.contains("PyDMDrawingEllipse_1"));
        assert!(conversion.document.contains("ch[0] is not None"));
    }

    #[test]
    fn symbol_file_is_read_once_per_conversion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lamp.edl");
        std::fs::write(&path, format!("{MINIMAL}# $(P) lamp\n")).expect("write");
        let search = vec![dir.path().to_path_buf()];
        let calcs = CalcTable::default();
        let mut resolver = Resolver::new(&calcs, "ca://");
        let mut symbols = FileSymbols::new(&search, &mut resolver);

        let first = symbols.load("lamp.edl").expect("loads").expect("found");
        assert!(first.contains("${P} lamp"));
        std::fs::remove_file(&path).expect("remove");
        let second = symbols.load("lamp.edl").expect("loads").expect("cached");
        assert_eq!(first, second);

        assert_eq!(symbols.load("missing.edl").expect("loads"), None);
        std::fs::write(dir.path().join("missing.edl"), MINIMAL).expect("write");
        assert_eq!(symbols.load("missing.edl").expect("loads"), None);
    }
}
