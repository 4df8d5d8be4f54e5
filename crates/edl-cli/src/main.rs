//! edl2ui: convert EDM `.edl` displays to PyDM `.ui` files.

use clap::Parser;
use edl_core::{ConvertConfig, Converter};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "edl2ui")]
#[command(about = "Convert EDM displays (.edl) into PyDM Qt Designer files (.ui)", long_about = None)]
#[command(version)]
struct Cli {
    /// An .edl file, or a directory converted recursively
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output .ui file or output directory (defaults next to the input)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Replace existing output files
    #[arg(short = 'f', long)]
    overwrite: bool,

    /// Wrap the screen contents in a scroll area
    #[arg(long)]
    scrollable: bool,

    /// EDM palette file (colors.list)
    #[arg(long, value_name = "FILE")]
    colors: Option<PathBuf>,

    /// EDM calculation library (calc.list)
    #[arg(long, value_name = "FILE")]
    calc: Option<PathBuf>,

    /// Extra directory searched for symbol files (repeatable)
    #[arg(short = 'I', long = "symbol-path", value_name = "DIR")]
    symbol_paths: Vec<PathBuf>,

    /// Geometry scale factor
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Horizontal offset added to top-level widgets
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset_x: i32,

    /// Vertical offset added to top-level widgets
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    offset_y: i32,

    /// Points subtracted from every EDM font size
    #[arg(long, default_value_t = 2)]
    font_decrease: i32,

    /// Input file extension picked up in directory mode
    #[arg(long, default_value = "edl")]
    extension: String,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> ConvertConfig {
        let mut config = ConvertConfig::from_env();
        if self.colors.is_some() {
            config.color_file = self.colors.clone();
        }
        config.calc_file = self.calc.clone();
        config.symbol_search_paths.extend(self.symbol_paths.iter().cloned());
        config.scale = self.scale;
        config.offset_x = self.offset_x;
        config.offset_y = self.offset_y;
        config.font_size_decrease = self.font_decrease;
        config.overwrite = self.overwrite;
        config.scrollable = self.scrollable;
        config.input_extension = self.extension.trim_start_matches('.').to_string();
        config
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let converter = match Converter::new(cli.config()) {
        Ok(converter) => converter,
        Err(err) => {
            log::error!("{err}");
            process::exit(2);
        }
    };

    let exit_code = if cli.input.is_dir() {
        handle_dir(&converter, &cli.input, cli.output.as_deref())
    } else {
        handle_file(&converter, &cli.input, cli.output.as_deref())
    };
    process::exit(exit_code);
}

fn handle_file(converter: &Converter, input: &Path, output: Option<&Path>) -> i32 {
    let output = match output {
        Some(path) if path.is_dir() => path.join(input.with_extension("ui").file_name().unwrap_or_default()),
        Some(path) => path.to_path_buf(),
        None => input.with_extension("ui"),
    };

    match converter.convert_file(input, &output) {
        Ok(conversion) => {
            log::info!(
                "{}: {} diagnostics",
                input.display(),
                conversion.diagnostics.len()
            );
            for widget in &conversion.unsupported {
                println!(
                    "unsupported: {} at ({}, {}) {}x{}{}",
                    widget.class,
                    widget.bounds.x,
                    widget.bounds.y,
                    widget.bounds.width,
                    widget.bounds.height,
                    widget
                        .channel
                        .as_deref()
                        .map(|c| format!(" channel {c}"))
                        .unwrap_or_default()
                );
            }
            println!("wrote {}", output.display());
            0
        }
        Err(err) => {
            log::error!("{}: {err}", input.display());
            1
        }
    }
}

fn handle_dir(converter: &Converter, input: &Path, output: Option<&Path>) -> i32 {
    let output = output.unwrap_or(input);
    match converter.convert_dir(input, output) {
        Ok(report) => {
            println!(
                "converted {} files, {} failed",
                report.converted.len(),
                report.failures.len()
            );
            for (path, err) in &report.failures {
                println!("failed: {}: {err}", path.display());
            }
            if report.is_success() { 0 } else { 1 }
        }
        Err(err) => {
            log::error!("{}: {err}", input.display());
            1
        }
    }
}
