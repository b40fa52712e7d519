//! CLI entry point: loads configuration, builds the RHIR from a declarative
//! model file, and runs it through the requested encoding.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use raceharness::config::Config;
use raceharness::error::CompileError;
use raceharness::pipeline::{self, Encoding, PipelineOptions};
use raceharness::rhir::builder::{ModelFile, RhirBuilder};
use raceharness::rhir::context::RhirContext;

/// Compiles a communicating-process model into a locked C race harness.
#[derive(Parser, Debug)]
#[command(name = "raceharness", version, about)]
struct Cli {
    /// Declarative JSON model file.
    model_file: PathBuf,

    /// Output encoding.
    #[arg(long, value_enum)]
    encoding: Encoding,

    /// Directory containing `bin/pins2lts-seq` (overrides config).
    #[arg(long)]
    ltsmin: Option<PathBuf>,

    /// Directory containing `libpins-stir.so` and `stir-bin-export` (overrides config).
    #[arg(long)]
    pins_stir: Option<PathBuf>,

    /// Prepend the interface header to the generated C source.
    #[arg(long)]
    embed_header: bool,

    /// Where to write the generated output. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Explicit configuration file, in place of the default search path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Suppress informational logging.
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .unwrap_or_default();

    init_logging(&config, cli.quiet);

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "compilation failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: &Cli, config: &Config) -> Result<(), CompileError> {
    let text = std::fs::read_to_string(&cli.model_file)?;
    let model: ModelFile = serde_json::from_str(&text)?;

    let mut ctx = RhirContext::new();
    let module = RhirBuilder::build(&mut ctx, &model)?;

    let ltsmin = cli.ltsmin.as_deref().or(config.tools.ltsmin.as_deref());
    let pins_stir = cli.pins_stir.as_deref().or(config.tools.pins_stir.as_deref());

    let output = pipeline::run(
        &mut ctx,
        module,
        PipelineOptions {
            encoding: cli.encoding,
            embed_header: cli.embed_header || config.codegen.embed_header,
            ltsmin,
            pins_stir,
        },
    )?;

    match &cli.output {
        Some(path) => std::fs::write(path, output)?,
        None => println!("{output}"),
    }
    Ok(())
}
