use anyhow::Result;
use clap::{Parser, ValueEnum};
use critmap::config::OutputFormat;
use critmap::{CritConfig, run};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutputFormat {
    Json,
    Md,
    Plain,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::Md => OutputFormat::Markdown,
            CliOutputFormat::Plain => OutputFormat::Plain,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Rank changed code by review criticality", long_about = None)]
struct Args {
    /// JSON snapshot of sources, diffs and symbol tables
    input: Option<PathBuf>,

    /// Output file path (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<CliOutputFormat>,

    /// Configuration file (defaults to ./critmap.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load from file or default
    let mut config = match &args.config {
        Some(path) => CritConfig::load_from_path(path)?,
        None => CritConfig::load_from_file().unwrap_or_default(),
    };

    // 2. Override with CLI args
    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(o) = args.output {
        config.output = Some(o);
    }
    if let Some(f) = args.format {
        config.output_format = f.into();
    }
    if args.verbose {
        config.verbose = true;
    }

    init_logging(config.verbose);
    run(config)
}
