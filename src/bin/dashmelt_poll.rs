//! dashmelt-poll: capture one dashboard snapshot as a CSV row
//!
//! Usage:
//!   # Poll the default dashboard and append to ercot_ancillary_data.csv
//!   dashmelt-poll
//!
//!   # Use a config file and a different sink
//!   dashmelt-poll --config dashmelt.toml --sink samples.csv
//!
//!   # Replay a saved response and print the record instead of storing it
//!   dashmelt-poll --input saved.json --dry-run
//!
//! Exits 0 only when a record was appended (or printed with --dry-run),
//! 1 when the fetch failed, 2 when the document was rejected and 3 when
//! the configuration or the sink failed.

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use dashmelt::fetch::{DocumentSource, FileSource, HttpSource};
use dashmelt::logging::{LogLevel, init_logging};
use dashmelt::poll::{self, EXIT_STORAGE_FAILED};
use dashmelt::{AppConfig, AppendOutcome, CsvSink, Flattener, RecordAssembler};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "dashmelt-poll")]
#[command(about = "Fetch a dashboard document and append it to a CSV file as one flat row", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Dashboard URL (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Read the document from a file instead of the network
    #[arg(long, value_name = "FILE", conflicts_with = "url")]
    input: Option<PathBuf>,

    /// CSV file to append to (overrides the config file)
    #[arg(long, value_name = "PATH")]
    sink: Option<PathBuf>,

    /// Minimum number of flattened fields for a record to be accepted
    #[arg(long)]
    min_fields: Option<usize>,

    /// Network timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print the record as JSON instead of appending it
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    let (config, input, dry_run) = match build_config(args) {
        Ok(parts) => parts,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(EXIT_STORAGE_FAILED);
        }
    };

    match run(&config, input, dry_run) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<poll::PollError>()
                .map_or(EXIT_STORAGE_FAILED, poll::PollError::exit_code);
            log::error!("{e:#}");
            ExitCode::from(code)
        }
    }
}

/// Merge the config file with command line overrides
fn build_config(args: Args) -> Result<(AppConfig, Option<PathBuf>, bool)> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };

    if let Some(url) = args.url {
        config.url = url;
    }
    if let Some(sink) = args.sink {
        config.sink = sink;
    }
    if let Some(min_fields) = args.min_fields {
        config.assembly.min_fields = min_fields;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.timeout_secs = timeout_secs;
    }
    config.validate()?;

    Ok((config, args.input, args.dry_run))
}

fn run(config: &AppConfig, input: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let flattener = Flattener::new(config.flatten.clone()).context("Invalid flatten configuration")?;
    let assembler = RecordAssembler::new(flattener, config.assembly.clone());

    let source: Box<dyn DocumentSource> = match input {
        Some(path) => Box::new(FileSource::new(path)),
        None => Box::new(
            HttpSource::new(config.url.clone(), &config.user_agent, config.timeout())
                .map_err(poll::PollError::from)?,
        ),
    };

    if dry_run {
        let record = poll::capture(source.as_ref(), &assembler, Utc::now())?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let sink = CsvSink::new(&config.sink);
    match poll::run_cycle(source.as_ref(), &assembler, &sink, Utc::now())? {
        AppendOutcome::Recovered { columns } => {
            log::warn!("Sink was unreadable and has been replaced by a single row of {columns} columns");
        }
        AppendOutcome::Created { .. } | AppendOutcome::Appended { .. } => {}
    }
    log::info!("Done");
    Ok(())
}
