//! dashmelt-flatten: show the columns a document flattens to
//!
//! Usage:
//!   # Read from file, output to stdout
//!   dashmelt-flatten response.json
//!
//!   # Read a stream of saved responses from stdin
//!   cat responses.jsonl | dashmelt-flatten
//!
//!   # Try a different separator and denylist
//!   dashmelt-flatten --separator __ --key-denylist label,color,tooltip response.json

// MiMalloc keeps allocation cheap for the many small strings built per document
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use dashmelt::logging::{LogLevel, init_logging};
use dashmelt::{AppConfig, Flattener};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dashmelt-flatten")]
#[command(about = "Flatten JSON documents into flat column records", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// TOML configuration file; only its [flatten] section is used
    #[arg(long, short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Separator between path segments (default: "_")
    #[arg(long)]
    separator: Option<String>,

    /// Maximum nesting depth (default: 64)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Comma-separated keys to drop as display metadata
    #[arg(long)]
    key_denylist: Option<String>,

    /// Prefix for top-level scalars (default: "system"; "" disables it)
    #[arg(long)]
    root_prefix: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    log_level: LogLevel,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?.flatten,
        None => AppConfig::default().flatten,
    };
    if let Some(sep) = args.separator {
        config.separator = sep;
    }
    if let Some(depth) = args.max_depth {
        config.max_depth = depth;
    }
    if let Some(keys) = args.key_denylist {
        config.key_denylist = keys
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(prefix) = args.root_prefix {
        config.root_scalar_prefix = Some(prefix);
    }

    let flattener = Flattener::new(config).context("Invalid flatten configuration")?;

    let reader: Box<dyn BufRead> = if let Some(path) = &args.input {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        ))
    } else {
        Box::new(BufReader::new(std::io::stdin()))
    };

    let stdout = std::io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let count = dashmelt::flatten_json(reader, &mut writer, &flattener)?;
    writer.flush()?;

    if count == 0 {
        log::warn!("No JSON documents found in input");
    }

    Ok(())
}
