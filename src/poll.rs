//! One fetch, assemble and append cycle
//!
//! Exit codes: `0` success, `1` fetch failure, `2` the document was fetched
//! but did not produce a usable record (including bodies nested too deeply to
//! parse), `3` the record could not be stored.

use crate::fetch::{DocumentSource, FetchError};
use crate::flatten::FlatRecord;
use crate::record::{AppendOutcome, AssemblyError, CsvSink, RecordAssembler, SinkError};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Log target for the poll cycle
const LOG_TARGET: &str = "poll";

pub const EXIT_FETCH_FAILED: u8 = 1;
pub const EXIT_REJECTED: u8 = 2;
pub const EXIT_STORAGE_FAILED: u8 = 3;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to retrieve data")]
    Fetch(#[from] FetchError),

    #[error("document rejected")]
    Assembly(#[from] AssemblyError),

    #[error("failed to store record")]
    Sink(#[from] SinkError),
}

impl PollError {
    /// Process exit code reported to the scheduler
    pub fn exit_code(&self) -> u8 {
        match self {
            PollError::Fetch(FetchError::TooDeep { .. }) => EXIT_REJECTED,
            PollError::Fetch(_) => EXIT_FETCH_FAILED,
            PollError::Assembly(_) => EXIT_REJECTED,
            PollError::Sink(_) => EXIT_STORAGE_FAILED,
        }
    }
}

/// Fetch one document and assemble it, without storing anything
pub fn capture(
    source: &dyn DocumentSource,
    assembler: &RecordAssembler,
    captured_at: DateTime<Utc>,
) -> Result<FlatRecord, PollError> {
    log::info!(target: LOG_TARGET, "Fetching {}", source.describe());
    let document = source.fetch()?;
    log::info!(target: LOG_TARGET, "Data fetched successfully, flattening");
    Ok(assembler.assemble(&document, captured_at)?)
}

/// Run a full cycle; the record is only appended when it passed assembly
pub fn run_cycle(
    source: &dyn DocumentSource,
    assembler: &RecordAssembler,
    sink: &CsvSink,
    captured_at: DateTime<Utc>,
) -> Result<AppendOutcome, PollError> {
    let record = capture(source, assembler, captured_at)?;
    log::info!(target: LOG_TARGET, "Saving to {}", sink.path().display());
    Ok(sink.append(&record)?)
}
