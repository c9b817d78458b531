//! # Dashmelt - dashboard JSON to flat rows
//!
//! Polls a dashboard API that returns loosely structured, deeply nested JSON
//! and turns each poll into one flat row appended to a CSV file.
//!
//! ## Modules
//!
//! - **flatten**: reduce a JSON document to a record of scalar columns
//! - **record**: seed metadata columns, enforce a minimum field count, append to CSV
//! - **fetch**: obtain one document per poll over HTTP or from disk
//! - **poll**: run one fetch/assemble/append cycle with exit codes for schedulers
//!
//! ## Quick Start
//!
//! ```rust
//! use dashmelt::flatten::{FlattenConfig, Flattener};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = json!({
//!     "group": [["a", 1], ["b", 2]],
//!     "rows": [
//!         {"type": "RRS", "val": 5, "color": "#00f"},
//!         {"name": "X", "val": 7}
//!     ]
//! });
//!
//! let flattener = Flattener::new(FlattenConfig::default())?;
//! let record = flattener.flatten(&data)?;
//!
//! assert_eq!(record.get("GROUP_A").unwrap(), 1);
//! assert_eq!(record.get("ROWS_RRS_VAL").unwrap(), 5);
//! assert_eq!(record.get("ROWS_X_VAL").unwrap(), 7);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::Value;
use std::io::{BufRead, Write};

pub mod config;
pub mod fetch;
pub mod flatten;
pub mod logging;
pub mod poll;
pub mod record;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigError};
pub use fetch::{DocumentSource, FetchError, FileSource, HttpSource};
pub use flatten::{FlatRecord, FlatValue, FlattenConfig, FlattenError, Flattener};
pub use poll::{PollError, run_cycle};
pub use record::{AppendOutcome, AssemblyConfig, AssemblyError, CsvSink, RecordAssembler};

/// Flatten a stream of JSON documents, writing one JSON object per line
///
/// Documents may be concatenated or newline delimited. Returns the number of
/// documents processed.
pub fn flatten_json<R: BufRead, W: Write>(reader: R, writer: &mut W, flattener: &Flattener) -> Result<usize> {
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();
    let mut count = 0;

    for (idx, result) in stream.enumerate() {
        let value = result.with_context(|| format!("Failed to parse JSON document {}", idx + 1))?;
        let record = flattener.flatten(&value)?;
        let line = serde_json::to_string(&record).context("Failed to serialize record")?;
        writeln!(writer, "{}", line).context("Failed to write record")?;
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_stream() {
        let input = "{\"a\": {\"b\": 1}}\n{\"rows\": [{\"type\": \"RRS\", \"mw\": 2}]}\n";
        let flattener = Flattener::new(FlattenConfig::default()).unwrap();
        let mut output = Vec::new();

        let count = flatten_json(input.as_bytes(), &mut output, &flattener).unwrap();

        assert_eq!(count, 2);
        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, vec![r#"{"A_B":1}"#, r#"{"ROWS_RRS_MW":2}"#]);
    }

    #[test]
    fn test_flatten_stream_reports_bad_document() {
        let flattener = Flattener::new(FlattenConfig::default()).unwrap();
        let mut output = Vec::new();

        let err = flatten_json("{\"a\": 1}\n{oops".as_bytes(), &mut output, &flattener).unwrap_err();

        assert!(err.to_string().contains("document 2"));
        assert_eq!(String::from_utf8(output).unwrap(), "{\"SYSTEM_A\":1}\n");
    }
}
