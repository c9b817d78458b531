//! Append-only CSV sink
//!
//! Each append reads the whole file, widens the header to the union of the
//! existing columns and the new record's columns, pads older rows with empty
//! cells and writes everything back through a temporary file that is renamed
//! over the original. An advisory lock on `<sink>.lock` serializes
//! concurrent appenders.

use crate::flatten::FlatRecord;
use fs4::fs_std::FileExt;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Log target for the sink
const LOG_TARGET: &str = "sink";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink '{}' is not a readable table: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write CSV to '{}'", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// What an append did to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The sink did not exist (or was empty) and now holds one row
    Created { columns: usize },
    /// A row was added to an existing sink
    Appended { rows: usize, columns: usize, new_columns: usize },
    /// The existing sink could not be read and was replaced by this row alone
    Recovered { columns: usize },
}

/// In-memory form of the sink contents
#[derive(Debug, Default, PartialEq, Eq)]
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, widening the header if it brings new columns.
    ///
    /// A sink that exists but cannot be parsed is overwritten with a
    /// single-row table holding only `record`. The prior contents are lost.
    pub fn append(&self, record: &FlatRecord) -> Result<AppendOutcome, SinkError> {
        let _lock = self.lock()?;

        let existing = match self.read_table() {
            Ok(existing) => existing,
            Err(SinkError::Corrupt { path, reason }) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Sink '{}' is corrupt ({reason}), overwriting it with the current record only",
                    path.display()
                );
                let table = Self::single_row(record);
                let columns = table.header.len();
                self.write_table(&table)?;
                return Ok(AppendOutcome::Recovered { columns });
            }
            Err(e) => return Err(e),
        };

        let Some(mut table) = existing else {
            let table = Self::single_row(record);
            let columns = table.header.len();
            self.write_table(&table)?;
            log::info!(target: LOG_TARGET, "Created {} with {columns} columns", self.path.display());
            return Ok(AppendOutcome::Created { columns });
        };

        let known: HashSet<String> = table.header.iter().cloned().collect();
        let new_columns: Vec<String> = record
            .columns()
            .filter(|c| !known.contains(*c))
            .map(str::to_string)
            .collect();

        if !new_columns.is_empty() {
            log::info!(
                target: LOG_TARGET,
                "Adding {} new column(s) to {}",
                new_columns.len(),
                self.path.display()
            );
        }
        table.header.extend(new_columns.iter().cloned());
        let width = table.header.len();
        for row in &mut table.rows {
            row.resize(width, String::new());
        }
        let row = table
            .header
            .iter()
            .map(|column| record.cell(column).unwrap_or_default())
            .collect();
        table.rows.push(row);

        self.write_table(&table)?;
        log::info!(target: LOG_TARGET, "Appended data. Total rows: {}", table.rows.len());

        Ok(AppendOutcome::Appended {
            rows: table.rows.len(),
            columns: width,
            new_columns: new_columns.len(),
        })
    }

    fn single_row(record: &FlatRecord) -> Table {
        let header: Vec<String> = record.columns().map(str::to_string).collect();
        let row = header
            .iter()
            .map(|column| record.cell(column).unwrap_or_default())
            .collect();
        Table {
            header,
            rows: vec![row],
        }
    }

    /// Read the current table; `None` when there is nothing to append to yet
    fn read_table(&self) -> Result<Option<Table>, SinkError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let corrupt = |reason: String| SinkError::Corrupt {
            path: self.path.clone(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| corrupt(e.to_string()))?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| corrupt(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.is_empty() {
            return Ok(None);
        }

        {
            let mut seen = HashSet::new();
            if let Some(dup) = header.iter().find(|c| !seen.insert(c.as_str())) {
                return Err(corrupt(format!("duplicate column '{dup}'")));
            }
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| corrupt(e.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Some(Table { header, rows }))
    }

    /// Write the table to a temporary file beside the sink, then rename it over the sink
    fn write_table(&self, table: &Table) -> Result<(), SinkError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_err = |source: io::Error| SinkError::Io {
            path: self.path.clone(),
            source,
        };
        let csv_err = |source: csv::Error| SinkError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        {
            let mut writer = csv::Writer::from_writer(temp.as_file_mut());
            writer.write_record(&table.header).map_err(csv_err)?;
            for row in &table.rows {
                writer.write_record(row).map_err(csv_err)?;
            }
            writer.flush().map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        let _ = temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<SinkLockGuard, SinkError> {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| SinkError::Io {
                path: lock_path.clone(),
                source,
            })?;
        FileExt::lock_exclusive(&file).map_err(|source| SinkError::Io {
            path: lock_path.clone(),
            source,
        })?;
        log::debug!(target: LOG_TARGET, "Acquired sink lock at '{}'", lock_path.display());
        Ok(SinkLockGuard(file))
    }
}

/// Guard that releases the sink lock when dropped
#[derive(Debug)]
struct SinkLockGuard(File);

impl Drop for SinkLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.0) {
            log::warn!(target: LOG_TARGET, "Failed to unlock sink: {e}");
        }
    }
}
