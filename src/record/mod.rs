//! Record assembly and storage
//!
//! The assembler turns one fetched document into one row (seed columns plus
//! the flattened payload) and the sink appends that row to a CSV file whose
//! header grows as new columns appear.

pub mod assembler;
pub mod sink;

pub use assembler::{AssemblyConfig, AssemblyError, RecordAssembler, CAPTURE_COLUMN, REVISION_COLUMN};
pub use sink::{AppendOutcome, CsvSink, SinkError};
