//! JSON flattening - reduce one nested document to one flat record
//!
//! Objects contribute their keys to the column path, lists are classified
//! once (pairs, records or plain values) and then dispatched, and display
//! metadata is filtered out on the way down. The result is a single
//! [`FlatRecord`] whose column names are stable from one poll to the next.

pub mod types;
pub mod classify;
pub mod normalize;
pub mod engine;

pub use types::{FlatRecord, FlatValue, FlattenConfig, GroupAlias, render_cell};
pub use classify::ArrayShape;
pub use normalize::KeyNormalizer;
pub use engine::{FlattenError, Flattener};
