use crate::flatten::{FlatRecord, FlatValue, FlattenError, Flattener};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Log target for the assembler
const LOG_TARGET: &str = "assembler";

/// Seed column holding the capture time
pub const CAPTURE_COLUMN: &str = "scrape_timestamp_utc";

/// Seed column holding the upstream revision marker
pub const REVISION_COLUMN: &str = "ercot_last_update";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("payload flattened to {found} fields, below the required minimum of {required}")]
    InsufficientFields { found: usize, required: usize },

    #[error(transparent)]
    Flatten(#[from] FlattenError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssemblyConfig {
    /// Wrapper object holding the measurements
    pub payload_key: String,

    /// Top-level field carrying the upstream update marker
    pub revision_key: String,

    /// Fewest flattened columns accepted as a real extraction
    pub min_fields: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        AssemblyConfig {
            payload_key: String::from("data"),
            revision_key: String::from("lastUpdate"),
            min_fields: 5,
        }
    }
}

/// Builds the final row: seed columns followed by the flattened payload
#[derive(Debug, Clone)]
pub struct RecordAssembler {
    flattener: Flattener,
    config: AssemblyConfig,
}

impl RecordAssembler {
    pub fn new(flattener: Flattener, config: AssemblyConfig) -> Self {
        RecordAssembler { flattener, config }
    }

    /// Assemble one record from a fetched document.
    ///
    /// Fails with [`AssemblyError::InsufficientFields`] when the payload
    /// yields fewer than `min_fields` columns; such a record must not be
    /// stored.
    pub fn assemble(&self, document: &Value, captured_at: DateTime<Utc>) -> Result<FlatRecord, AssemblyError> {
        let mut record = FlatRecord::new();
        record.insert(
            CAPTURE_COLUMN,
            FlatValue::Text(captured_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        let wrapped = document
            .get(&self.config.payload_key)
            .filter(|payload| payload.is_object());

        let revision = document
            .get(&self.config.revision_key)
            .or_else(|| wrapped.and_then(|payload| payload.get(&self.config.revision_key)))
            .and_then(revision_value);
        if let Some(revision) = revision {
            record.insert(REVISION_COLUMN, revision);
        }

        let flattened = match wrapped {
            Some(payload) => self.flattener.flatten(payload)?,
            None => {
                log::debug!(
                    target: LOG_TARGET,
                    "No '{}' object in document, flattening from the root",
                    self.config.payload_key
                );
                self.flattener.flatten_without(document, &self.config.revision_key)?
            }
        };

        log::info!(target: LOG_TARGET, "Fields captured: {}", flattened.len());

        if flattened.len() < self.config.min_fields {
            return Err(AssemblyError::InsufficientFields {
                found: flattened.len(),
                required: self.config.min_fields,
            });
        }

        record.merge(flattened);
        Ok(record)
    }
}

/// The revision marker is metadata and is stored verbatim
fn revision_value(value: &Value) -> Option<FlatValue> {
    match value {
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(FlatValue::Text(value.to_string())),
        scalar => FlatValue::from_json(scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::FlattenConfig;
    use chrono::TimeZone;
    use serde_json::json;

    fn assembler(min_fields: usize) -> RecordAssembler {
        let flattener = Flattener::new(FlattenConfig::default()).unwrap();
        let config = AssemblyConfig {
            min_fields,
            ..AssemblyConfig::default()
        };
        RecordAssembler::new(flattener, config)
    }

    fn captured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap()
    }

    fn sample_document() -> Value {
        json!({
            "lastUpdate": "2025-03-01 06:29:50-0600",
            "data": {
                "prc": 5012.3,
                "rows": [
                    {"type": "RRS", "responsibility": 2800, "color": "#123"},
                    {"type": "ECRS", "responsibility": 1500}
                ],
                "aggregations": {"hsl out": 4100}
            }
        })
    }

    #[test]
    fn test_seeds_then_payload() {
        let record = assembler(3).assemble(&sample_document(), captured_at()).unwrap();

        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(
            columns,
            vec![
                CAPTURE_COLUMN,
                REVISION_COLUMN,
                "SYSTEM_PRC",
                "ROWS_RRS_RESPONSIBILITY",
                "ROWS_ECRS_RESPONSIBILITY",
                "AGG_HSL_OUT",
            ]
        );
        assert_eq!(record.get(CAPTURE_COLUMN).unwrap(), "2025-03-01T12:30:05.000000Z");
        assert_eq!(record.get(REVISION_COLUMN).unwrap(), "2025-03-01 06:29:50-0600");
    }

    #[test]
    fn test_revision_marker_is_verbatim() {
        let document = json!({
            "lastUpdate": {"ts": 1},
            "data": {"a": 1}
        });
        let record = assembler(1).assemble(&document, captured_at()).unwrap();
        assert_eq!(record.get(REVISION_COLUMN).unwrap(), r#"{"ts":1}"#);
    }

    #[test]
    fn test_revision_marker_optional() {
        let record = assembler(1).assemble(&json!({"data": {"a": 1}}), captured_at()).unwrap();
        assert!(!record.contains(REVISION_COLUMN));
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_root_fallback_without_wrapper() {
        let document = json!({
            "lastUpdate": 1740832190,
            "prc": 5000,
            "hsl": 4000
        });
        let record = assembler(2).assemble(&document, captured_at()).unwrap();

        assert_eq!(record.get(REVISION_COLUMN).unwrap(), &json!(1740832190));
        assert_eq!(record.get("SYSTEM_PRC").unwrap(), &json!(5000));
        assert!(!record.contains("LASTUPDATE"));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn test_non_object_wrapper_falls_back_to_root() {
        let document = json!({"data": [1, 2], "other": 3});
        let record = assembler(3).assemble(&document, captured_at()).unwrap();
        assert_eq!(record.get("DATA_0").unwrap(), &json!(1));
        assert_eq!(record.get("SYSTEM_OTHER").unwrap(), &json!(3));
    }

    #[test]
    fn test_confidence_floor() {
        let document = json!({"lastUpdate": "x", "data": {"a": 1, "color": "red"}});
        let err = assembler(2).assemble(&document, captured_at()).unwrap_err();
        assert_eq!(err, AssemblyError::InsufficientFields { found: 1, required: 2 });
    }

    #[test]
    fn test_seed_columns_are_not_counted() {
        let document = json!({"lastUpdate": "x", "data": {}});
        let err = assembler(1).assemble(&document, captured_at()).unwrap_err();
        assert_eq!(err, AssemblyError::InsufficientFields { found: 0, required: 1 });
    }

    #[test]
    fn test_seed_names_cannot_collide() {
        let document = json!({"data": {"scrape_timestamp_utc": "spoof", "ercot_last_update": "spoof"}});
        let record = assembler(2).assemble(&document, captured_at()).unwrap();
        assert_eq!(record.get(CAPTURE_COLUMN).unwrap(), "2025-03-01T12:30:05.000000Z");
        assert_eq!(record.get("SYSTEM_SCRAPE_TIMESTAMP_UTC").unwrap(), "spoof");
    }

    #[test]
    fn test_depth_overflow_surfaces() {
        let flattener = Flattener::new(FlattenConfig {
            max_depth: 2,
            ..FlattenConfig::default()
        })
        .unwrap();
        let assembler = RecordAssembler::new(flattener, AssemblyConfig::default());
        let err = assembler
            .assemble(&json!({"data": {"a": {"b": {"c": 1}}}}), captured_at())
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Flatten(FlattenError::DepthExceeded { .. })));
    }
}
