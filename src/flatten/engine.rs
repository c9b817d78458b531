use crate::config::ConfigError;
use crate::flatten::classify::ArrayShape;
use crate::flatten::normalize::KeyNormalizer;
use crate::flatten::types::{FlatRecord, FlatValue, FlattenConfig};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlattenError {
    #[error("document nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },
}

/// Reduces a JSON document to one flat record of scalar columns
#[derive(Debug, Clone)]
pub struct Flattener {
    config: FlattenConfig,
    normalizer: KeyNormalizer,
    denied_keys: HashSet<String>,
    denied_values: HashSet<String>,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let normalizer = KeyNormalizer::new(&config)?;
        let denied_keys = config.key_denylist.iter().map(|k| fold(k)).collect();
        let denied_values = config.value_denylist.iter().map(|v| fold(v)).collect();

        Ok(Flattener {
            config,
            normalizer,
            denied_keys,
            denied_values,
        })
    }

    /// Flatten a value from the document root
    pub fn flatten(&self, value: &Value) -> Result<FlatRecord, FlattenError> {
        self.flatten_at(value, &[])
    }

    /// Flatten a value whose position is already `path`
    pub fn flatten_at(&self, value: &Value, path: &[String]) -> Result<FlatRecord, FlattenError> {
        let mut out = FlatRecord::new();
        let mut path = path.to_vec();
        self.flatten_value(value, &mut path, 0, &mut out)?;
        Ok(out)
    }

    /// Flatten a root object while leaving out one of its top-level keys
    pub fn flatten_without(&self, value: &Value, root_key: &str) -> Result<FlatRecord, FlattenError> {
        let mut out = FlatRecord::new();
        let mut path = Vec::new();
        match value {
            Value::Object(obj) => self.flatten_object(obj, Some(root_key), &mut path, 0, &mut out)?,
            other => self.flatten_value(other, &mut path, 0, &mut out)?,
        }
        Ok(out)
    }

    /// Recursively flatten a JSON value into `out`
    fn flatten_value(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        depth: usize,
        out: &mut FlatRecord,
    ) -> Result<(), FlattenError> {
        if depth > self.config.max_depth {
            return Err(FlattenError::DepthExceeded {
                max_depth: self.config.max_depth,
            });
        }

        match value {
            Value::Object(obj) => self.flatten_object(obj, None, path, depth, out),
            Value::Array(arr) => self.flatten_array(arr, path, depth, out),
            Value::Null => Ok(()),
            scalar => {
                self.emit_scalar(scalar, path, depth, out);
                Ok(())
            }
        }
    }

    fn flatten_object(
        &self,
        obj: &Map<String, Value>,
        skip: Option<&str>,
        path: &mut Vec<String>,
        depth: usize,
        out: &mut FlatRecord,
    ) -> Result<(), FlattenError> {
        for (key, child) in obj {
            if skip == Some(key.as_str()) || self.is_denied_key(key) {
                continue;
            }
            path.push(key.clone());
            let result = self.flatten_value(child, path, depth + 1, out);
            path.pop();
            result?;
        }
        Ok(())
    }

    fn flatten_array(
        &self,
        arr: &[Value],
        path: &mut Vec<String>,
        depth: usize,
        out: &mut FlatRecord,
    ) -> Result<(), FlattenError> {
        match ArrayShape::classify(arr) {
            ArrayShape::Empty => Ok(()),
            ArrayShape::PairList => self.flatten_pairs(arr, path, depth, out),
            ArrayShape::RecordList => self.flatten_records(arr, path, depth, out),
            ArrayShape::ScalarList => {
                for (idx, item) in arr.iter().enumerate() {
                    path.push(idx.to_string());
                    let result = self.flatten_value(item, path, depth + 1, out);
                    path.pop();
                    result?;
                }
                Ok(())
            }
        }
    }

    /// `[["name", value], ...]`: each name becomes a path segment
    fn flatten_pairs(
        &self,
        arr: &[Value],
        path: &mut Vec<String>,
        depth: usize,
        out: &mut FlatRecord,
    ) -> Result<(), FlattenError> {
        for pair in arr {
            let Some([Value::String(name), value]) = pair.as_array().map(Vec::as_slice) else {
                continue;
            };
            if self.is_denied_key(name) {
                continue;
            }
            path.push(self.normalizer.canonicalize(name));
            let result = self.flatten_value(value, path, depth + 1, out);
            path.pop();
            result?;
        }
        Ok(())
    }

    /// `[{...}, ...]`: each element is named by its identifier field
    fn flatten_records(
        &self,
        arr: &[Value],
        path: &mut Vec<String>,
        depth: usize,
        out: &mut FlatRecord,
    ) -> Result<(), FlattenError> {
        for (idx, item) in arr.iter().enumerate() {
            let Value::Object(obj) = item else {
                continue;
            };
            let (identifier, consumed) = self.record_identifier(obj, idx);
            path.push(identifier);
            let result = self.flatten_object(obj, consumed, path, depth + 1, out);
            path.pop();
            result?;
        }
        Ok(())
    }

    /// Pick the first usable identifier field, falling back to `INDEX{idx}`
    fn record_identifier(&self, obj: &Map<String, Value>, idx: usize) -> (String, Option<&str>) {
        for field in &self.config.identifier_fields {
            let identifier = match obj.get(field.as_str()) {
                Some(Value::String(s)) if !s.trim().is_empty() && !self.is_structural_token(s) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            return (identifier, Some(field.as_str()));
        }
        (format!("INDEX{idx}"), None)
    }

    fn emit_scalar(&self, value: &Value, path: &[String], depth: usize, out: &mut FlatRecord) {
        if path.is_empty() {
            return;
        }
        if let Value::String(s) = value {
            if self.is_structural_token(s) {
                return;
            }
        }
        let Some(flat) = FlatValue::from_json(value) else {
            return;
        };

        let column = self.normalizer.normalize(path);
        if column.is_empty() {
            return;
        }
        let column = match &self.config.root_scalar_prefix {
            Some(prefix) if depth == 1 => {
                let mut prefixed = Vec::with_capacity(path.len() + 1);
                prefixed.push(prefix.clone());
                prefixed.extend(path.iter().cloned());
                self.normalizer.normalize(&prefixed)
            }
            _ => column,
        };
        out.insert(column, flat);
    }

    fn is_denied_key(&self, key: &str) -> bool {
        self.denied_keys.contains(&fold(key))
    }

    /// Metadata tokens or serialized collections leaking into data values
    fn is_structural_token(&self, value: &str) -> bool {
        let trimmed = value.trim();
        self.denied_values.contains(&fold(trimmed))
            || self
                .config
                .collection_prefixes
                .iter()
                .any(|p| !p.is_empty() && trimmed.starts_with(p.as_str()))
    }
}

fn fold(s: &str) -> String {
    s.trim().to_lowercase()
}
