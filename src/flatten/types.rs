use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A scalar that may be stored in a flattened record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlatValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl FlatValue {
    /// Convert a JSON scalar. Null, arrays and objects have no flat form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(FlatValue::Bool(*b)),
            Value::Number(n) => Some(FlatValue::Number(n.clone())),
            Value::String(s) => Some(FlatValue::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<FlatValue> for Value {
    fn from(value: FlatValue) -> Self {
        match value {
            FlatValue::Bool(b) => Value::Bool(b),
            FlatValue::Number(n) => Value::Number(n),
            FlatValue::Text(s) => Value::String(s),
        }
    }
}

/// One flattened snapshot of a document: column name -> scalar.
///
/// Columns keep the order in which they were first written. Writing an
/// existing column replaces its value in place (last write wins).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord {
    fields: Map<String, Value>,
}

impl FlatRecord {
    pub fn new() -> Self {
        FlatRecord { fields: Map::new() }
    }

    /// Insert a column, returning the value it replaced
    pub fn insert(&mut self, column: impl Into<String>, value: FlatValue) -> Option<Value> {
        self.fields.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into this record; its values win on collision
    pub fn merge(&mut self, other: FlatRecord) {
        for (column, value) in other.fields {
            self.fields.insert(column, value);
        }
    }

    /// Render a column the way it is written to a delimited file
    pub fn cell(&self, column: &str) -> Option<String> {
        self.fields.get(column).map(render_cell)
    }
}

/// Text form of a stored scalar: strings verbatim, numbers and booleans via Display
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Maps a structural path prefix to a short column prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupAlias {
    pub prefix: String,
    pub alias: String,
}

impl GroupAlias {
    pub fn new(prefix: impl Into<String>, alias: impl Into<String>) -> Self {
        GroupAlias {
            prefix: prefix.into(),
            alias: alias.into(),
        }
    }
}

/// Configuration for the flattening process
///
/// The denylists are empirical: they were collected from the live dashboard
/// payload and will need revising when the upstream schema changes. All of
/// them can be replaced from the `[flatten]` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlattenConfig {
    /// Separator placed between path segments in column names
    pub separator: String,

    /// Maximum nesting depth before flattening fails
    pub max_depth: usize,

    /// Object keys that carry display hints rather than measurements
    pub key_denylist: Vec<String>,

    /// String values that are leaked metadata tokens, not data
    pub value_denylist: Vec<String>,

    /// String values starting with any of these look like serialized collections
    pub collection_prefixes: Vec<String>,

    /// Fields probed, in order, to name an element of a list of records
    pub identifier_fields: Vec<String>,

    /// Tokens that are dropped when they repeat within one column name
    pub redundant_tokens: Vec<String>,

    /// Short prefixes substituted for known structural prefixes
    pub group_aliases: Vec<GroupAlias>,

    /// Prefix for scalars sitting directly at the top of the flattened value.
    /// An empty prefix disables it.
    pub root_scalar_prefix: Option<String>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            separator: String::from("_"),
            max_depth: 64,
            key_denylist: to_strings(&[
                "label",
                "color",
                "colour",
                "style",
                "units",
                "unit",
                "order",
                "definition",
                "schema",
                "header",
                "headers",
            ]),
            value_denylist: to_strings(&[
                "value", "key", "type", "label", "name", "string", "number", "boolean",
            ]),
            collection_prefixes: to_strings(&["[", "{"]),
            identifier_fields: to_strings(&["type", "service", "name", "label"]),
            redundant_tokens: to_strings(&["REGUP", "REGDOWN", "RRS", "ECRS", "NONSPIN"]),
            group_aliases: vec![GroupAlias::new("aggregations", "AGG")],
            root_scalar_prefix: Some(String::from("system")),
        }
    }
}

impl FlattenConfig {
    /// Check the invariants the normalizer relies on for idempotence
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.separator.is_empty() {
            return Err(ConfigError::Invalid("separator must not be empty".into()));
        }
        if self.separator.chars().any(char::is_alphanumeric) {
            return Err(ConfigError::Invalid(format!(
                "separator {:?} contains characters that can appear inside a name",
                self.separator
            )));
        }
        if self.separator.to_uppercase() != self.separator {
            return Err(ConfigError::Invalid(format!(
                "separator {:?} changes under uppercasing",
                self.separator
            )));
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".into()));
        }
        for alias in &self.group_aliases {
            if alias.prefix.trim().is_empty() || alias.alias.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "group alias {:?} -> {:?} has an empty side",
                    alias.prefix, alias.alias
                )));
            }
        }
        Ok(())
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
