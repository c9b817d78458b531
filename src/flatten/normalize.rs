//! Column name normalization
//!
//! A path becomes a column name by joining its segments, turning every
//! whitespace, colon, period and hyphen run (and any character of the
//! separator itself) into the separator, dropping empty tokens and
//! uppercasing. Tokens therefore never contain separator characters, which
//! keeps a joined name splitting back into the same tokens. Repeated group tokens are then removed and
//! known group prefixes are swapped for their aliases.

use crate::config::ConfigError;
use crate::flatten::types::FlattenConfig;
use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s:.\-]+").unwrap()
});

/// Turns raw paths into stable column names
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    separator: String,
    redundant_tokens: Vec<String>,
    aliases: Vec<(Vec<String>, Vec<String>)>,
}

impl KeyNormalizer {
    /// Build a normalizer from the flatten configuration.
    ///
    /// Alias tables where one entry's prefix and another entry's alias
    /// overlap are rejected, since normalizing twice would rewrite the name
    /// a second time.
    pub fn new(config: &FlattenConfig) -> Result<Self, ConfigError> {
        let mut normalizer = KeyNormalizer {
            separator: config.separator.clone(),
            redundant_tokens: config.redundant_tokens.iter().map(|t| t.to_uppercase()).collect(),
            aliases: Vec::new(),
        };

        let aliases: Vec<(Vec<String>, Vec<String>)> = config
            .group_aliases
            .iter()
            .map(|a| (normalizer.tokens(&a.prefix), normalizer.tokens(&a.alias)))
            .collect();

        for (prefix, _) in &aliases {
            if prefix.is_empty() {
                return Err(ConfigError::Invalid("group alias prefix normalizes to nothing".into()));
            }
            for (_, alias) in &aliases {
                if alias.is_empty() {
                    return Err(ConfigError::Invalid("group alias normalizes to nothing".into()));
                }
                if alias.starts_with(prefix) || prefix.starts_with(alias) {
                    return Err(ConfigError::Invalid(format!(
                        "group alias {} overlaps prefix {}",
                        alias.join(&normalizer.separator),
                        prefix.join(&normalizer.separator)
                    )));
                }
            }
        }

        normalizer.aliases = aliases;
        Ok(normalizer)
    }

    /// Normalize a full path into a column name
    pub fn normalize<S: AsRef<str>>(&self, path: &[S]) -> String {
        let mut tokens = Vec::new();
        for segment in path {
            tokens.extend(self.tokens(segment.as_ref()));
        }

        // Each pass either applies an alias (at most once, see `new`) or
        // strictly shrinks the token list, so this terminates.
        loop {
            let before = tokens.len();
            let aliased = self.apply_alias(&mut tokens);
            self.drop_repeated(&mut tokens);
            if !aliased && tokens.len() == before {
                break;
            }
        }

        tokens.join(&self.separator)
    }

    /// Normalize a single name without alias or redundancy rules
    pub fn canonicalize(&self, segment: &str) -> String {
        self.tokens(segment).join(&self.separator)
    }

    fn tokens(&self, raw: &str) -> Vec<String> {
        SEPARATOR_CHARS
            .split(raw)
            .flat_map(|part| part.split(|c: char| self.separator.contains(c)))
            .filter(|t| !t.is_empty())
            .map(str::to_uppercase)
            .collect()
    }

    fn apply_alias(&self, tokens: &mut Vec<String>) -> bool {
        for (prefix, alias) in &self.aliases {
            if tokens.starts_with(prefix) {
                tokens.splice(0..prefix.len(), alias.iter().cloned());
                return true;
            }
        }
        false
    }

    fn drop_repeated(&self, tokens: &mut Vec<String>) {
        if self.redundant_tokens.is_empty() {
            return;
        }
        let mut seen: Vec<String> = Vec::new();
        tokens.retain(|token| {
            if !self.redundant_tokens.contains(token) {
                return true;
            }
            if seen.contains(token) {
                return false;
            }
            seen.push(token.clone());
            true
        });
    }
}
