//! Document sources
//!
//! A source produces one parsed JSON document per call or an explicit
//! [`FetchError`]. Nothing here retries; a failed fetch fails the cycle.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Log target for fetching
const LOG_TARGET: &str = "fetch";

/// Deepest container nesting accepted in a fetched body; stays under
/// serde_json's own recursion limit so the fallback parser never trips first
pub const MAX_NESTING: usize = 100;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: StatusCode },

    #[error("{origin} returned an empty body")]
    EmptyBody { origin: String },

    #[error("{origin} did not contain valid JSON")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin} nests containers deeper than {limit} levels")]
    TooDeep { origin: String, limit: usize },

    #[error("failed to read '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that can hand the engine one document per poll
pub trait DocumentSource {
    /// Human readable origin, used in logs
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<Value, FetchError>;
}

/// Fetches the dashboard over HTTP with a fixed user agent and timeout
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(HttpSource { client, url })
    }

}

impl DocumentSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn fetch(&self) -> Result<Value, FetchError> {
        log::debug!(target: LOG_TARGET, "GET {}", self.url);
        let transport = |source| FetchError::Transport {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().map_err(transport)?;
        log::debug!(target: LOG_TARGET, "Received {} bytes from {}", body.len(), self.url);
        parse_document(body.to_vec(), &self.url)
    }
}

/// Reads a previously saved document from disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSource { path: path.into() }
    }
}

impl DocumentSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Value, FetchError> {
        let bytes = fs::read(&self.path).map_err(|source| FetchError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_document(bytes, &self.describe())
    }
}

/// Parse a response body, trying SIMD parsing first
pub fn parse_document(bytes: Vec<u8>, origin: &str) -> Result<Value, FetchError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchError::EmptyBody {
            origin: origin.to_string(),
        });
    }

    if nesting_exceeds(&bytes, MAX_NESTING) {
        return Err(FetchError::TooDeep {
            origin: origin.to_string(),
            limit: MAX_NESTING,
        });
    }

    // simd-json parses in place, so keep the original bytes for the fallback
    let mut scratch = bytes.clone();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(value) => Ok(value),
        Err(e) => {
            log::debug!(target: LOG_TARGET, "SIMD parse of {origin} failed ({e}), retrying with serde_json");
            serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
                origin: origin.to_string(),
                source,
            })
        }
    }
}

/// Bracket scan ahead of parsing; neither parser bounds its recursion
fn nesting_exceeds(bytes: &[u8], limit: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &b in bytes {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return true;
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}
