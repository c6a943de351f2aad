//! Client settings.
//!
//! Settings come from an optional TOML file and `FCREPO_*` environment
//! variables, in that order. Every field has a default, so an empty file is
//! a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::DEFAULT_BASE_URI;

/// Default chunk size for [`Datastream::stream`](crate::Datastream::stream).
pub const DEFAULT_STREAM_CHUNK_SIZE: usize = 8192;

/// Behavior switches shared by every entity created through one
/// [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Base URI objects are addressed under, for repositories built from
    /// these settings.
    pub base_uri: String,
    /// Fetch remote content to decide whether local content changed.
    ///
    /// When off, local content is compared against whatever remote content
    /// is already cached.
    pub eager_load_datastream_content: bool,
    /// Size of the chunks yielded by content streams.
    pub stream_chunk_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_uri: DEFAULT_BASE_URI.to_string(),
            eager_load_datastream_content: false,
            stream_chunk_size: DEFAULT_STREAM_CHUNK_SIZE,
        }
    }
}

impl Settings {
    /// Parses settings from TOML.
    ///
    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) on malformed input or unknown
    /// keys.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(s)?;
        settings.normalize();
        Ok(settings)
    }

    /// Reads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// [`Error::Io`](crate::Error::Io) if the file can't be read,
    /// [`Error::Config`](crate::Error::Config) if it can't be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Applies `FCREPO_BASE_URI`, `FCREPO_EAGER_LOAD_CONTENT` and
    /// `FCREPO_STREAM_CHUNK_SIZE`. Invalid values are ignored with a
    /// warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(base) = var("FCREPO_BASE_URI") {
            self.base_uri = base;
        }
        if let Some(raw) = var("FCREPO_EAGER_LOAD_CONTENT") {
            match raw.parse::<bool>() {
                Ok(v) => self.eager_load_datastream_content = v,
                Err(err) => tracing::warn!("invalid FCREPO_EAGER_LOAD_CONTENT, ignoring: {err}"),
            }
        }
        if let Some(raw) = var("FCREPO_STREAM_CHUNK_SIZE") {
            match raw.parse::<usize>() {
                Ok(v) => self.stream_chunk_size = v,
                Err(err) => tracing::warn!("invalid FCREPO_STREAM_CHUNK_SIZE, ignoring: {err}"),
            }
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.stream_chunk_size == 0 {
            self.stream_chunk_size = DEFAULT_STREAM_CHUNK_SIZE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.eager_load_datastream_content);
        assert_eq!(settings.stream_chunk_size, 8192);
    }

    #[test]
    fn fields_are_read() {
        let settings = Settings::from_toml_str(
            "eager_load_datastream_content = true\nstream_chunk_size = 4\nbase_uri = \"http://localhost/rest\"",
        )
        .unwrap();
        assert!(settings.eager_load_datastream_content);
        assert_eq!(settings.stream_chunk_size, 4);
        assert_eq!(settings.base_uri, "http://localhost/rest");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Settings::from_toml_str("eager = true").is_err());
    }

    #[test]
    fn zero_chunk_size_falls_back() {
        let settings = Settings::from_toml_str("stream_chunk_size = 0").unwrap();
        assert_eq!(settings.stream_chunk_size, DEFAULT_STREAM_CHUNK_SIZE);
    }

    #[test]
    fn env_overrides_apply_and_skip_invalid_values() {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| match key {
            "FCREPO_EAGER_LOAD_CONTENT" => Some("true".into()),
            "FCREPO_STREAM_CHUNK_SIZE" => Some("lots".into()),
            _ => None,
        });
        assert!(settings.eager_load_datastream_content);
        assert_eq!(settings.stream_chunk_size, DEFAULT_STREAM_CHUNK_SIZE);
    }
}
