//! Capture configuration.
//!
//! Loaded from a JSON file:
//!
//! ```json
//! {
//!   "project_id": "shop",
//!   "build_id": "2024.05.1",
//!   "public_key": "pk_...",
//!   "capture_limit": "512kb",
//!   "capture_ignores": [{"contains": "ResizeObserver"}, {"regex": "^Script error"}]
//! }
//! ```

use rewind_core::CoreError;
use rewind_crypto::{CryptoError, PrivateKey, PublicKey};
use rewind_policy::{IgnoreError, IgnorePattern, IgnoreSet};
use rewind_storage::Budget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default local capture cache
pub const DEFAULT_CACHE_DIR: &str = ".rewind/captures";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// File is not valid configuration
    #[error("invalid config: {reason}")]
    Parse {
        /// Parser message
        reason: String,
    },
    /// A required setting is absent
    #[error("missing config field {field}")]
    Missing {
        /// Setting name
        field: &'static str,
    },
    /// An ignore pattern does not compile
    #[error(transparent)]
    Ignore(#[from] IgnoreError),
    /// Key material does not parse
    #[error(transparent)]
    Key(#[from] CryptoError),
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing { field } => CoreError::Configuration {
                field: field.to_string(),
                reason: "missing".to_string(),
            },
            ConfigError::Ignore(e) => e.into(),
            ConfigError::Key(e) => e.into(),
            other => CoreError::Configuration {
                field: "config".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

fn default_build_id() -> String {
    "dev".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

/// REWIND configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindConfig {
    /// Project id stamped on every capture
    pub project_id: String,
    /// Build id stamped on every capture
    #[serde(default = "default_build_id")]
    pub build_id: String,
    /// `pk_…` key captures are encrypted with
    #[serde(default)]
    pub public_key: Option<String>,
    /// `sk_…` key used for replay
    #[serde(default)]
    pub private_key: Option<String>,
    /// Budget string such as `"3 files"` or `"512kb"`
    #[serde(default)]
    pub capture_limit: Option<String>,
    /// Rules that suppress captures by name
    #[serde(default)]
    pub capture_ignores: Vec<IgnorePattern>,
    /// Local capture cache directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl RewindConfig {
    /// Minimal configuration for a project
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            build_id: default_build_id(),
            public_key: None,
            private_key: None,
            capture_limit: None,
            capture_ignores: Vec::new(),
            cache_dir: default_cache_dir(),
        }
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), project = %config.project_id, "loaded config");
        Ok(config)
    }

    /// Parse JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid configuration
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Set the capture limit
    #[must_use]
    pub fn with_capture_limit(mut self, limit: impl Into<String>) -> Self {
        self.capture_limit = Some(limit.into());
        self
    }

    /// Set the public key
    #[must_use]
    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Add an ignore pattern
    #[must_use]
    pub fn with_ignore(mut self, pattern: IgnorePattern) -> Self {
        self.capture_ignores.push(pattern);
        self
    }

    /// Effective budget; an unusable limit is logged and means no limit
    #[must_use]
    pub fn budget(&self) -> Option<Budget> {
        Budget::from_config(self.capture_limit.as_deref())
    }

    /// Compiled ignore rules
    ///
    /// # Errors
    ///
    /// Returns error if a pattern does not compile
    pub fn ignore_set(&self) -> Result<IgnoreSet, ConfigError> {
        Ok(IgnoreSet::from_patterns(&self.capture_ignores)?)
    }

    /// Parsed public key
    ///
    /// # Errors
    ///
    /// Returns error if the key is absent or does not parse
    pub fn public_key(&self) -> Result<PublicKey, ConfigError> {
        let text = self
            .public_key
            .as_deref()
            .ok_or(ConfigError::Missing { field: "public_key" })?;
        Ok(PublicKey::parse(text)?)
    }

    /// Parsed private key
    ///
    /// # Errors
    ///
    /// Returns error if the key is absent or does not parse
    pub fn private_key(&self) -> Result<PrivateKey, ConfigError> {
        let text = self
            .private_key
            .as_deref()
            .ok_or(ConfigError::Missing { field: "private_key" })?;
        Ok(PrivateKey::parse(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RewindConfig::from_json(r#"{"project_id":"shop"}"#).unwrap();
        assert_eq!(config, RewindConfig::new("shop"));
        assert_eq!(config.cache_dir, PathBuf::from(".rewind/captures"));
        assert_eq!(config.budget(), None);
        assert!(config.ignore_set().unwrap().is_empty());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rewind.json");
        std::fs::write(
            &path,
            r#"{
                "project_id": "shop",
                "build_id": "42",
                "capture_limit": "2 files",
                "capture_ignores": [{"contains": "ResizeObserver"}, {"regex": "^Script error"}]
            }"#,
        )
        .unwrap();

        let config = RewindConfig::load(&path).unwrap();
        assert_eq!(config.build_id, "42");
        assert_eq!(config.budget(), Some(Budget::Files(2)));
        let ignores = config.ignore_set().unwrap();
        assert!(ignores.is_ignored("ResizeObserver loop"));
        assert!(ignores.is_ignored("Script error."));
    }

    #[test]
    fn test_bad_limit_means_unlimited() {
        let config = RewindConfig::new("shop").with_capture_limit("a lot");
        assert_eq!(config.budget(), None);
    }

    #[test]
    fn test_missing_key() {
        let config = RewindConfig::new("shop");
        assert!(matches!(
            config.public_key(),
            Err(ConfigError::Missing { field: "public_key" })
        ));
        let config = config.with_public_key("sk_wrong");
        assert!(matches!(config.public_key(), Err(ConfigError::Key(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RewindConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            RewindConfig::from_json("{"),
            Err(ConfigError::Parse { .. })
        ));
    }
}
