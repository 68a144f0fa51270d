//! Codec configuration via `callpath.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields the
//! same behavior as [`CodecConfig::default`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use callpath_format::RootConvention;

/// Config file name conventionally placed next to the profile output.
pub const CONFIG_FILE_NAME: &str = "callpath.toml";

/// Default ceiling on the node count a tree header may declare.
pub const DEFAULT_MAX_NODES: u64 = 1 << 28;

/// Default ceiling on a variable-length record's length.
pub const DEFAULT_MAX_RECORD_LEN: u32 = 1 << 20;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("config file '{}': {source}", .path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Reader and writer settings.
///
/// # Example
///
/// ```toml
/// format_version = "01.01"
/// max_nodes = 268435456
/// max_record_len = 1048576
/// sync_on_save = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Tree format version written: `"01.01"` or `"01.00"`.
    #[serde(default = "default_format_version")]
    pub format_version: String,
    /// Largest node count a tree header may declare.
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u64,
    /// Largest string or number-array record accepted.
    #[serde(default = "default_max_record_len")]
    pub max_record_len: u32,
    /// fsync files and their directory when saving.
    #[serde(default = "default_sync_on_save")]
    pub sync_on_save: bool,
}

fn default_format_version() -> String {
    RootConvention::default().to_string()
}

fn default_max_nodes() -> u64 {
    DEFAULT_MAX_NODES
}

fn default_max_record_len() -> u32 {
    DEFAULT_MAX_RECORD_LEN
}

fn default_sync_on_save() -> bool {
    true
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            format_version: default_format_version(),
            max_nodes: default_max_nodes(),
            max_record_len: default_max_record_len(),
            sync_on_save: default_sync_on_save(),
        }
    }
}

impl CodecConfig {
    /// Small limits and no fsync.
    pub fn for_testing() -> Self {
        CodecConfig {
            max_nodes: 1 << 16,
            max_record_len: 4096,
            sync_on_save: false,
            ..Default::default()
        }
    }

    /// Write trees in `convention`.
    pub fn with_root_convention(mut self, convention: RootConvention) -> Self {
        self.format_version = convention.to_string();
        self
    }

    /// Set the node limit.
    pub fn with_max_nodes(mut self, max_nodes: u64) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Set the record length limit.
    pub fn with_max_record_len(mut self, max_record_len: u32) -> Self {
        self.max_record_len = max_record_len;
        self
    }

    /// Enable or disable fsync on save.
    pub fn with_sync_on_save(mut self, sync: bool) -> Self {
        self.sync_on_save = sync;
        self
    }

    /// Root convention named by `format_version`.
    pub fn root_convention(&self) -> ConfigResult<RootConvention> {
        RootConvention::from_version(self.format_version.as_bytes()).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown format_version '{}', expected \"01.01\" or \"01.00\"",
                self.format_version
            ))
        })
    }

    /// Check every field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.root_convention()?;
        if self.max_nodes == 0 {
            return Err(ConfigError::Invalid("max_nodes must be > 0".into()));
        }
        if self.max_record_len == 0 {
            return Err(ConfigError::Invalid("max_record_len must be > 0".into()));
        }
        Ok(())
    }

    /// Default file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Call-path codec configuration
#
# Tree format version to write: "01.01" (default) or "01.00"
#   "01.01" = ids start at 1, root parent is 0
#   "01.00" = ids start at 0, root is its own parent
format_version = "01.01"

# Largest node count a tree header may declare before it is rejected
max_nodes = 268435456

# Largest string or number-array record accepted, in elements
max_record_len = 1048576

# fsync saved files and their directory
sync_on_save = true
"#
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: CodecConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file unless one already exists.
    pub fn write_default_if_missing(path: &Path) -> ConfigResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize to TOML and write to `path`.
    pub fn write_to_file(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_sentinel_base() {
        let config = CodecConfig::default();
        assert_eq!(config.format_version, "01.01");
        assert_eq!(
            config.root_convention().unwrap(),
            RootConvention::SentinelBase
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_self_loop() {
        let config = CodecConfig::from_toml_str("format_version = \"01.00\"").unwrap();
        assert_eq!(config.root_convention().unwrap(), RootConvention::SelfLoop);
        assert_eq!(config.max_nodes, DEFAULT_MAX_NODES);
    }

    #[test]
    fn parse_invalid_version_returns_error() {
        let err = CodecConfig::from_toml_str("format_version = \"02.00\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parse_zero_limit_returns_error() {
        let err = CodecConfig::from_toml_str("max_nodes = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn parse_wrong_type_returns_error() {
        let err = CodecConfig::from_toml_str("sync_on_save = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn default_toml_matches_default() {
        let config = CodecConfig::from_toml_str(CodecConfig::default_toml()).unwrap();
        assert_eq!(config, CodecConfig::default());
    }

    #[test]
    fn builder_setters() {
        let config = CodecConfig::default()
            .with_root_convention(RootConvention::SelfLoop)
            .with_max_nodes(10)
            .with_max_record_len(32)
            .with_sync_on_save(false);
        assert_eq!(config.format_version, "01.00");
        assert_eq!(config.max_nodes, 10);
        assert_eq!(config.max_record_len, 32);
        assert!(!config.sync_on_save);
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        CodecConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(CodecConfig::from_file(&path).unwrap(), CodecConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "max_nodes = 5\n").unwrap();

        CodecConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(CodecConfig::from_file(&path).unwrap().max_nodes, 5);
    }

    #[test]
    fn write_to_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = CodecConfig::for_testing();
        config.write_to_file(&path).unwrap();
        assert_eq!(CodecConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = CodecConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
