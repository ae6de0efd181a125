//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! usable configuration:
//!
//! ```toml
//! [process]
//! id = 8
//!
//! [thread]
//! stack_size = 1048576
//!
//! [queue]
//! max_posted_messages = 8192
//! default_send_timeout_ms = 5000
//!
//! [marshal]
//! ansi_code_page = "windows-1252"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use encoding_rs::Encoding;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Process id reported by every thread of this context.
    pub id: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self { id: 8 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThreadConfig {
    /// Stack size in bytes for threads started with `System::spawn_thread`.
    pub stack_size: usize,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            stack_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Soft limit on posted messages per queue. Posting beyond it fails.
    pub max_posted_messages: usize,
    /// Timeout applied by `send_message`. Absent means wait forever.
    pub default_send_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_posted_messages: 8192,
            default_send_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MarshalConfig {
    /// WHATWG encoding label of the ANSI code page.
    pub ansi_code_page: String,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        Self {
            ansi_code_page: "windows-1252".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub process: ProcessConfig,
    pub thread: ThreadConfig,
    pub queue: QueueConfig,
    pub marshal: MarshalConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("config: loaded {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_posted_messages == 0 {
            return Err(ConfigError::Invalid(
                "queue.max_posted_messages must be greater than zero".into(),
            ));
        }
        if self.thread.stack_size == 0 {
            return Err(ConfigError::Invalid(
                "thread.stack_size must be greater than zero".into(),
            ));
        }
        self.code_page()?;
        Ok(())
    }

    /// Resolves `marshal.ansi_code_page` to an encoding.
    pub fn code_page(&self) -> Result<&'static Encoding, ConfigError> {
        Encoding::for_label(self.marshal.ansi_code_page.as_bytes()).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "unknown code page label {:?}",
                self.marshal.ansi_code_page
            ))
        })
    }

    pub fn default_send_timeout(&self) -> Option<Duration> {
        self.queue.default_send_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_send_timeout(), None);
        assert_eq!(config.code_page().unwrap(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            "[queue]\nmax_posted_messages = 16\ndefault_send_timeout_ms = 250\n",
        )
        .unwrap();
        assert_eq!(config.queue.max_posted_messages, 16);
        assert_eq!(config.default_send_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.thread, ThreadConfig::default());
    }

    #[test]
    fn zero_queue_limit_is_rejected() {
        let err = Config::from_toml_str("[queue]\nmax_posted_messages = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_code_page_is_rejected() {
        let err =
            Config::from_toml_str("[marshal]\nansi_code_page = \"klingon\"\n").unwrap_err();
        assert!(err.to_string().contains("klingon"));
    }

    #[test]
    fn malformed_toml_reports_parse_error() {
        let err = Config::from_toml_str("[queue\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userqueue.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[process]\nid = 42\n[marshal]\nansi_code_page = \"windows-1251\"").unwrap();
        drop(file);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.process.id, 42);
        assert_eq!(config.code_page().unwrap(), encoding_rs::WINDOWS_1251);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
