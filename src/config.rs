//! Configuration types for timeskip

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::storage::{MAX_PAYLOAD_SIZE, MAX_TOPIC_LEN};
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Recording file writer settings
    #[serde(default)]
    pub writer: WriterConfig,
    /// Recording file reader settings
    #[serde(default)]
    pub reader: ReaderConfig,
    /// Bus capture settings
    #[serde(default)]
    pub recorder: Option<RecorderConfig>,
    /// Playback settings
    #[serde(default)]
    pub player: Option<PlayerConfig>,
}

/// Writer buffering and durability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Size of the in-memory write buffer in bytes
    pub buffer_size: usize,
    /// Flush automatically after this many records (0 = explicit flush only)
    pub flush_every: usize,
    /// Sync file data to the device on every flush
    pub sync_on_flush: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64 KB
            flush_every: 0,
            sync_on_flush: false,
        }
    }
}

/// Upper bounds a reader accepts for a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Longest topic accepted
    pub max_topic_len: usize,
    /// Largest payload accepted
    pub max_payload_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_topic_len: MAX_TOPIC_LEN,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Bus capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Subject pattern to capture (`*` and `>` wildcards)
    pub subject: String,
    /// Output recording path
    pub output: PathBuf,
    /// Messages queued between the bus and the file before dropping
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Messages written between flushes
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl RecorderConfig {
    /// Capture `subject` into `output` with default queue settings
    #[must_use]
    pub fn new(subject: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            subject: subject.into(),
            output: output.into(),
            buffer_capacity: default_buffer_capacity(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    crate::recording::DEFAULT_BUFFER_CAPACITY
}

fn default_batch_size() -> usize {
    crate::recording::DEFAULT_BATCH_SIZE
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Recording to play back
    pub input: PathBuf,
    /// Speed multiplier (1.0 = real time, 0 = as fast as possible)
    #[serde(default = "default_speed")]
    pub speed: f64,
}

fn default_speed() -> f64 {
    crate::replay::REAL_TIME
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.writer.buffer_size == 0 {
            return Err(Error::ConfigError(
                "writer.buffer_size must be > 0".to_string(),
            ));
        }

        if self.reader.max_topic_len > MAX_TOPIC_LEN {
            return Err(Error::ConfigError(format!(
                "reader.max_topic_len {} exceeds format limit {MAX_TOPIC_LEN}",
                self.reader.max_topic_len
            )));
        }

        if self.reader.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(Error::ConfigError(format!(
                "reader.max_payload_size {} exceeds format limit {MAX_PAYLOAD_SIZE}",
                self.reader.max_payload_size
            )));
        }

        if let Some(recorder) = &self.recorder {
            if recorder.subject.trim().is_empty() {
                return Err(Error::ConfigError(
                    "recorder.subject cannot be empty".to_string(),
                ));
            }

            if recorder.buffer_capacity == 0 {
                return Err(Error::ConfigError(
                    "recorder.buffer_capacity must be > 0".to_string(),
                ));
            }

            if recorder.batch_size == 0 {
                return Err(Error::ConfigError(
                    "recorder.batch_size must be > 0".to_string(),
                ));
            }
        }

        if let Some(player) = &self.player {
            if !player.speed.is_finite() || player.speed < 0.0 {
                return Err(Error::ConfigError(format!(
                    "player.speed must be a finite number >= 0, got {}",
                    player.speed
                )));
            }
        }

        Ok(())
    }
}
