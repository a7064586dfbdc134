//! Player publishing recorded messages with their original spacing

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::AS_FAST_AS_POSSIBLE;
use crate::bus::MessageBus;
use crate::config::{Config, ReaderConfig};
use crate::digest::RecordingDigest;
use crate::storage::{MessageReader, MessageRecord};
use crate::{Error, Result};

/// Playback statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Messages published
    pub messages_published: u64,
    /// Wall time spent playing
    pub elapsed: Duration,
}

/// A recording loaded into memory, ready to be replayed
#[derive(Debug, Clone)]
pub struct Player {
    records: Vec<MessageRecord>,
    start_time_ns: u64,
}

impl Player {
    /// Load every message of a recording
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, malformed or truncated
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, ReaderConfig::default())
    }

    /// Load a recording, rejecting records above `limits`
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing, malformed or truncated
    pub fn load_with(path: &Path, limits: ReaderConfig) -> Result<Self> {
        let mut reader = MessageReader::open_with(path, limits)?;
        let start_time_ns = reader.start_time_ns();
        let records = reader.read_all_messages().collect::<Result<Vec<_>>>()?;

        let mut digest = RecordingDigest::new();
        for record in &records {
            digest.update(record);
        }
        info!(
            "Loaded {} messages from {} (digest {})",
            records.len(),
            path.display(),
            digest.finalize().short()
        );
        Ok(Self {
            records,
            start_time_ns,
        })
    }

    /// Build a player from records already in memory
    #[must_use]
    pub fn from_records(start_time_ns: u64, records: Vec<MessageRecord>) -> Self {
        Self {
            records,
            start_time_ns,
        }
    }

    /// Recording start time from the file header
    #[must_use]
    pub fn start_time_ns(&self) -> u64 {
        self.start_time_ns
    }

    /// Loaded records in file order
    #[must_use]
    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    /// Number of loaded records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the recording holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Span between the first and last capture times
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => {
                Duration::from_nanos(last.received_ns.saturating_sub(first.received_ns))
            }
            _ => Duration::ZERO,
        }
    }

    /// Load the `[player]` input under the `[reader]` limits and play it at
    /// the configured speed
    ///
    /// # Errors
    ///
    /// Returns error if the `[player]` section is missing, or loading or
    /// publishing fails
    pub async fn run(bus: &dyn MessageBus, config: &Config) -> Result<PlaybackStats> {
        let settings = config
            .player
            .as_ref()
            .ok_or_else(|| Error::ConfigError("missing [player] section".to_string()))?;

        let player = Self::load_with(&settings.input, config.reader.clone())?;
        player.play(bus, settings.speed).await
    }

    /// Publish every record in order
    ///
    /// Each record is published once `(received_ns - first received_ns) / speed`
    /// has elapsed since playback started. A speed of 0 publishes back to back.
    ///
    /// # Errors
    ///
    /// Returns error if the speed is negative or not finite, a topic is not
    /// valid UTF-8, or the bus rejects a message
    pub async fn play(&self, bus: &dyn MessageBus, speed: f64) -> Result<PlaybackStats> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(Error::ConfigError(format!(
                "playback speed must be finite and >= 0, got {speed}"
            )));
        }

        let started = Instant::now();
        let first_ns = self.records.first().map_or(0, |record| record.received_ns);
        let mut published = 0u64;

        for record in &self.records {
            if let Some(offset) = schedule_offset(record.received_ns, first_ns, speed) {
                let deadline = started.checked_add(offset).ok_or_else(|| {
                    Error::Other(format!("playback offset {offset:?} out of range"))
                })?;
                tokio::time::sleep_until(deadline).await;
            }

            let topic = std::str::from_utf8(record.topic_name()).map_err(|_| {
                Error::Bus(format!(
                    "recorded topic '{}' is not valid UTF-8",
                    record.topic_lossy()
                ))
            })?;
            bus.publish(topic, &record.payload)?;
            published += 1;
        }

        let elapsed = started.elapsed();
        debug!("Published {} messages in {:?}", published, elapsed);
        Ok(PlaybackStats {
            messages_published: published,
            elapsed,
        })
    }
}

/// Delay from playback start at which a record captured at `record_ns` is due
///
/// Returns `None` when `speed` is not positive, meaning no delay at all.
/// Records captured before the first one are due immediately.
#[must_use]
pub fn schedule_offset(record_ns: u64, first_ns: u64, speed: f64) -> Option<Duration> {
    if speed.is_nan() || speed <= AS_FAST_AS_POSSIBLE {
        return None;
    }

    let delta_secs = record_ns.saturating_sub(first_ns) as f64 / 1e9;
    Some(Duration::try_from_secs_f64(delta_secs / speed).unwrap_or(Duration::MAX))
}
