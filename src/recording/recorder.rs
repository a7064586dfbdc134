//! Recorder capturing a subject pattern from a bus into a `.zet` file

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{validate_pattern, MessageBus, MessageHandler, SubscriptionId};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, RecorderConfig, WriterConfig};
use crate::storage::{encoded_len, DurableSink, MessageWriter};
use crate::{Error, Result};

/// Recorder statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Messages delivered by the bus
    pub messages_received: u64,
    /// Messages appended to the recording
    pub messages_written: u64,
    /// Messages discarded (paused, queue full or rejected by the writer)
    pub messages_dropped: u64,
    /// Record bytes appended, file header excluded
    pub bytes_written: u64,
    /// Whether the queue ever filled up
    pub buffer_overflow: bool,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    bytes: AtomicU64,
    overflow: AtomicBool,
    paused: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> RecorderStats {
        RecorderStats {
            messages_received: self.received.load(Ordering::Relaxed),
            messages_written: self.written.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            bytes_written: self.bytes.load(Ordering::Relaxed),
            buffer_overflow: self.overflow.load(Ordering::Relaxed),
        }
    }
}

/// A message between bus delivery and the file
struct Captured {
    topic: String,
    payload: Vec<u8>,
    received_ns: u64,
}

/// Bus-side half of the recorder: stamps and enqueues deliveries
struct CaptureQueue {
    tx: mpsc::Sender<Captured>,
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
}

impl CaptureQueue {
    fn offer(&self, topic: &str, payload: &[u8]) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if self.counters.paused.load(Ordering::Relaxed) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let message = Captured {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            received_ns: self.clock.now_ns(),
        };

        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.counters.overflow.swap(true, Ordering::Relaxed) {
                    warn!("Recorder queue full, dropping messages");
                }
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Captures messages matching a subject pattern into a recording
///
/// Deliveries are queued by the bus callback and written by a blocking
/// worker that flushes after every batch.
pub struct Recorder {
    bus: Arc<dyn MessageBus>,
    subject: String,
    subscription: Option<SubscriptionId>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl Recorder {
    /// Start recording as described by the `[recorder]` and `[writer]`
    /// sections
    ///
    /// # Errors
    ///
    /// Returns error if the `[recorder]` section is missing or [`Self::open`]
    /// fails
    pub fn from_config(bus: Arc<dyn MessageBus>, config: &Config) -> Result<Self> {
        let settings = config
            .recorder
            .as_ref()
            .ok_or_else(|| Error::ConfigError("missing [recorder] section".to_string()))?;
        Self::open(bus, settings, &config.writer)
    }

    /// Create the output file from config and start recording
    ///
    /// Nothing is created when the settings are invalid. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the settings are invalid, the output file cannot be
    /// created or the subscription fails
    pub fn open(
        bus: Arc<dyn MessageBus>,
        config: &RecorderConfig,
        writer_config: &WriterConfig,
    ) -> Result<Self> {
        check_settings(config)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let writer =
            MessageWriter::create_with(&config.output, writer_config.clone(), Arc::clone(&clock))?;
        Self::start(bus, config, writer, clock)
    }

    /// Start recording into an existing writer
    ///
    /// `clock` stamps each delivery's capture time. Must be called from
    /// within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the subscription
    /// fails
    pub fn start<W>(
        bus: Arc<dyn MessageBus>,
        config: &RecorderConfig,
        writer: MessageWriter<W>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self>
    where
        W: DurableSink + Send + 'static,
    {
        check_settings(config)?;

        let (tx, rx) = mpsc::channel(config.buffer_capacity);
        let counters = Arc::new(Counters::default());

        let batch_size = config.batch_size;
        let worker_counters = Arc::clone(&counters);
        let worker = tokio::task::spawn_blocking(move || {
            drain(rx, writer, batch_size, &worker_counters)
        });

        let queue = CaptureQueue {
            tx,
            counters: Arc::clone(&counters),
            clock,
        };
        let handler: MessageHandler =
            Box::new(move |topic: &str, payload: &[u8]| queue.offer(topic, payload));
        let subscription = bus.subscribe(&config.subject, handler)?;

        info!("Recording '{}'", config.subject);

        Ok(Self {
            bus,
            subject: config.subject.clone(),
            subscription: Some(subscription),
            counters,
            worker: Some(worker),
        })
    }

    /// Stop writing incoming messages; they are still counted as received
    pub fn pause(&self) {
        self.counters.paused.store(true, Ordering::Relaxed);
        info!("Recording '{}' paused", self.subject);
    }

    /// Resume writing incoming messages
    pub fn resume(&self) {
        self.counters.paused.store(false, Ordering::Relaxed);
        info!("Recording '{}' resumed", self.subject);
    }

    /// Whether the recorder is paused
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.counters.paused.load(Ordering::Relaxed)
    }

    /// Live statistics
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        self.counters.snapshot()
    }

    /// Unsubscribe, write out everything queued and close the recording
    ///
    /// # Errors
    ///
    /// Returns error if unsubscribing fails or the writer failed
    pub async fn stop(mut self) -> Result<RecorderStats> {
        if let Some(id) = self.subscription.take() {
            self.bus.unsubscribe(id)?;
        }

        if let Some(worker) = self.worker.take() {
            worker
                .await
                .map_err(|e| Error::Other(format!("Recorder worker failed: {e}")))??;
        }

        let stats = self.stats();
        info!(
            "Recording '{}' stopped: {} received, {} written, {} dropped",
            self.subject, stats.messages_received, stats.messages_written, stats.messages_dropped
        );
        Ok(stats)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            if let Err(e) = self.bus.unsubscribe(id) {
                warn!("Failed to unsubscribe recorder: {}", e);
            }
        }
    }
}

fn check_settings(config: &RecorderConfig) -> Result<()> {
    if config.buffer_capacity == 0 || config.batch_size == 0 {
        return Err(Error::ConfigError(
            "recorder buffer_capacity and batch_size must be > 0".to_string(),
        ));
    }
    validate_pattern(&config.subject)
}

/// Worker loop: write queued messages in batches until every sender is gone
fn drain<W: DurableSink>(
    mut rx: mpsc::Receiver<Captured>,
    mut writer: MessageWriter<W>,
    batch_size: usize,
    counters: &Counters,
) -> Result<()> {
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(first) = rx.blocking_recv() {
        batch.push(first);
        while batch.len() < batch_size {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        for message in batch.drain(..) {
            let written = writer.write_message(
                message.topic.as_bytes(),
                &message.payload,
                0,
                message.received_ns,
            );
            match written {
                Ok(()) => {
                    counters.written.fetch_add(1, Ordering::Relaxed);
                    counters.bytes.fetch_add(
                        encoded_len(message.topic.len(), message.payload.len()) as u64,
                        Ordering::Relaxed,
                    );
                }
                Err(Error::Validation(e)) => {
                    warn!("Dropping message on '{}': {}", message.topic, e);
                    counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        writer.flush()?;
        debug!("Flushed batch, {} records total", writer.records_written());
    }

    writer.close()
}
