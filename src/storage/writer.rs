//! Recording file writer

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::format::{FileHeader, HEADER_SIZE};
use super::record::{encoded_len, RecordHeader};
use crate::clock::{Clock, SystemClock};
use crate::config::WriterConfig;
use crate::{Error, Result};

/// Byte sink that can push written data to durable storage
pub trait DurableSink: Write {
    /// Make everything written so far durable
    ///
    /// # Errors
    ///
    /// Returns error if the device rejects the sync
    fn sync(&mut self) -> io::Result<()>;
}

impl DurableSink for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl DurableSink for Vec<u8> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Append-only writer for `.zet` recordings
///
/// The file header is emitted right before the first record, so the start
/// time can come from the first message. Records land in the sink in
/// exactly the order they were written.
pub struct MessageWriter<W: DurableSink = File> {
    sink: Option<BufWriter<W>>,
    header: Option<FileHeader>,
    clock: Arc<dyn Clock>,
    config: WriterConfig,
    records_written: u64,
    bytes_written: u64,
    unflushed_records: usize,
}

impl MessageWriter<File> {
    /// Create a new recording file, truncating any existing one
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with(path, WriterConfig::default(), Arc::new(SystemClock))
    }

    /// Create a new recording file with explicit settings and clock
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create_with(path: &Path, config: WriterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        debug!("Created recording: {}", path.display());

        Ok(Self::from_sink(file, config, clock))
    }
}

impl<W: DurableSink> MessageWriter<W> {
    /// Wrap an arbitrary sink
    pub fn from_sink(sink: W, config: WriterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink: Some(BufWriter::with_capacity(config.buffer_size.max(1), sink)),
            header: None,
            clock,
            config,
            records_written: 0,
            bytes_written: 0,
            unflushed_records: 0,
        }
    }

    /// Append one message
    ///
    /// A `received_ns` of 0 is replaced with the writer clock's current time.
    /// A `sent_ns` of 0 is stored as-is. Oversized topics or payloads are
    /// rejected before any byte is written.
    ///
    /// # Errors
    ///
    /// Returns error if the writer is closed, the message does not fit the
    /// format, or the sink fails
    pub fn write_message(
        &mut self,
        topic: &[u8],
        payload: &[u8],
        sent_ns: u64,
        received_ns: u64,
    ) -> Result<()> {
        if self.sink.is_none() {
            return Err(Error::Closed("writer"));
        }

        let received_ns = if received_ns == 0 {
            self.clock.now_ns()
        } else {
            received_ns
        };
        let record = RecordHeader::for_message(sent_ns, received_ns, topic, payload)?;

        if self.header.is_none() {
            let start_time_ns = if sent_ns != 0 {
                sent_ns
            } else {
                self.clock.now_ns()
            };
            self.write_file_header(start_time_ns)?;
        }

        let sink = self.sink.as_mut().ok_or(Error::Closed("writer"))?;
        sink.write_all(&record.encode())?;
        sink.write_all(topic)?;
        sink.write_all(payload)?;

        self.records_written += 1;
        self.bytes_written += encoded_len(topic.len(), payload.len()) as u64;
        self.unflushed_records += 1;

        if self.config.flush_every > 0 && self.unflushed_records >= self.config.flush_every {
            self.flush()?;
        }

        Ok(())
    }

    /// Push buffered bytes to the sink
    ///
    /// # Errors
    ///
    /// Returns error if the writer is closed or the sink fails
    pub fn flush(&mut self) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::Closed("writer"))?;
        sink.flush()?;
        if self.config.sync_on_flush {
            sink.get_mut().sync()?;
        }
        self.unflushed_records = 0;
        Ok(())
    }

    /// Flush, sync and release the sink
    ///
    /// Closing twice is a no-op. A writer closed before any message still
    /// emits the file header so the result opens as an empty recording.
    ///
    /// # Errors
    ///
    /// Returns error if the final flush fails; the sink is released anyway
    pub fn close(&mut self) -> Result<()> {
        self.finish().map(drop)
    }

    /// Close the writer and hand back the underlying sink
    ///
    /// # Errors
    ///
    /// Returns error if the writer was already closed or the final flush fails
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?.ok_or(Error::Closed("writer"))
    }

    /// Start time stored in the header, once it has been written
    #[must_use]
    pub fn start_time_ns(&self) -> Option<u64> {
        self.header.map(|header| header.start_time_ns)
    }

    /// Number of records written
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Logical file length, header included
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the writer has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }

    fn write_file_header(&mut self, start_time_ns: u64) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::Closed("writer"))?;
        let header = FileHeader::new(start_time_ns);
        sink.write_all(&header.encode())?;

        self.header = Some(header);
        self.bytes_written += HEADER_SIZE as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<Option<W>> {
        if self.sink.is_none() {
            return Ok(None);
        }

        if self.header.is_none() {
            let start_time_ns = self.clock.now_ns();
            if let Err(e) = self.write_file_header(start_time_ns) {
                self.sink = None;
                return Err(e);
            }
        }

        let Some(sink) = self.sink.take() else {
            return Ok(None);
        };
        let mut inner = sink.into_inner().map_err(io::IntoInnerError::into_error)?;
        inner.sync()?;

        debug!(
            "Closed recording: {} records, {} bytes",
            self.records_written, self.bytes_written
        );

        Ok(Some(inner))
    }
}

impl<W: DurableSink> Drop for MessageWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close recording writer: {}", e);
        }
    }
}
