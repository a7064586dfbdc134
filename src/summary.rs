//! Whole-file statistics for a recording

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::config::ReaderConfig;
use crate::digest::{Digest, RecordingDigest};
use crate::storage::{FileHeader, MessageReader, MessageRecord};
use crate::{Error, FormatError, Result};

/// Totals gathered by scanning a recording
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// Decoded file header
    pub header: FileHeader,
    /// Number of records
    pub records: u64,
    /// Sum of payload sizes
    pub payload_bytes: u64,
    /// Records per topic
    pub topics: BTreeMap<String, u64>,
    /// Earliest capture time seen
    pub first_received_ns: Option<u64>,
    /// Latest capture time seen
    pub last_received_ns: Option<u64>,
    /// Content digest of the complete records
    pub digest: Digest,
    /// Where the data was cut off, if it ends mid-record
    pub truncation: Option<FormatError>,
}

impl RecordingSummary {
    /// Scan `path` from start to end
    ///
    /// A truncated tail does not fail the scan: the complete records are
    /// summarized and the cut is reported in [`Self::truncation`].
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or a record is malformed
    pub fn scan(path: &Path) -> Result<Self> {
        Self::scan_with(path, ReaderConfig::default())
    }

    /// Scan `path`, rejecting records above `limits`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or a record is malformed
    pub fn scan_with(path: &Path, limits: ReaderConfig) -> Result<Self> {
        let mut reader = MessageReader::open_with(path, limits)?;
        let header = *reader.header();
        let mut builder = SummaryBuilder::default();

        for record in reader.read_all_messages() {
            match record {
                Ok(record) => builder.observe(&record),
                Err(Error::Format(cut @ FormatError::Truncated { .. })) => {
                    warn!("{} ends in a truncated record: {}", path.display(), cut);
                    builder.truncation = Some(cut);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(builder.finish(header))
    }

    /// Span between the first and last capture times
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.first_received_ns, self.last_received_ns) {
            (Some(first), Some(last)) => Duration::from_nanos(last.saturating_sub(first)),
            _ => Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct SummaryBuilder {
    records: u64,
    payload_bytes: u64,
    topics: BTreeMap<String, u64>,
    first_received_ns: Option<u64>,
    last_received_ns: Option<u64>,
    digest: RecordingDigest,
    truncation: Option<FormatError>,
}

impl SummaryBuilder {
    fn observe(&mut self, record: &MessageRecord) {
        self.records += 1;
        self.payload_bytes += record.payload.len() as u64;
        *self.topics.entry(record.topic_lossy().into_owned()).or_insert(0) += 1;

        let received = record.received_ns;
        self.first_received_ns = Some(self.first_received_ns.map_or(received, |t| t.min(received)));
        self.last_received_ns = Some(self.last_received_ns.map_or(received, |t| t.max(received)));

        self.digest.update(record);
    }

    fn finish(self, header: FileHeader) -> RecordingSummary {
        RecordingSummary {
            header,
            records: self.records,
            payload_bytes: self.payload_bytes,
            topics: self.topics,
            first_received_ns: self.first_received_ns,
            last_received_ns: self.last_received_ns,
            digest: self.digest.finalize(),
            truncation: self.truncation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::WriterConfig;
    use crate::digest::digest_file;
    use crate::error::Section;
    use crate::storage::MessageWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_scan() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("summary.zet");

        let clock = Arc::new(ManualClock::new(500));
        let mut writer =
            MessageWriter::create_with(&path, WriterConfig::default(), clock).unwrap();
        writer.write_message(b"a.x", b"12345", 0, 1_000).unwrap();
        writer.write_message(b"b.y", b"", 0, 3_000_000_000).unwrap();
        writer.write_message(b"a.x", b"678", 0, 2_000).unwrap();
        writer.close().unwrap();

        let summary = RecordingSummary::scan(&path).unwrap();
        assert_eq!(summary.header.start_time_ns, 500);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.payload_bytes, 8);
        assert_eq!(summary.topics.get("a.x"), Some(&2));
        assert_eq!(summary.topics.get("b.y"), Some(&1));
        assert_eq!(summary.duration(), Duration::from_nanos(3_000_000_000 - 1_000));
        assert_eq!(summary.digest, digest_file(&path).unwrap());
    }

    #[test]
    fn test_scan_empty_recording() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.zet");
        MessageWriter::create(&path).unwrap().close().unwrap();

        let summary = RecordingSummary::scan(&path).unwrap();
        assert_eq!(summary.records, 0);
        assert!(summary.topics.is_empty());
        assert_eq!(summary.duration(), Duration::ZERO);
        assert!(summary.truncation.is_none());
    }

    #[test]
    fn test_scan_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cut.zet");

        let mut writer = MessageWriter::create(&path).unwrap();
        writer.write_message(b"a", b"kept", 1, 2).unwrap();
        writer.write_message(b"a", b"payload", 3, 4).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let summary = RecordingSummary::scan(&path).unwrap();
        assert_eq!(summary.records, 1);
        assert!(matches!(
            summary.truncation,
            Some(FormatError::Truncated {
                section: Section::RecordBody,
                ..
            })
        ));
    }
}
