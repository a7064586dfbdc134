//! Content digests for comparing recordings
//!
//! Two recordings have the same digest when they hold the same messages in
//! the same order: same topics, payloads and send timestamps. Capture
//! timestamps are left out so a recording of a replay matches its source,
//! and topics are hashed without a trailing NUL terminator for the same
//! reason.

use std::fmt;
use std::path::Path;

use sha2::{Digest as _, Sha256};

use crate::storage::{MessageReader, MessageRecord};
use crate::Result;

/// SHA-256 digest of a recording's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Lowercase hex form
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes in hex, for log lines
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental digest over a sequence of records
#[derive(Clone, Default)]
pub struct RecordingDigest {
    hasher: Sha256,
    records: u64,
}

impl fmt::Debug for RecordingDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingDigest")
            .field("records", &self.records)
            .finish_non_exhaustive()
    }
}

impl RecordingDigest {
    /// Create an empty digest
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next record
    ///
    /// Every variable-length field is length-prefixed so topic/payload
    /// boundaries cannot be shifted without changing the digest.
    pub fn update(&mut self, record: &MessageRecord) {
        self.hasher.update(record.sent_ns.to_le_bytes());
        let topic = record.topic_name();
        self.hasher.update((topic.len() as u64).to_le_bytes());
        self.hasher.update(topic);
        self.hasher.update((record.payload.len() as u64).to_le_bytes());
        self.hasher.update(&record.payload);
        self.records += 1;
    }

    /// Number of records added
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Finish and return the digest
    #[must_use]
    pub fn finalize(self) -> Digest {
        let mut hasher = self.hasher;
        hasher.update(self.records.to_le_bytes());
        Digest(hasher.finalize().into())
    }
}

/// Digest every record of a recording file
///
/// # Errors
///
/// Returns error if the file cannot be opened or any record fails to decode
pub fn digest_file(path: &Path) -> Result<Digest> {
    let mut reader = MessageReader::open(path)?;
    let mut digest = RecordingDigest::new();

    for record in reader.read_all_messages() {
        digest.update(&record?);
    }

    Ok(digest.finalize())
}
