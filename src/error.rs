//! Error types for timeskip

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for timeskip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while writing, reading, recording or replaying
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying storage
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Recording file does not exist
    #[error("Recording file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Bytes on disk are not a valid recording
    #[error("Invalid recording format: {0}")]
    Format(#[from] FormatError),

    /// Caller-supplied data does not fit the format's field widths
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// Writer or reader was already closed
    #[error("{0} is closed")]
    Closed(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Message bus error
    #[error("Bus error: {0}")]
    Bus(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the recording was cut off mid-structure
    #[must_use]
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::Format(FormatError::Truncated { .. }))
    }
}

/// Which structure was cut short by a truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// The fixed-size file header
    FileHeader,
    /// The fixed-size part of a record
    RecordHeader,
    /// Topic or payload bytes of a record
    RecordBody,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::FileHeader => "file header",
            Self::RecordHeader => "record header",
            Self::RecordBody => "record body",
        };
        f.write_str(name)
    }
}

/// Structural problems with recorded bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// File does not start with the format sentinel
    #[error("bad magic bytes: expected {expected:?}, got {found:?}")]
    BadMagic {
        /// Expected sentinel
        expected: [u8; 4],
        /// Bytes found at offset 0
        found: [u8; 4],
    },

    /// File was written by an incompatible format version
    #[error("unsupported version {found}, this build reads up to {supported}")]
    UnsupportedVersion {
        /// Version stored in the header
        found: u32,
        /// Highest version this build understands
        supported: u32,
    },

    /// Data ends in the middle of a structure
    #[error("truncated {section} at offset {offset}")]
    Truncated {
        /// Offset of the structure that was cut short
        offset: u64,
        /// Which structure was cut short
        section: Section,
    },

    /// Record header declares sizes above the reader's limits
    #[error("record at offset {offset} too large: topic {topic_len} bytes, payload {payload_size} bytes")]
    RecordTooLarge {
        /// Offset of the record header
        offset: u64,
        /// Declared topic length
        topic_len: u16,
        /// Declared payload size
        payload_size: u32,
    },
}

/// Caller-supplied message data rejected before anything is written
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Topic does not fit the 16-bit length field
    #[error("topic too long: {len} bytes exceeds limit of {max} bytes")]
    TopicTooLong {
        /// Actual topic length
        len: usize,
        /// Maximum topic length
        max: usize,
    },

    /// Payload does not fit the 32-bit size field
    #[error("payload too large: {len} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge {
        /// Actual payload length
        len: usize,
        /// Maximum payload length
        max: usize,
    },
}
