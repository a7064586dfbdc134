//! On-disk layout of `.zet` recordings
//!
//! All integers are little-endian and nothing is padded:
//!
//! ```text
//! FileHeader (32 bytes, offset 0)
//!   magic          [u8; 4]   b"ZET\0"
//!   version        u32
//!   start_time_ns  u64
//!   reserved       [u8; 16]  zero
//!
//! MessageRecord (repeated until end of file)
//!   sent_ns        u64
//!   received_ns    u64
//!   topic_len      u16
//!   payload_size   u32
//!   topic          topic_len bytes
//!   payload        payload_size bytes
//! ```
//!
//! Topics are written without a terminator. Older writers of the same magic
//! and version stored a trailing NUL and counted it in `topic_len`; readers
//! keep the bytes as stored, and [`MessageRecord::topic_name`] drops one
//! trailing NUL wherever the topic is used as a subject.
//!
//! [`MessageRecord::topic_name`]: super::MessageRecord::topic_name

use bytemuck::{bytes_of, pod_read_unaligned, Pod, Zeroable};

use crate::error::FormatError;

/// File magic bytes: "ZET\0"
pub const FILE_MAGIC: [u8; 4] = [0x5A, 0x45, 0x54, 0x00];

/// Highest format version this build reads and the version it writes
pub const FORMAT_VERSION: u32 = 1;

/// File header size
pub const HEADER_SIZE: usize = 32;

/// Size of the fixed part of a record (timestamps and lengths)
pub const RECORD_HEADER_SIZE: usize = 22;

/// Longest topic the 16-bit length field can describe
pub const MAX_TOPIC_LEN: usize = u16::MAX as usize;

/// Largest payload the 32-bit size field can describe
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// Header bytes exactly as stored, fields little-endian
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RawFileHeader {
    magic: [u8; 4],
    version: u32,
    start_time_ns: u64,
    reserved: [u8; 16],
}

static_assertions::const_assert_eq!(std::mem::size_of::<RawFileHeader>(), HEADER_SIZE);

/// Decoded file header
///
/// The reserved block is not surfaced: writers zero it and readers ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version the file was written with
    pub version: u32,
    /// Recording reference start time (nanoseconds)
    pub start_time_ns: u64,
}

impl FileHeader {
    /// Header for a new recording at the current format version
    #[must_use]
    pub fn new(start_time_ns: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            start_time_ns,
        }
    }

    /// Encode this header
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        encode_header(self.version, self.start_time_ns)
    }
}

/// Encode a file header block
#[must_use]
pub fn encode_header(version: u32, start_time_ns: u64) -> [u8; HEADER_SIZE] {
    let raw = RawFileHeader {
        magic: FILE_MAGIC,
        version: version.to_le(),
        start_time_ns: start_time_ns.to_le(),
        reserved: [0; 16],
    };

    let mut block = [0u8; HEADER_SIZE];
    block.copy_from_slice(bytes_of(&raw));
    block
}

/// Decode and validate a file header block
///
/// # Errors
///
/// Returns [`FormatError::BadMagic`] if the sentinel does not match and
/// [`FormatError::UnsupportedVersion`] for versions this build cannot read
pub fn decode_header(block: &[u8; HEADER_SIZE]) -> Result<FileHeader, FormatError> {
    let raw: RawFileHeader = pod_read_unaligned(block);

    if raw.magic != FILE_MAGIC {
        return Err(FormatError::BadMagic {
            expected: FILE_MAGIC,
            found: raw.magic,
        });
    }

    let version = u32::from_le(raw.version);
    if version == 0 || version > FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    Ok(FileHeader {
        version,
        start_time_ns: u64::from_le(raw.start_time_ns),
    })
}
