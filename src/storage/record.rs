//! Message record codec

use std::borrow::Cow;
use std::io::{self, ErrorKind, Read};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::format::{MAX_PAYLOAD_SIZE, MAX_TOPIC_LEN, RECORD_HEADER_SIZE};
use crate::config::ReaderConfig;
use crate::error::{FormatError, Section, ValidationError};
use crate::Error;

/// Upper bound on the buffer reserved up front for a record body
const PREALLOC_LIMIT: usize = 16 * 1024 * 1024;

/// One decoded message
///
/// Owns its topic and payload; nothing borrows from the reader that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// When the producer sent the message (0 = unknown)
    pub sent_ns: u64,
    /// When the recorder captured the message
    pub received_ns: u64,
    /// Topic bytes, UTF-8 by convention
    pub topic: Vec<u8>,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl MessageRecord {
    /// Create a record from borrowed parts
    #[must_use]
    pub fn new(sent_ns: u64, received_ns: u64, topic: &[u8], payload: &[u8]) -> Self {
        Self {
            sent_ns,
            received_ns,
            topic: topic.to_vec(),
            payload: payload.to_vec(),
        }
    }

    /// Topic without the single trailing NUL that NUL-terminating writers
    /// store as part of `topic_len`
    #[must_use]
    pub fn topic_name(&self) -> &[u8] {
        self.topic
            .strip_suffix(&[0u8])
            .unwrap_or(self.topic.as_slice())
    }

    /// Topic name as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn topic_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.topic_name())
    }

    /// Size of this record on disk
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        encoded_len(self.topic.len(), self.payload.len())
    }
}

/// Fixed-size part of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Send timestamp
    pub sent_ns: u64,
    /// Capture timestamp
    pub received_ns: u64,
    /// Topic length in bytes
    pub topic_len: u16,
    /// Payload length in bytes
    pub payload_size: u32,
}

impl RecordHeader {
    /// Build the header for a message, checking field widths
    ///
    /// # Errors
    ///
    /// Returns error if the topic or payload does not fit its length field
    pub fn for_message(
        sent_ns: u64,
        received_ns: u64,
        topic: &[u8],
        payload: &[u8],
    ) -> Result<Self, ValidationError> {
        let topic_len = u16::try_from(topic.len()).map_err(|_| ValidationError::TopicTooLong {
            len: topic.len(),
            max: MAX_TOPIC_LEN,
        })?;
        let payload_size =
            u32::try_from(payload.len()).map_err(|_| ValidationError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            })?;

        Ok(Self {
            sent_ns,
            received_ns,
            topic_len,
            payload_size,
        })
    }

    /// Number of topic and payload bytes following this header
    #[must_use]
    pub fn body_len(&self) -> u64 {
        u64::from(self.topic_len) + u64::from(self.payload_size)
    }

    /// Reject declared sizes above `limits`
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::RecordTooLarge`] naming the record at `offset`
    pub fn check_limits(&self, offset: u64, limits: &ReaderConfig) -> Result<(), FormatError> {
        if usize::from(self.topic_len) > limits.max_topic_len
            || self.payload_size as usize > limits.max_payload_size
        {
            return Err(FormatError::RecordTooLarge {
                offset,
                topic_len: self.topic_len,
                payload_size: self.payload_size,
            });
        }
        Ok(())
    }

    /// Encode the fixed-size part
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut block = [0u8; RECORD_HEADER_SIZE];
        let mut out = &mut block[..];
        out.put_u64_le(self.sent_ns);
        out.put_u64_le(self.received_ns);
        out.put_u16_le(self.topic_len);
        out.put_u32_le(self.payload_size);
        block
    }

    /// Decode the fixed-size part
    #[must_use]
    pub fn decode(block: &[u8; RECORD_HEADER_SIZE]) -> Self {
        let mut buf = &block[..];
        Self {
            sent_ns: buf.get_u64_le(),
            received_ns: buf.get_u64_le(),
            topic_len: buf.get_u16_le(),
            payload_size: buf.get_u32_le(),
        }
    }
}

/// Bytes a record with the given topic and payload lengths occupies
#[must_use]
pub fn encoded_len(topic_len: usize, payload_len: usize) -> usize {
    RECORD_HEADER_SIZE + topic_len + payload_len
}

/// Encode one complete record
///
/// # Errors
///
/// Returns error if the topic exceeds 65535 bytes or the payload exceeds
/// `u32::MAX` bytes
pub fn encode_record(
    sent_ns: u64,
    received_ns: u64,
    topic: &[u8],
    payload: &[u8],
) -> Result<Bytes, ValidationError> {
    let header = RecordHeader::for_message(sent_ns, received_ns, topic, payload)?;

    let mut buf = BytesMut::with_capacity(encoded_len(topic.len(), payload.len()));
    buf.put_slice(&header.encode());
    buf.put_slice(topic);
    buf.put_slice(payload);

    Ok(buf.freeze())
}

/// Decode one record from the front of `cursor`
///
/// `offset` is the absolute position of the cursor in the recording and is
/// only used for error reporting. On success the cursor is advanced past the
/// record; on error it is left untouched.
///
/// # Errors
///
/// Returns [`FormatError::Truncated`] if the cursor ends inside the record
pub fn decode_record(cursor: &mut &[u8], offset: u64) -> Result<MessageRecord, FormatError> {
    let mut buf = *cursor;
    let truncated = FormatError::Truncated {
        offset,
        section: Section::RecordHeader,
    };

    match read_record(&mut buf, offset, &ReaderConfig::default()) {
        Ok(Some(record)) => {
            *cursor = buf;
            Ok(record)
        }
        Ok(None) => Err(truncated),
        Err(Error::Format(e)) => Err(e),
        // Reading from a slice never fails with I/O errors
        Err(_) => Err(truncated),
    }
}

/// Read the next record from a byte stream
///
/// Returns `Ok(None)` when the stream ends before the first byte of a
/// record. Declared sizes are checked against `limits` before any body
/// bytes are buffered.
pub(crate) fn read_record<R: Read>(
    source: &mut R,
    offset: u64,
    limits: &ReaderConfig,
) -> crate::Result<Option<MessageRecord>> {
    let mut block = [0u8; RECORD_HEADER_SIZE];
    match read_full(source, &mut block)? {
        0 => return Ok(None),
        RECORD_HEADER_SIZE => {}
        _ => {
            return Err(FormatError::Truncated {
                offset,
                section: Section::RecordHeader,
            }
            .into())
        }
    }

    let header = RecordHeader::decode(&block);
    header.check_limits(offset, limits)?;

    let body_offset = offset + RECORD_HEADER_SIZE as u64;
    let topic = read_body(source, usize::from(header.topic_len), body_offset)?;
    let payload = read_body(source, header.payload_size as usize, body_offset)?;

    Ok(Some(MessageRecord {
        sent_ns: header.sent_ns,
        received_ns: header.received_ns,
        topic,
        payload,
    }))
}

/// Read exactly `len` bytes of record body
fn read_body<R: Read>(source: &mut R, len: usize, body_offset: u64) -> crate::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    source.by_ref().take(len as u64).read_to_end(&mut buf)?;

    if buf.len() < len {
        return Err(FormatError::Truncated {
            offset: body_offset,
            section: Section::RecordBody,
        }
        .into());
    }

    Ok(buf)
}

/// Fill `buf` as far as the source allows, returning the bytes read
pub(crate) fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let encoded = encode_record(1000, 2000, b"t1", b"Hello").unwrap();

        assert_eq!(encoded.len(), RECORD_HEADER_SIZE + 2 + 5);
        assert_eq!(&encoded[..8], &1000u64.to_le_bytes());
        assert_eq!(&encoded[8..16], &2000u64.to_le_bytes());
        assert_eq!(&encoded[16..18], &2u16.to_le_bytes());
        assert_eq!(&encoded[18..22], &5u32.to_le_bytes());
        assert_eq!(&encoded[22..24], b"t1");
        assert_eq!(&encoded[24..], b"Hello");
    }

    #[test]
    fn test_decode_record() {
        let encoded = encode_record(7, 8, b"sensor/imu", &[0x00, 0xFF, 0xAB]).unwrap();
        let mut cursor = &encoded[..];

        let record = decode_record(&mut cursor, 32).unwrap();
        assert_eq!(record, MessageRecord::new(7, 8, b"sensor/imu", &[0x00, 0xFF, 0xAB]));
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_zero_timestamps_stored_verbatim() {
        let encoded = encode_record(0, 0, b"t", b"").unwrap();
        let record = decode_record(&mut &encoded[..], 0).unwrap();

        assert_eq!(record.sent_ns, 0);
        assert_eq!(record.received_ns, 0);
    }

    #[test]
    fn test_empty_payload() {
        let encoded = encode_record(1, 2, b"empty/topic", b"").unwrap();
        let record = decode_record(&mut &encoded[..], 0).unwrap();

        assert!(record.payload.is_empty());
        assert_eq!(record.encoded_len(), encoded.len());
    }

    #[test]
    fn test_consecutive_records() {
        let mut data = BytesMut::new();
        data.put(encode_record(1, 1, b"a", b"first").unwrap());
        data.put(encode_record(2, 2, b"b", b"second").unwrap());

        let mut cursor = &data[..];
        let first = decode_record(&mut cursor, 0).unwrap();
        let second = decode_record(&mut cursor, first.encoded_len() as u64).unwrap();

        assert_eq!(first.payload, b"first");
        assert_eq!(second.payload, b"second");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_truncated_header() {
        let encoded = encode_record(1, 2, b"topic", b"payload").unwrap();
        let mut cursor = &encoded[..10];

        let err = decode_record(&mut cursor, 32).unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                offset: 32,
                section: Section::RecordHeader,
            }
        );
        assert_eq!(cursor.len(), 10);
    }

    #[test]
    fn test_truncated_body() {
        let encoded = encode_record(1, 2, b"topic", b"payload").unwrap();
        let mut cursor = &encoded[..encoded.len() - 1];

        let err = decode_record(&mut cursor, 0).unwrap_err();
        assert_eq!(
            err,
            FormatError::Truncated {
                offset: RECORD_HEADER_SIZE as u64,
                section: Section::RecordBody,
            }
        );
    }

    #[test]
    fn test_topic_too_long() {
        let topic = vec![b'x'; 70_000];
        let err = encode_record(0, 0, &topic, b"data").unwrap_err();

        assert_eq!(
            err,
            ValidationError::TopicTooLong {
                len: 70_000,
                max: MAX_TOPIC_LEN,
            }
        );
    }

    #[test]
    fn test_topic_at_limit() {
        let topic = vec![b'x'; MAX_TOPIC_LEN];
        let encoded = encode_record(0, 0, &topic, b"").unwrap();
        let record = decode_record(&mut &encoded[..], 0).unwrap();

        assert_eq!(record.topic.len(), MAX_TOPIC_LEN);
    }

    #[test]
    fn test_topic_lossy() {
        let record = MessageRecord::new(0, 0, "test/unicode/日本語".as_bytes(), b"");
        assert_eq!(record.topic_lossy(), "test/unicode/日本語");

        let record = MessageRecord::new(0, 0, &[b'a', 0xFF], b"");
        assert_eq!(record.topic_lossy(), "a\u{FFFD}");
    }

    #[test]
    fn test_nul_terminated_topic() {
        let record = MessageRecord::new(0, 0, b"sensor.imu\0", b"");
        assert_eq!(record.topic_name(), b"sensor.imu");
        assert_eq!(record.topic_lossy(), "sensor.imu");

        // Only one terminator is dropped; the stored bytes stay untouched
        let record = MessageRecord::new(0, 0, b"a\0\0", b"");
        assert_eq!(record.topic_name(), b"a\0");
        assert_eq!(record.topic, b"a\0\0");

        let record = MessageRecord::new(0, 0, b"", b"");
        assert!(record.topic_name().is_empty());
    }

    #[test]
    fn test_check_limits() {
        let header = RecordHeader {
            sent_ns: 0,
            received_ns: 0,
            topic_len: 8,
            payload_size: 100,
        };
        assert!(header.check_limits(0, &ReaderConfig::default()).is_ok());

        let limits = ReaderConfig {
            max_topic_len: 4,
            ..ReaderConfig::default()
        };
        assert_eq!(
            header.check_limits(54, &limits),
            Err(FormatError::RecordTooLarge {
                offset: 54,
                topic_len: 8,
                payload_size: 100,
            })
        );
    }

    #[test]
    fn test_read_record_from_stream() {
        let mut data = BytesMut::new();
        data.put(encode_record(1, 1, b"a", b"first").unwrap());
        data.put(encode_record(2, 2, b"b", b"second").unwrap());
        let mut stream = &data[..];

        let first = read_record(&mut stream, 32, &ReaderConfig::default())
            .unwrap()
            .unwrap();
        let second = read_record(&mut stream, 32 + first.encoded_len() as u64, &ReaderConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(first.payload, b"first");
        assert_eq!(second.payload, b"second");
        assert!(read_record(&mut stream, 0, &ReaderConfig::default())
            .unwrap()
            .is_none());
    }
}
