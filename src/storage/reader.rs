//! Recording file reader

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use tracing::debug;

use super::format::{decode_header, FileHeader, HEADER_SIZE};
use super::record::{read_full, read_record, MessageRecord};
use crate::config::ReaderConfig;
use crate::error::{FormatError, Section};
use crate::{Error, Result};

/// Forward-only reader for `.zet` recordings
///
/// The header is decoded when the reader is opened; records are decoded one
/// at a time on demand. Generic over `R: Read` so tests can read from
/// `&[u8]` and production code from a buffered file.
pub struct MessageReader<R: Read = BufReader<File>> {
    source: Option<R>,
    header: FileHeader,
    limits: ReaderConfig,
    position: u64,
    records_read: u64,
    failure: Option<Failure>,
}

impl MessageReader<BufReader<File>> {
    /// Open an existing recording file
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist, or a
    /// format error if it does not start with a valid header
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, ReaderConfig::default())
    }

    /// Open an existing recording file with explicit record limits
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file does not exist, or a
    /// format error if it does not start with a valid header
    pub fn open_with(path: &Path, limits: ReaderConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;

        let reader = Self::from_reader_with(BufReader::new(file), limits)?;
        debug!(
            "Opened recording: {} (start time {})",
            path.display(),
            reader.header.start_time_ns
        );
        Ok(reader)
    }
}

impl<R: Read> MessageReader<R> {
    /// Read and validate the header from an arbitrary source
    ///
    /// # Errors
    ///
    /// Returns error if the source is shorter than a header or the header
    /// is invalid
    pub fn from_reader(source: R) -> Result<Self> {
        Self::from_reader_with(source, ReaderConfig::default())
    }

    /// Read and validate the header from an arbitrary source with explicit
    /// record limits
    ///
    /// # Errors
    ///
    /// Returns error if the source is shorter than a header or the header
    /// is invalid
    pub fn from_reader_with(mut source: R, limits: ReaderConfig) -> Result<Self> {
        let mut block = [0u8; HEADER_SIZE];
        if read_full(&mut source, &mut block)? < HEADER_SIZE {
            return Err(FormatError::Truncated {
                offset: 0,
                section: Section::FileHeader,
            }
            .into());
        }

        let header = decode_header(&block)?;

        Ok(Self {
            source: Some(source),
            header,
            limits,
            position: HEADER_SIZE as u64,
            records_read: 0,
            failure: None,
        })
    }

    /// The decoded file header
    #[must_use]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Recording start time from the header
    #[must_use]
    pub fn start_time_ns(&self) -> u64 {
        self.header.start_time_ns
    }

    /// Decode the next record
    ///
    /// Returns `Ok(None)` when the source ends exactly on a record boundary.
    /// A source that ends inside a record is reported as
    /// [`FormatError::Truncated`], and that error is returned again on every
    /// later call.
    ///
    /// # Errors
    ///
    /// Returns error if the reader is closed, the source fails, or the data
    /// does not form a complete record
    pub fn read_message(&mut self) -> Result<Option<MessageRecord>> {
        let source = self.source.as_mut().ok_or(Error::Closed("reader"))?;
        if let Some(failure) = &self.failure {
            return Err(failure.to_error());
        }

        match read_record(source, self.position, &self.limits) {
            Ok(Some(record)) => {
                self.position += record.encoded_len() as u64;
                self.records_read += 1;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                // The stream position is unknown after any failure
                self.failure = Some(Failure::latch(&e));
                Err(e)
            }
        }
    }

    /// Iterate over the remaining records
    ///
    /// The iterator ends at clean end-of-stream, or after yielding the first
    /// error.
    pub fn read_all_messages(&mut self) -> Messages<'_, R> {
        Messages {
            reader: self,
            done: false,
        }
    }

    /// Offset of the next record
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of records decoded so far
    #[must_use]
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Release the source; closing twice is a no-op
    pub fn close(&mut self) {
        if self.source.take().is_some() {
            debug!("Closed recording after {} records", self.records_read);
        }
    }

    /// Whether the reader has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }
}

/// Iterator over records, see [`MessageReader::read_all_messages`]
pub struct Messages<'a, R: Read> {
    reader: &'a mut MessageReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Messages<'_, R> {
    type Item = Result<MessageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.read_message() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for Messages<'_, R> {}

/// Error remembered after a failed read so later calls repeat it
#[derive(Debug, Clone)]
enum Failure {
    Format(FormatError),
    Io(ErrorKind, String),
}

impl Failure {
    fn latch(err: &Error) -> Self {
        match err {
            Error::Format(e) => Self::Format(e.clone()),
            Error::Io(e) => Self::Io(e.kind(), e.to_string()),
            other => Self::Io(ErrorKind::Other, other.to_string()),
        }
    }

    fn to_error(&self) -> Error {
        match self {
            Self::Format(e) => e.clone().into(),
            Self::Io(kind, message) => io::Error::new(*kind, message.clone()).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{encode_header, encode_record, MessageWriter, RecordHeader, FORMAT_VERSION};
    use tempfile::NamedTempFile;

    fn recording(records: &[(&str, &str, u64, u64)]) -> Vec<u8> {
        let mut data = encode_header(FORMAT_VERSION, 500).to_vec();
        for (topic, payload, sent, received) in records {
            let encoded =
                encode_record(*sent, *received, topic.as_bytes(), payload.as_bytes()).unwrap();
            data.extend_from_slice(&encoded);
        }
        data
    }

    #[test]
    fn test_roundtrip() {
        let file = NamedTempFile::new().unwrap();

        {
            let mut writer = MessageWriter::create(file.path()).unwrap();
            writer.write_message(b"t1", b"Hello", 1000, 2000).unwrap();
            writer.write_message(b"t2", b"World", 3000, 4000).unwrap();
            writer.close().unwrap();
        }

        let mut reader = MessageReader::open(file.path()).unwrap();
        assert_eq!(reader.start_time_ns(), 1000);

        let first = reader.read_message().unwrap().unwrap();
        assert_eq!(first, MessageRecord::new(1000, 2000, b"t1", b"Hello"));

        let second = reader.read_message().unwrap().unwrap();
        assert_eq!(second, MessageRecord::new(3000, 4000, b"t2", b"World"));

        assert!(reader.read_message().unwrap().is_none());
        assert!(reader.read_message().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
        assert_eq!(reader.start_time_ns(), 1000);
    }

    #[test]
    fn test_empty_recording() {
        let data = recording(&[]);
        let mut reader = MessageReader::from_reader(data.as_slice()).unwrap();

        assert_eq!(reader.start_time_ns(), 500);
        assert!(reader.read_message().unwrap().is_none());
    }

    #[test]
    fn test_short_header() {
        let data = recording(&[]);
        let err = MessageReader::from_reader(&data[..HEADER_SIZE - 1]).err().unwrap();

        assert!(matches!(
            err,
            Error::Format(FormatError::Truncated {
                offset: 0,
                section: Section::FileHeader,
            })
        ));
        assert!(MessageReader::from_reader(&[0u8; 0][..]).is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut data = recording(&[]);
        data[0] = b'X';

        let err = MessageReader::from_reader(data.as_slice()).err().unwrap();
        assert!(matches!(err, Error::Format(FormatError::BadMagic { .. })));
    }

    #[test]
    fn test_truncated_record_header() {
        let data = recording(&[("topic", "payload", 1, 2)]);
        let cut = &data[..HEADER_SIZE + 5];

        let mut reader = MessageReader::from_reader(cut).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::Truncated {
                offset: 32,
                section: Section::RecordHeader,
            })
        ));
    }

    #[test]
    fn test_truncated_record_body() {
        let data = recording(&[("a", "first", 1, 2), ("b", "second", 3, 4)]);
        let cut = &data[..data.len() - 3];

        let mut reader = MessageReader::from_reader(cut).unwrap();
        assert_eq!(reader.read_message().unwrap().unwrap().payload, b"first");

        let err = reader.read_message().unwrap_err();
        assert!(err.is_truncation());

        // The failure is sticky rather than turning into end-of-stream
        assert!(reader.read_message().unwrap_err().is_truncation());
    }

    #[test]
    fn test_every_cut_inside_a_record_is_detected() {
        let data = recording(&[("topic", "payload", 1, 2)]);

        for len in HEADER_SIZE + 1..data.len() {
            let mut reader = MessageReader::from_reader(&data[..len]).unwrap();
            let err = reader.read_message().unwrap_err();
            assert!(err.is_truncation(), "cut at {len} not detected");
        }
    }

    #[test]
    fn test_record_too_large() {
        let payload = "x".repeat(64);
        let data = recording(&[("topic", payload.as_str(), 1, 2)]);
        let limits = ReaderConfig {
            max_payload_size: 32,
            ..ReaderConfig::default()
        };

        let mut reader = MessageReader::from_reader_with(data.as_slice(), limits).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            Error::Format(FormatError::RecordTooLarge {
                offset: 32,
                topic_len: 5,
                payload_size: 64,
            })
        ));
    }

    #[test]
    fn test_huge_declared_payload_is_truncation() {
        let mut data = recording(&[]);
        let mut block = RecordHeader {
            sent_ns: 1,
            received_ns: 2,
            topic_len: 1,
            payload_size: u32::MAX,
        }
        .encode()
        .to_vec();
        block.extend_from_slice(b"tpayload");
        data.extend_from_slice(&block);

        let mut reader = MessageReader::from_reader(data.as_slice()).unwrap();
        assert!(reader.read_message().unwrap_err().is_truncation());
    }

    /// Source that fails once when reaching `fail_at`, then serves the rest
    struct FailOnce {
        data: Vec<u8>,
        pos: usize,
        fail_at: usize,
        failed: bool,
    }

    impl Read for FailOnce {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.failed && self.pos >= self.fail_at {
                self.failed = true;
                return Err(io::Error::new(ErrorKind::Other, "device error"));
            }
            let end = if self.failed {
                self.data.len()
            } else {
                self.fail_at
            };
            let n = buf.len().min(end - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_io_error_is_sticky() {
        let data = recording(&[("a", "first", 1, 2), ("b", "second", 3, 4)]);
        let source = FailOnce {
            data,
            pos: 0,
            fail_at: HEADER_SIZE + 10,
            failed: false,
        };

        let mut reader = MessageReader::from_reader(source).unwrap();
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        // The source would now resume mid-record; the reader must not parse it
        for _ in 0..2 {
            let err = reader.read_message().unwrap_err();
            assert!(matches!(&err, Error::Io(e) if e.kind() == ErrorKind::Other));
        }
        assert_eq!(reader.records_read(), 0);
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let data = recording(&[("a", "1", 1, 1), ("b", "2", 2, 2)]);
        let cut = &data[..data.len() - 1];

        let mut reader = MessageReader::from_reader(cut).unwrap();
        let results: Vec<_> = reader.read_all_messages().collect();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_truncation());
    }

    #[test]
    fn test_iterator_clean_end() {
        let data = recording(&[("a", "1", 1, 1), ("b", "", 2, 2), ("c", "3", 3, 3)]);
        let mut reader = MessageReader::from_reader(data.as_slice()).unwrap();

        let topics: Vec<_> = reader
            .read_all_messages()
            .map(|r| r.unwrap().topic)
            .collect();
        assert_eq!(topics, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn test_close() {
        let data = recording(&[("a", "1", 1, 1)]);
        let mut reader = MessageReader::from_reader(data.as_slice()).unwrap();

        reader.close();
        reader.close();
        assert!(reader.is_closed());
        assert!(matches!(reader.read_message(), Err(Error::Closed("reader"))));
        assert_eq!(reader.start_time_ns(), 500);
    }

    #[test]
    fn test_open_missing_file() {
        let err = MessageReader::open(Path::new("/tmp/nonexistent_file_12345.zet"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_open_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let err = MessageReader::open(file.path()).err().unwrap();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_records_are_independent_of_reader() {
        let data = recording(&[("keep", "me", 1, 1)]);
        let record = {
            let mut reader = MessageReader::from_reader(data.as_slice()).unwrap();
            reader.read_message().unwrap().unwrap()
        };

        assert_eq!(record.payload, b"me");
    }
}
