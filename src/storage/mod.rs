//! Binary storage format for recordings

mod format;
mod reader;
mod record;
mod writer;

pub use format::{
    decode_header, encode_header, FileHeader, FILE_MAGIC, FORMAT_VERSION, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, MAX_TOPIC_LEN, RECORD_HEADER_SIZE,
};
pub use reader::{MessageReader, Messages};
pub use record::{decode_record, encode_record, encoded_len, MessageRecord, RecordHeader};
pub use writer::{DurableSink, MessageWriter};

/// File extension used for recordings
pub const FILE_EXTENSION: &str = "zet";
