//! Bus capture into recordings

mod recorder;

pub use recorder::{Recorder, RecorderStats};

/// Default number of messages queued between the bus and the file
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Default number of messages written between flushes
pub const DEFAULT_BATCH_SIZE: usize = 100;
