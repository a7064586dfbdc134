//! Replay of recordings onto a message bus

mod player;

pub use player::{schedule_offset, PlaybackStats, Player};

/// Replay at the recorded pace
pub const REAL_TIME: f64 = 1.0;

/// Replay without pauses between messages
pub const AS_FAST_AS_POSSIBLE: f64 = 0.0;
