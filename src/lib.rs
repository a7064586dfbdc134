//! Timeskip - append-only `.zet` recordings of pub/sub traffic
//!
//! A recording is a fixed 32-byte header followed by self-delimiting
//! message records. [`storage`] holds the codec, writer and reader;
//! [`recording`] and [`replay`] move messages between a [`bus::MessageBus`]
//! and recordings.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod bus;
pub mod clock;
pub mod config;
pub mod digest;
pub mod error;
pub mod recording;
pub mod replay;
pub mod storage;
pub mod summary;

pub use error::{Error, FormatError, Result, Section, ValidationError};
