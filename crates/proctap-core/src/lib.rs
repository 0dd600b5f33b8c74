//! Proctap Core - shared value types for per-process audio capture.
//!
//! This crate holds the data model every other proctap crate builds on:
//!
//! - [`CaptureTarget`] - what to capture (a process id, or a macOS bundle id)
//! - [`Format`] / [`SampleFormat`] - PCM stream configuration
//! - [`Chunk`] - a frame-aligned slice of captured audio
//! - [`CaptureError`] / [`ErrorKind`] - the error taxonomy shared across backends
//! - [`SessionState`] - the façade's lifecycle state machine
//! - [`ResampleQuality`] - the quality hint accepted by the conversion pipeline
//!
//! Nothing here touches an OS audio API, a thread, or the ring buffer; it is
//! the vocabulary the rest of the workspace is written in.

mod chunk;
mod error;
mod format;
mod quality;
mod state;
mod target;

pub use chunk::Chunk;
pub use error::{CaptureError, ErrorKind};
pub use format::{Format, SampleFormat};
pub use quality::ResampleQuality;
pub use state::SessionState;
pub use target::CaptureTarget;
