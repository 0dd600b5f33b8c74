//! Sample-format conversion, channel remap, and resampling: the format
//! normalization pipeline every capture session runs its chunks through
//! before handing them to a caller in a non-native format.
//!
//! Raw PCM from a backend always stays in its native format on the ring
//! buffer; this crate is what turns that into whatever format the caller
//! actually asked for, and only runs when the two disagree.

#![allow(unsafe_code)]

mod channels;
mod convert;
mod detect;
mod pipeline;
mod resample;
mod simd;

pub use convert::convert_samples;
pub use detect::{detect_format, DetectedFormat};
pub use pipeline::convert_chunk;
pub use resample::{dst_frame_count, resample_interleaved, sinc_backend_available};
pub use simd::{simd_level, SimdLevel};
