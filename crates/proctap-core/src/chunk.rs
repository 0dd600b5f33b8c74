use crate::format::{Format, SampleFormat};

/// A variable-size, frame-aligned slice of captured audio (spec §3 "PCM
/// frame / chunk").
///
/// Invariant: `bytes.len() == frame_count * channels * bytes_per_sample`.
/// `Chunk` always carries its own format alongside the bytes so a consumer
/// that calls `read`/`stream` once and stores the result never needs to ask
/// the session what format it was in (the session may since have stopped).
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Interleaved PCM bytes, little-endian per sample.
    pub bytes: Vec<u8>,
    /// Number of frames (samples per channel) represented by `bytes`.
    pub frame_count: usize,
    /// Sample rate of this chunk's data, in hertz.
    pub sample_rate: u32,
    /// Channel count of this chunk's data.
    pub channels: u16,
    /// Sample encoding of this chunk's data.
    pub sample_format: SampleFormat,
}

impl Chunk {
    /// Builds a chunk from a byte buffer and a format, deriving `frame_count`
    /// from the buffer length.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len()` is not a multiple of `format.frame_size()` —
    /// every producer in this workspace (ring buffer reads, the conversion
    /// pipeline) is required to maintain whole-frame alignment, so a
    /// mismatch here is an invariant violation, not a recoverable error.
    pub fn new(bytes: Vec<u8>, format: Format) -> Self {
        let frame_size = format.frame_size();
        assert_eq!(
            bytes.len() % frame_size,
            0,
            "chunk byte length {} is not a multiple of frame size {frame_size}",
            bytes.len()
        );
        let frame_count = bytes.len() / frame_size;
        Chunk {
            bytes,
            frame_count,
            sample_rate: format.sample_rate,
            channels: format.channels,
            sample_format: format.sample_format,
        }
    }

    /// The format this chunk's bytes are encoded in.
    pub fn format(&self) -> Format {
        Format {
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_format: self.sample_format,
        }
    }

    /// Whether this chunk carries no frames.
    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_derived_from_len() {
        let format = Format {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormat::Float32,
        };
        let chunk = Chunk::new(vec![0u8; 8 * 10], format);
        assert_eq!(chunk.frame_count, 10);
        assert_eq!(chunk.bytes.len(), chunk.frame_count * format.frame_size());
    }

    #[test]
    #[should_panic(expected = "not a multiple of frame size")]
    fn misaligned_bytes_panics() {
        let format = Format {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormat::Float32,
        };
        let _ = Chunk::new(vec![0u8; 7], format);
    }
}
