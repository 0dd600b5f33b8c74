//! The three-stage conversion pipeline: sample-format convert -> channel
//! remap -> resample (spec §4.7).
//!
//! Each stage is skipped when its input and output already agree, and the
//! whole pipeline is a pass-through when `from == to` — the dispatcher can
//! hand the ring's raw bytes straight to a caller without touching this
//! module at all in that case (spec: "if the pipeline is the identity, the
//! raw ring bytes are returned unchanged").

use proctap_core::{CaptureError, Format, ResampleQuality};

use crate::channels;
use crate::convert;
use crate::resample;

/// Converts one complete chunk of interleaved PCM bytes from `from` to `to`.
///
/// Takes ownership of `bytes` so the identity case can return it without a
/// copy. `quality` only matters when resampling actually runs.
pub fn convert_chunk(
    bytes: Vec<u8>,
    from: Format,
    to: Format,
    quality: ResampleQuality,
) -> Result<Vec<u8>, CaptureError> {
    if from.is_identity(&to) {
        return Ok(bytes);
    }

    let after_format = if from.sample_format == to.sample_format {
        bytes
    } else {
        convert::convert_samples(&bytes, from.sample_format, to.sample_format)
    };

    let after_remap = if from.channels == to.channels {
        after_format
    } else {
        let floats = convert::decode_to_f32(&after_format, to.sample_format);
        let remapped = channels::remap_channels(&floats, from.channels, to.channels)?;
        convert::encode_from_f32(&remapped, to.sample_format)
    };

    let final_bytes = if from.sample_rate == to.sample_rate {
        after_remap
    } else {
        let floats = convert::decode_to_f32(&after_remap, to.sample_format);
        let resampled = resample::resample_interleaved(
            &floats,
            to.channels,
            from.sample_rate,
            to.sample_rate,
            quality,
        );
        convert::encode_from_f32(&resampled, to.sample_format)
    };

    Ok(final_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctap_core::SampleFormat;

    fn format(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Format {
        Format {
            sample_rate,
            channels,
            sample_format,
        }
    }

    #[test]
    fn identity_pipeline_returns_bytes_unchanged() {
        let fmt = format(48_000, 2, SampleFormat::Float32);
        let bytes = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let out = convert_chunk(bytes.clone(), fmt, fmt, ResampleQuality::Best).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn format_only_conversion_skips_remap_and_resample() {
        let from = format(48_000, 2, SampleFormat::Int16);
        let to = format(48_000, 2, SampleFormat::Float32);
        let samples: Vec<i16> = vec![0, 16384, -16384, 32767];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let out = convert_chunk(bytes, from, to, ResampleQuality::Best).unwrap();
        assert_eq!(out.len(), samples.len() * 4);
    }

    #[test]
    fn channel_remap_changes_frame_count_not_sample_rate() {
        let from = format(48_000, 2, SampleFormat::Float32);
        let to = format(48_000, 1, SampleFormat::Float32);
        let samples: Vec<f32> = vec![1.0, -1.0, 0.5, 0.5];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let out = convert_chunk(bytes, from, to, ResampleQuality::Best).unwrap();
        assert_eq!(out.len(), 2 * 4);
    }

    #[test]
    fn unsupported_channel_mapping_surfaces_format_unsupported() {
        let from = format(48_000, 3, SampleFormat::Float32);
        let to = format(48_000, 1, SampleFormat::Float32);
        let bytes = vec![0u8; 12 * 4];
        let err = convert_chunk(bytes, from, to, ResampleQuality::Best).unwrap_err();
        assert_eq!(err.kind(), proctap_core::ErrorKind::FormatUnsupported);
    }
}
