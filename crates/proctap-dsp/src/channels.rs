//! Channel remap: the second stage of the conversion pipeline.
//!
//! Operates on decoded `f32` samples so the mono-mixdown average is computed
//! in float arithmetic regardless of the wire format; the caller converts
//! back to the target sample format afterward. `proctap-core` only models
//! mono and stereo (spec: "unsupported n-to-m mappings fail with
//! `FormatUnsupported`"), so this module only ever sees 1 or 2 input/output
//! channels.

use proctap_core::{CaptureError, ErrorKind};

/// Remaps interleaved `f32` frames from `from_channels` to `to_channels`.
///
/// `samples.len()` must be a multiple of `from_channels`. Returns
/// `Err(FormatUnsupported)` for any channel count other than 1 or 2 on
/// either side.
pub fn remap_channels(
    samples: &[f32],
    from_channels: u16,
    to_channels: u16,
) -> Result<Vec<f32>, CaptureError> {
    if from_channels == to_channels {
        return Ok(samples.to_vec());
    }
    match (from_channels, to_channels) {
        (2, 1) => Ok(samples
            .chunks_exact(2)
            .map(|frame| (frame[0] + frame[1]) / 2.0)
            .collect()),
        (1, 2) => Ok(samples.iter().flat_map(|&s| [s, s]).collect()),
        (from, to) => Err(CaptureError::new(
            ErrorKind::FormatUnsupported,
            format!("unsupported channel remap: {from} -> {to}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_to_mono_averages_each_frame() {
        let samples = [1.0, -1.0, 0.5, 0.5, 0.0, 1.0];
        let out = remap_channels(&samples, 2, 1).unwrap();
        assert_eq!(out, vec![0.0, 0.5, 0.5]);
    }

    #[test]
    fn mono_to_stereo_duplicates_samples() {
        let samples = [0.25, -0.25];
        let out = remap_channels(&samples, 1, 2).unwrap();
        assert_eq!(out, vec![0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn identity_is_a_plain_copy() {
        let samples = [0.1, 0.2, 0.3, 0.4];
        let out = remap_channels(&samples, 2, 2).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn unsupported_mapping_is_format_unsupported() {
        let err = remap_channels(&[0.0; 6], 3, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatUnsupported);
    }
}
