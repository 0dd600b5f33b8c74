//! Resampling stage of the conversion pipeline (spec §4.7 "Resampling").
//!
//! Backend selection, in priority order, first-available wins:
//!
//! 1. [`sinc`] — a dynamically loaded `libsamplerate`-ABI library.
//! 2. [`polyphase`] — rational-ratio FIR filter bank, when the reduced
//!    ratio's denominator is small enough.
//! 3. [`fft`] — whole-block Fourier resampling, for ratios polyphase can't
//!    handle efficiently.
//! 4. [`linear`] — interpolation, always available, and the forced choice
//!    at [`ResampleQuality::Fast`] regardless of what else is loaded (spec:
//!    "fast -> linear").

mod fft;
mod linear;
mod polyphase;
mod sinc;

use proctap_core::ResampleQuality;

/// Computes the destination frame count for a chunk of `src_frames` frames
/// resampled from `src_rate` to `dst_rate` (spec: "`src_frames * dst_rate /
/// src_rate`, rounded to nearest").
pub fn dst_frame_count(src_frames: usize, src_rate: u32, dst_rate: u32) -> usize {
    ((src_frames as f64) * f64::from(dst_rate) / f64::from(src_rate)).round() as usize
}

/// Resamples one complete interleaved chunk from `src_rate` to `dst_rate`.
///
/// `input` holds `channels`-interleaved `f32` samples. Returns interleaved
/// `f32` samples at `dst_rate`. A no-op (returns `input` unchanged) when the
/// rates match.
pub fn resample_interleaved(
    input: &[f32],
    channels: u16,
    src_rate: u32,
    dst_rate: u32,
    quality: ResampleQuality,
) -> Vec<f32> {
    if src_rate == dst_rate {
        return input.to_vec();
    }
    let ratio = f64::from(dst_rate) / f64::from(src_rate);

    if let Some(out) = sinc::resample(input, channels, ratio, quality) {
        return out;
    }

    let src_frames = input.len() / channels.max(1) as usize;
    let dst_frames = dst_frame_count(src_frames, src_rate, dst_rate);

    if quality == ResampleQuality::Fast {
        return resample_per_channel(input, channels, dst_frames, |ch| linear::resample(ch, dst_frames));
    }

    if polyphase::ratio_is_polyphase_friendly(src_rate, dst_rate) {
        resample_per_channel(input, channels, dst_frames, |ch| {
            polyphase::resample(ch, src_rate, dst_rate, quality)
        })
    } else {
        resample_per_channel(input, channels, dst_frames, |ch| fft::resample(ch, dst_frames))
    }
}

fn resample_per_channel(
    input: &[f32],
    channels: u16,
    dst_frames: usize,
    mut per_channel: impl FnMut(&[f32]) -> Vec<f32>,
) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return per_channel(input);
    }
    let frames_in = input.len() / channels;
    let mut deinterleaved: Vec<Vec<f32>> = vec![Vec::with_capacity(frames_in); channels];
    for frame in input.chunks_exact(channels) {
        for (c, &s) in frame.iter().enumerate() {
            deinterleaved[c].push(s);
        }
    }
    let resampled: Vec<Vec<f32>> = deinterleaved.iter().map(|ch| per_channel(ch)).collect();

    let mut out = Vec::with_capacity(dst_frames * channels);
    for i in 0..dst_frames {
        for ch in &resampled {
            out.push(*ch.get(i).unwrap_or(&0.0));
        }
    }
    out
}

/// Whether a dynamically loaded high-quality resampling library is in use.
pub fn sinc_backend_available() -> bool {
    sinc::is_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ratio_is_a_plain_copy() {
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let out = resample_interleaved(&input, 2, 48_000, 48_000, ResampleQuality::Best);
        assert_eq!(out, input);
    }

    #[test]
    fn dst_frame_count_matches_ratio() {
        assert_eq!(dst_frame_count(48_000, 48_000, 24_000), 24_000);
        assert_eq!(dst_frame_count(44_100, 44_100, 48_000), 48_000);
    }

    #[test]
    fn fast_quality_uses_linear_and_preserves_channel_count() {
        let input: Vec<f32> = (0..200).map(|i| (i as f32 / 200.0).sin()).collect();
        let out = resample_interleaved(&input, 2, 48_000, 44_100, ResampleQuality::Fast);
        assert_eq!(out.len() % 2, 0);
    }

    #[test]
    fn stereo_channels_resample_independently() {
        // Left channel is all zero, right is all one; after resampling the
        // channel separation must still hold.
        let frames = 480;
        let mut input = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            input.push(0.0);
            input.push(1.0);
        }
        let out = resample_interleaved(&input, 2, 48_000, 24_000, ResampleQuality::Best);
        for frame in out.chunks_exact(2) {
            assert!(frame[0].abs() < 0.05, "left leaked: {}", frame[0]);
            assert!((frame[1] - 1.0).abs() < 0.05, "right drifted: {}", frame[1]);
        }
    }
}
