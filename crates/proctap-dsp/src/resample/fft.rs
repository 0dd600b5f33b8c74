//! FFT-based global resampling (spec §4.7 backend priority 3).
//!
//! Used when the `src_rate`/`dst_rate` ratio doesn't reduce to a polyphase
//! filter bank of reasonable size (see
//! [`super::polyphase::ratio_is_polyphase_friendly`]). Treats the whole
//! chunk as one finite-length signal: forward FFT, resize the spectrum to
//! the target bin count (truncating or zero-padding high frequencies),
//! inverse FFT. This is the standard "Fourier interpolation" resampling
//! algorithm (as in `scipy.signal.resample`), not used elsewhere in this
//! workspace; `rustfft` is pulled in specifically for this fallback.

use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

/// Resamples one complete chunk of `input` to `dst_frames` frames via
/// forward FFT, spectral resize, inverse FFT.
///
/// Like the polyphase and SINC backends, this treats each call as a
/// complete signal (spec: "end of input" semantics) — there is no state
/// carried between calls, so a periodic signal will show minor edge
/// artifacts at chunk boundaries. Acceptable for the short (~10 ms) chunks
/// this pipeline normally resamples.
pub fn resample(input: &[f32], dst_frames: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 || dst_frames == 0 {
        return vec![0.0; dst_frames];
    }
    if n == dst_frames {
        return input.to_vec();
    }

    let mut planner = FftPlanner::<f32>::new();
    let mut spectrum: Vec<Complex32> = input.iter().map(|&s| Complex32::new(s, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    let mut resized = vec![Complex32::new(0.0, 0.0); dst_frames];
    let keep = (n / 2).min(dst_frames / 2);
    // Positive frequencies, DC through `keep`.
    resized[..=keep].copy_from_slice(&spectrum[..=keep]);
    // Negative frequencies, mirrored from the end of each buffer.
    for i in 1..keep {
        resized[dst_frames - i] = spectrum[n - i];
    }

    planner.plan_fft_inverse(dst_frames).process(&mut resized);
    // rustfft's forward and inverse transforms are both unnormalized; the
    // standard Fourier-resampling scale factor is `1/n` regardless of the
    // new length (the inverse transform's own `1/dst_frames` and the
    // "amplitude preservation" factor of `dst_frames/n` cancel).
    let scale = 1.0 / n as f32;
    resized.iter().map(|c| c.re * scale).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn identity_length_is_untouched() {
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let out = resample(&input, 4);
        for (a, b) in input.iter().zip(out.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn upsampling_preserves_a_low_frequency_tone() {
        let sr = 8_000.0;
        let n = 800;
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * 200.0 * i as f32 / sr).sin())
            .collect();
        let out = resample(&signal, n * 2);
        assert_eq!(out.len(), n * 2);

        let energy_in: f32 = signal.iter().map(|s| s * s).sum::<f32>() / n as f32;
        let energy_out: f32 = out.iter().map(|s| s * s).sum::<f32>() / out.len() as f32;
        assert!(
            (energy_in - energy_out).abs() < 0.2,
            "energy mismatch: in={energy_in} out={energy_out}"
        );
    }

    #[test]
    fn downsampling_halves_frame_count() {
        let n = 512;
        let signal: Vec<f32> = (0..n).map(|i| (i as f32 / n as f32).sin()).collect();
        let out = resample(&signal, n / 2);
        assert_eq!(out.len(), n / 2);
    }
}
