//! Polyphase rational-ratio resampling (spec §4.7 backend priority 2).
//!
//! Adapted from the windowed-sinc / Blackman-window FIR design used
//! elsewhere in this workspace for rate conversion, generalized from
//! fixed P/Q pairs to the `src_rate`/`dst_rate` pair a session actually
//! sees, with filter length scaled by [`ResampleQuality`] instead of
//! always using the same default tap count.

use proctap_core::ResampleQuality;
use std::f32::consts::PI;

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn design_lowpass(num_taps: usize, cutoff: f32) -> Vec<f32> {
    if num_taps == 0 {
        return Vec::new();
    }
    let m = num_taps - 1;
    let mut coeffs = Vec::with_capacity(num_taps);
    for n in 0..num_taps {
        let x = n as f32 - m as f32 / 2.0;
        let sinc = if x.abs() < 1e-7 {
            cutoff
        } else {
            (PI * cutoff * x).sin() / (PI * x)
        };
        let window = if m == 0 {
            1.0
        } else {
            let phase = 2.0 * PI * n as f32 / m as f32;
            0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
        };
        coeffs.push(sinc * window);
    }
    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > 1e-10 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }
    coeffs
}

/// Taps-per-phase budget by quality: `best` gets a long filter (sharp
/// transition band, lower aliasing), `medium` a shorter one.
fn taps_per_phase_budget(quality: ResampleQuality) -> usize {
    match quality {
        ResampleQuality::Best => 40,
        ResampleQuality::Medium => 12,
        ResampleQuality::Fast => 4,
    }
}

/// Resamples one complete chunk from `src_rate` to `dst_rate` via polyphase
/// decomposition, for a reduced rational ratio whose denominator (`p` below)
/// is small enough to keep the polyphase filter bank a reasonable size.
///
/// `input` is a single channel's worth of samples (the pipeline calls this
/// once per channel, since the filter is identical across channels but the
/// phase bookkeeping is simplest kept per-channel).
pub fn resample(input: &[f32], src_rate: u32, dst_rate: u32, quality: ResampleQuality) -> Vec<f32> {
    let g = gcd(src_rate as usize, dst_rate as usize);
    let p = (dst_rate as usize) / g; // upsample factor
    let q = (src_rate as usize) / g; // downsample factor

    if p == q {
        return input.to_vec();
    }

    let taps_per_phase = taps_per_phase_budget(quality);
    let num_taps = taps_per_phase * p;
    let cutoff = 0.9 / p.max(q) as f32;
    let prototype = design_lowpass(num_taps, cutoff);

    let mut polyphase = vec![vec![0.0f32; taps_per_phase]; p];
    for (tap_idx, &coeff) in prototype.iter().enumerate() {
        let k = tap_idx % p;
        let i = tap_idx / p;
        polyphase[k][i] = coeff;
    }

    let out_len = (input.len() * p).div_ceil(q);
    let mut output = Vec::with_capacity(out_len);
    for m in 0..out_len {
        let full_idx = m * q;
        let n = full_idx / p;
        let k = full_idx % p;
        let sub_filter = &polyphase[k];
        let mut acc = 0.0f32;
        for (i, &coeff) in sub_filter.iter().enumerate() {
            if n >= i && (n - i) < input.len() {
                acc += coeff * input[n - i];
            }
        }
        output.push(acc * p as f32);
    }
    output
}

/// Whether `src_rate`/`dst_rate`'s reduced ratio has a small enough
/// denominator for the polyphase filter bank to stay a reasonable size.
///
/// Used by the pipeline to decide between polyphase and the FFT-based
/// fallback: a pair like 44100/48000 reduces to 147/160 (fine); a pair with
/// a large or prime denominator would need an impractically large filter
/// bank (one sub-filter per phase).
pub fn ratio_is_polyphase_friendly(src_rate: u32, dst_rate: u32) -> bool {
    let g = gcd(src_rate as usize, dst_rate as usize);
    let p = (dst_rate as usize) / g;
    p <= 2000
}
