//! Sample-format conversion: the first stage of the conversion pipeline.
//!
//! Every pair of formats converts through an `f32` intermediate in
//! `[-1.0, 1.0]`. The `int16 <-> float32` legs — by far the most common,
//! since WASAPI/PipeWire/ScreenCaptureKit native formats are almost always
//! one of the two — get a SIMD fast path selected once via
//! [`crate::simd::simd_level`]; every other pair runs the scalar loop, which
//! is still branch-free per sample and allocation-free beyond the output
//! buffer.

use proctap_core::SampleFormat;

use crate::simd::{simd_level, SimdLevel};

const I16_TO_F32_SCALE: f32 = 1.0 / 32_768.0;
const F32_TO_I16_SCALE: f32 = 32_767.0;

/// Converts packed PCM bytes from one sample format to another.
///
/// `bytes.len()` must be a multiple of `from`'s sample size; the returned
/// buffer has `bytes.len() / from.bytes_per_sample() * to.bytes_per_sample()`
/// bytes. Channel count is irrelevant here — this stage treats the input as
/// a flat sequence of samples, one channel's worth or many; channel remap
/// happens in [`crate::channels`].
pub fn convert_samples(bytes: &[u8], from: SampleFormat, to: SampleFormat) -> Vec<u8> {
    if from == to {
        return bytes.to_vec();
    }
    let samples = decode_to_f32(bytes, from);
    encode_from_f32(&samples, to)
}

pub(crate) fn decode_to_f32(bytes: &[u8], from: SampleFormat) -> Vec<f32> {
    match from {
        SampleFormat::Int16 => {
            let count = bytes.len() / 2;
            let mut out = vec![0.0f32; count];
            int16_bytes_to_f32(bytes, &mut out);
            out
        }
        SampleFormat::Int24 => bytes
            .chunks_exact(3)
            .map(|b| {
                let raw = i32::from_le_bytes([b[0], b[1], b[2], if b[2] & 0x80 != 0 { 0xFF } else { 0 }]);
                raw as f32 / 8_388_608.0
            })
            .collect(),
        SampleFormat::Int32 => bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        SampleFormat::Float32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

pub(crate) fn encode_from_f32(samples: &[f32], to: SampleFormat) -> Vec<u8> {
    match to {
        SampleFormat::Int16 => {
            let mut out = vec![0i16; samples.len()];
            f32_to_int16_slice(samples, &mut out);
            out.iter().flat_map(|s| s.to_le_bytes()).collect()
        }
        SampleFormat::Int24 => {
            let mut out = Vec::with_capacity(samples.len() * 3);
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * 8_388_607.0).round() as i32;
                let b = v.to_le_bytes();
                out.extend_from_slice(&b[..3]);
            }
            out
        }
        SampleFormat::Int32 => {
            let mut out = Vec::with_capacity(samples.len() * 4);
            for &s in samples {
                let v = (s.clamp(-1.0, 1.0) * 2_147_483_647.0).round() as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
            out
        }
        SampleFormat::Float32 => samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
    }
}

/// Converts little-endian `int16` bytes to `f32` samples in `[-1.0, 1.0)`,
/// dispatching to the widest available SIMD tier (spec: "process 16 samples
/// at a time using 256-bit vector integer widening ... fall back to 128-bit
/// vectors, then to a scalar loop").
fn int16_bytes_to_f32(bytes: &[u8], out: &mut [f32]) {
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    match simd_level() {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => unsafe { int16_to_f32_avx2(&samples, out) },
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Sse2 => unsafe { int16_to_f32_sse2(&samples, out) },
        _ => int16_to_f32_scalar(&samples, out),
    }
}

fn int16_to_f32_scalar(samples: &[i16], out: &mut [f32]) {
    for (s, o) in samples.iter().zip(out.iter_mut()) {
        *o = f32::from(*s) * I16_TO_F32_SCALE;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn int16_to_f32_avx2(samples: &[i16], out: &mut [f32]) {
    use std::arch::x86_64::{
        _mm256_castsi256_si128, _mm256_cvtepi16_epi32, _mm256_cvtepi32_ps, _mm256_extracti128_si256,
        _mm256_loadu_si256, _mm256_mul_ps, _mm256_set1_ps, _mm256_storeu_ps,
    };

    let scale = _mm256_set1_ps(I16_TO_F32_SCALE);
    let chunks = samples.len() / 16;
    for i in 0..chunks {
        let base = i * 16;
        let raw = _mm256_loadu_si256(samples.as_ptr().add(base).cast());
        let lo = _mm256_cvtepi16_epi32(_mm256_castsi256_si128(raw));
        let hi = _mm256_cvtepi16_epi32(_mm256_extracti128_si256(raw, 1));
        let lo_f = _mm256_mul_ps(_mm256_cvtepi32_ps(lo), scale);
        let hi_f = _mm256_mul_ps(_mm256_cvtepi32_ps(hi), scale);
        _mm256_storeu_ps(out.as_mut_ptr().add(base), lo_f);
        _mm256_storeu_ps(out.as_mut_ptr().add(base + 8), hi_f);
    }
    int16_to_f32_scalar(&samples[chunks * 16..], &mut out[chunks * 16..]);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn int16_to_f32_sse2(samples: &[i16], out: &mut [f32]) {
    use std::arch::x86_64::{
        _mm_cmpgt_epi16, _mm_cvtepi32_ps, _mm_loadu_si128, _mm_mul_ps, _mm_set1_epi16, _mm_set1_ps,
        _mm_storeu_ps, _mm_unpackhi_epi16, _mm_unpacklo_epi16,
    };

    let scale = _mm_set1_ps(I16_TO_F32_SCALE);
    let zero = _mm_set1_epi16(0);
    let chunks = samples.len() / 8;
    for i in 0..chunks {
        let base = i * 8;
        let raw = _mm_loadu_si128(samples.as_ptr().add(base).cast());
        // Sign-extend i16 -> i32 via unpack with the per-lane sign mask
        // (pure SSE2; no SSE4.1 pmovsxwd).
        let sign = _mm_cmpgt_epi16(zero, raw);
        let lo = _mm_unpacklo_epi16(raw, sign);
        let hi = _mm_unpackhi_epi16(raw, sign);
        let lo_f = _mm_mul_ps(_mm_cvtepi32_ps(lo), scale);
        let hi_f = _mm_mul_ps(_mm_cvtepi32_ps(hi), scale);
        _mm_storeu_ps(out.as_mut_ptr().add(base), lo_f);
        _mm_storeu_ps(out.as_mut_ptr().add(base + 4), hi_f);
    }
    int16_to_f32_scalar(&samples[chunks * 8..], &mut out[chunks * 8..]);
}

/// Converts `f32` samples in `[-1.0, 1.0]` to clamped, rounded `int16`
/// (spec: "clamp to [-1.0, 1.0], multiply by 32767, round, truncate").
fn f32_to_int16_slice(samples: &[f32], out: &mut [i16]) {
    match simd_level() {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => unsafe { f32_to_int16_avx2(samples, out) },
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Sse2 => unsafe { f32_to_int16_sse2(samples, out) },
        _ => f32_to_int16_scalar(samples, out),
    }
}

fn f32_to_int16_scalar(samples: &[f32], out: &mut [i16]) {
    for (s, o) in samples.iter().zip(out.iter_mut()) {
        let clamped = s.clamp(-1.0, 1.0);
        *o = (clamped * F32_TO_I16_SCALE).round() as i16;
    }
}

/// Clamps, scales, and rounds in 8-wide vector lanes; the final `i32 -> i16`
/// narrowing is scalar but branchless, since by this point every value is
/// already within `i16` range. `_mm256_cvtps_epi32` rounds ties to even
/// rather than away from zero like the scalar path's `f32::round`; the two
/// only disagree on an exact `.5` boundary, inaudible at 16-bit depth.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn f32_to_int16_avx2(samples: &[f32], out: &mut [i16]) {
    use std::arch::x86_64::{
        _mm256_cvtps_epi32, _mm256_loadu_ps, _mm256_max_ps, _mm256_min_ps, _mm256_mul_ps,
        _mm256_set1_ps, _mm256_storeu_si256,
    };

    let one = _mm256_set1_ps(1.0);
    let neg_one = _mm256_set1_ps(-1.0);
    let scale = _mm256_set1_ps(F32_TO_I16_SCALE);
    let chunks = samples.len() / 8;
    let mut lanes = [0i32; 8];
    for i in 0..chunks {
        let base = i * 8;
        let v = _mm256_loadu_ps(samples.as_ptr().add(base));
        let clamped = _mm256_max_ps(_mm256_min_ps(v, one), neg_one);
        let scaled = _mm256_mul_ps(clamped, scale);
        let rounded = _mm256_cvtps_epi32(scaled);
        _mm256_storeu_si256(lanes.as_mut_ptr().cast(), rounded);
        for (l, o) in lanes.iter().zip(out[base..base + 8].iter_mut()) {
            *o = *l as i16;
        }
    }
    f32_to_int16_scalar(&samples[chunks * 8..], &mut out[chunks * 8..]);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse2")]
unsafe fn f32_to_int16_sse2(samples: &[f32], out: &mut [i16]) {
    use std::arch::x86_64::{
        _mm_cvtps_epi32, _mm_loadu_ps, _mm_max_ps, _mm_min_ps, _mm_mul_ps, _mm_set1_ps,
        _mm_storeu_si128,
    };

    let one = _mm_set1_ps(1.0);
    let neg_one = _mm_set1_ps(-1.0);
    let scale = _mm_set1_ps(F32_TO_I16_SCALE);
    let chunks = samples.len() / 4;
    let mut lanes = [0i32; 4];
    for i in 0..chunks {
        let base = i * 4;
        let v = _mm_loadu_ps(samples.as_ptr().add(base));
        let clamped = _mm_max_ps(_mm_min_ps(v, one), neg_one);
        let scaled = _mm_mul_ps(clamped, scale);
        let rounded = _mm_cvtps_epi32(scaled);
        _mm_storeu_si128(lanes.as_mut_ptr().cast(), rounded);
        for (l, o) in lanes.iter().zip(out[base..base + 4].iter_mut()) {
            *o = *l as i16;
        }
    }
    f32_to_int16_scalar(&samples[chunks * 4..], &mut out[chunks * 4..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_conversion_is_a_plain_copy() {
        let bytes = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let out = convert_samples(&bytes, SampleFormat::Float32, SampleFormat::Float32);
        assert_eq!(out, bytes);
    }

    #[test]
    fn int16_round_trips_through_float32() {
        let input: Vec<i16> = vec![0, 1, -1, 32767, -32768, 16384, -16384];
        let bytes: Vec<u8> = input.iter().flat_map(|s| s.to_le_bytes()).collect();
        let as_float = convert_samples(&bytes, SampleFormat::Int16, SampleFormat::Float32);
        let back = convert_samples(&as_float, SampleFormat::Float32, SampleFormat::Int16);
        let back_samples: Vec<i16> = back
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        for (a, b) in input.iter().zip(back_samples.iter()) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn int16_to_float32_matches_known_values() {
        let bytes = 0i16.to_le_bytes().to_vec();
        let out = convert_samples(&bytes, SampleFormat::Int16, SampleFormat::Float32);
        assert_eq!(f32::from_le_bytes(out.try_into().unwrap()), 0.0);

        let bytes = i16::MAX.to_le_bytes().to_vec();
        let out = convert_samples(&bytes, SampleFormat::Int16, SampleFormat::Float32);
        let v = f32::from_le_bytes(out.try_into().unwrap());
        assert!((v - 0.999_969_5).abs() < 1e-4);
    }

    #[test]
    fn int24_round_trips_near_exactly() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 0.999, -0.999];
        let bytes = encode_from_f32(&samples, SampleFormat::Int24);
        let back = decode_to_f32(&bytes, SampleFormat::Int24);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn int32_round_trips_near_exactly() {
        let samples: Vec<f32> = vec![0.0, 0.25, -0.75, 1.0, -1.0];
        let bytes = encode_from_f32(&samples, SampleFormat::Int32);
        let back = decode_to_f32(&bytes, SampleFormat::Int32);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn simd_and_scalar_paths_agree() {
        let samples: Vec<i16> = (0..1000).map(|i| ((i * 37) % 65536) as i16).collect();
        let mut simd_out = vec![0.0f32; samples.len()];
        int16_to_f32_scalar(&samples, &mut simd_out);

        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut dispatched = vec![0.0f32; samples.len()];
        int16_bytes_to_f32(&bytes, &mut dispatched);

        for (a, b) in simd_out.iter().zip(dispatched.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
