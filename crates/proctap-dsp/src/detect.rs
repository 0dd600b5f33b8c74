//! Advisory format-detection heuristic (spec §4.7 "Format-detection
//! helper").
//!
//! Used only for diagnostics when a backend's requested and actual formats
//! disagree; never on the data path, since the backend always reports its
//! real native format and the pipeline converts from that, not from a
//! guess.

/// The result of inspecting a buffer's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    /// Interpreting the bytes as `int16` looked consistent.
    Int16,
    /// Interpreting the bytes as `float32` looked consistent.
    Float32,
    /// Neither interpretation looked clearly right.
    Unknown,
}

/// Classifies `bytes` as `int16`, `float32`, or `unknown`.
///
/// Float interpretation is accepted when every sample is finite (no NaN or
/// Inf) and the maximum absolute value is at most `10.0`; int interpretation
/// is accepted when the maximum absolute value is at least `100` (spec:
/// these two thresholds are deliberately non-overlapping so a buffer that
/// looks like neither — e.g. silence — classifies as `Unknown` rather than
/// picking one arbitrarily).
pub fn detect_format(bytes: &[u8]) -> DetectedFormat {
    if bytes.len() >= 4 {
        let floats: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let looks_like_float = !floats.is_empty()
            && floats.iter().all(|f| f.is_finite())
            && floats.iter().fold(0.0f32, |m, f| m.max(f.abs())) <= 10.0;
        if looks_like_float {
            return DetectedFormat::Float32;
        }
    }

    if bytes.len() >= 2 {
        let ints: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let looks_like_int = !ints.is_empty()
            && ints.iter().map(|s| i32::from(*s).unsigned_abs()).max().unwrap_or(0) >= 100;
        if looks_like_int {
            return DetectedFormat::Int16;
        }
    }

    DetectedFormat::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_float_range_detects_as_float32() {
        let samples: Vec<f32> = vec![0.1, -0.5, 0.9, -0.2];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(detect_format(&bytes), DetectedFormat::Float32);
    }

    #[test]
    fn large_magnitude_int16_detects_as_int16() {
        let samples: Vec<i16> = vec![12_000, -20_000, 5_000, -8_000];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(detect_format(&bytes), DetectedFormat::Int16);
    }

    #[test]
    fn nan_or_inf_rules_out_float_interpretation() {
        let samples: Vec<f32> = vec![f32::NAN, 0.0, 0.0, 0.0];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_ne!(detect_format(&bytes), DetectedFormat::Float32);
    }

    #[test]
    fn near_silence_is_unknown() {
        let bytes = vec![0u8; 8];
        assert_eq!(detect_format(&bytes), DetectedFormat::Unknown);
    }
}
