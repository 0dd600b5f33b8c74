//! Runtime CPU-feature detection for the sample-format conversion kernels.
//!
//! Detection result is cached in a [`OnceLock`] after the first call, since
//! `is_x86_feature_detected!` itself is cheap but not free, and the
//! conversion kernels run per chunk on the dispatcher thread.

use std::sync::OnceLock;

/// The widest SIMD instruction set this process will use for PCM conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    /// 256-bit integer/float vectors (AVX2).
    Avx2,
    /// 128-bit integer/float vectors (SSE2) — baseline on all x86-64.
    Sse2,
    /// No vector path available; scalar loop only.
    Scalar,
}

fn detect() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("avx2") {
            return SimdLevel::Avx2;
        }
        if std::is_x86_feature_detected!("sse2") {
            return SimdLevel::Sse2;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        // NEON is mandatory on aarch64; treat it as the SSE2-equivalent
        // 128-bit tier rather than adding a third platform-specific level.
        return SimdLevel::Sse2;
    }
    SimdLevel::Scalar
}

/// Returns the SIMD tier to use for conversion kernels, detected once and
/// cached for the lifetime of the process.
pub fn simd_level() -> SimdLevel {
    static LEVEL: OnceLock<SimdLevel> = OnceLock::new();
    *LEVEL.get_or_init(detect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_stable_across_calls() {
        assert_eq!(simd_level(), simd_level());
    }
}
