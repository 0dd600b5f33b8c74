//! High-quality resampling via a dynamically loaded `libsamplerate`-ABI
//! library (spec §4.7 backend priority 1).
//!
//! The library is discovered once, on first use, via `LIBSAMPLERATE_PATH`
//! or a short list of conventional sonames; if discovery or symbol
//! resolution fails the backend is permanently unavailable for the rest of
//! the process (spec: "one-shot atomic initialization ... permanently
//! unavailable"). No `sonido-*` crate links a resampling library this way;
//! this loader is grounded on the general dlopen-discovery idiom the
//! `libloading` crate itself documents, applied to libsamplerate's
//! `src_simple` entry point.

use std::ffi::c_int;
use std::sync::OnceLock;

use libloading::{Library, Symbol};
use proctap_core::ResampleQuality;

const CANDIDATE_NAMES: &[&str] = &[
    "libsamplerate-0.dll",
    "libsamplerate.so.0",
    "libsamplerate.so",
    "libsamplerate.0.dylib",
    "libsamplerate.dylib",
];

// libsamplerate's SRC_DATA, converter-type constants, and `src_simple`
// signature (include/samplerate.h).
#[repr(C)]
struct SrcData {
    data_in: *const f32,
    data_out: *mut f32,
    input_frames: i64,
    output_frames: i64,
    input_frames_used: i64,
    output_frames_gen: i64,
    end_of_input: c_int,
    src_ratio: f64,
}

const SRC_SINC_BEST_QUALITY: c_int = 0;
const SRC_SINC_MEDIUM_QUALITY: c_int = 1;
const SRC_LINEAR: c_int = 4;

type SrcSimpleFn = unsafe extern "C" fn(*mut SrcData, c_int, c_int) -> c_int;

struct Loaded {
    src_simple: Symbol<'static, SrcSimpleFn>,
}

// SAFETY: `src_simple` is a pure computational C function with no internal
// mutable global state documented by libsamplerate; calling it concurrently
// from multiple threads with distinct `SrcData` is supported by the library.
unsafe impl Send for Loaded {}
unsafe impl Sync for Loaded {}

fn discover() -> Option<Loaded> {
    let explicit = std::env::var("LIBSAMPLERATE_PATH").ok();
    let candidates: Vec<&str> = match &explicit {
        Some(path) => vec![path.as_str()],
        None => CANDIDATE_NAMES.to_vec(),
    };

    for name in candidates {
        let Ok(lib) = (unsafe { Library::new(name) }) else {
            continue;
        };
        // Leaked deliberately: this library is discovered once and used for
        // the rest of the process (spec: "permanently unavailable" is the
        // only failure mode, never unloaded on success), so a `'static`
        // handle is the natural shape rather than threading a lifetime
        // through every resample call.
        let leaked: &'static Library = Box::leak(Box::new(lib));
        let Ok(symbol) = (unsafe { leaked.get::<SrcSimpleFn>(b"src_simple\0") }) else {
            continue;
        };
        return Some(Loaded { src_simple: symbol });
    }
    None
}

fn loaded() -> &'static Option<Loaded> {
    static LOADED: OnceLock<Option<Loaded>> = OnceLock::new();
    LOADED.get_or_init(discover)
}

/// Whether a `libsamplerate`-compatible library was found (and is usable)
/// on this process.
pub fn is_available() -> bool {
    loaded().is_some()
}

fn converter_type(quality: ResampleQuality) -> c_int {
    match quality {
        ResampleQuality::Best => SRC_SINC_BEST_QUALITY,
        ResampleQuality::Medium => SRC_SINC_MEDIUM_QUALITY,
        ResampleQuality::Fast => SRC_LINEAR,
    }
}

/// Resamples one complete mono-interleaved chunk via the loaded library.
///
/// `channels` is the interleaved channel count of `input`; `ratio` is
/// `dst_rate / src_rate`. Treats the call as end-of-input (spec: "each
/// invocation is treated as a complete, not streaming, chunk").
///
/// Returns `None` if no library was ever successfully loaded.
pub fn resample(
    input: &[f32],
    channels: u16,
    ratio: f64,
    quality: ResampleQuality,
) -> Option<Vec<f32>> {
    let loaded = loaded().as_ref()?;
    let channels = i64::from(channels);
    let input_frames = input.len() as i64 / channels.max(1);
    let output_frames = ((input_frames as f64) * ratio).ceil() as i64 + 1;
    let mut output = vec![0.0f32; (output_frames * channels) as usize];

    let mut data = SrcData {
        data_in: input.as_ptr(),
        data_out: output.as_mut_ptr(),
        input_frames,
        output_frames,
        input_frames_used: 0,
        output_frames_gen: 0,
        end_of_input: 1,
        src_ratio: ratio,
    };

    // SAFETY: `data` describes valid, correctly sized, non-overlapping
    // input/output slices for the declared frame counts and channel count.
    let result = unsafe { (loaded.src_simple)(&mut data, converter_type(quality), channels as c_int) };
    if result != 0 {
        return None;
    }
    output.truncate((data.output_frames_gen * channels) as usize);
    Some(output)
}
