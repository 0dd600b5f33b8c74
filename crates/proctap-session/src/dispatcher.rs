//! The per-session worker thread that fans captured bytes out to a push
//! callback, when one is registered (spec §4.6 "Dispatcher").
//!
//! When no callback is registered, this thread does nothing to the ring at
//! all — `Session::read`/`stream` drain it directly using the ring's own
//! `wait`/`read_available`, and `FrameRing::close` already wakes a blocked
//! reader on `stop`. The dispatcher only needs to exist so a callback
//! installed after `start()` (spec: "takes effect at the next chunk
//! boundary") has somewhere to run without the caller spinning up its own
//! thread.

use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use proctap_core::{CaptureError, Format};

use crate::{invoke_callback, Shared};

/// How long the dispatcher waits on the ring between polls while a callback
/// is registered.
const RING_POLL: Duration = Duration::from_millis(100);

/// How long the dispatcher sleeps between checks while no callback is
/// registered, so it notices a late `set_callback` or `stop` promptly
/// without busy-spinning.
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Target chunk size delivered to a callback: 10ms of native-format audio
/// (spec §4.6 "default 10 ms of audio").
const TARGET_CHUNK_MS: u64 = 10;

pub(crate) fn spawn(shared: Arc<Shared>, done: mpsc::Sender<()>) -> JoinHandle<()> {
    thread::Builder::new()
        .name("proctap-dispatcher".into())
        .spawn(move || run(shared, done))
        .expect("failed to spawn proctap dispatcher thread")
}

fn target_chunk_bytes(format: Format) -> usize {
    let frames_per_chunk = (format.sample_rate as u64 * TARGET_CHUNK_MS / 1000).max(1);
    (frames_per_chunk as usize * format.frame_size()).max(format.frame_size())
}

/// Non-blocking poll of the active backend for an asynchronous failure (a
/// helper process dying, a native stream erroring out), since the backend
/// has no other channel back to the session once `activate` returns.
fn backend_health(shared: &Shared) -> Option<CaptureError> {
    shared
        .backend
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .as_mut()?
        .health_check()
}

fn run(shared: Arc<Shared>, done: mpsc::Sender<()>) {
    let native_format = shared
        .native_format
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .expect("native format set before the dispatcher starts");
    let effective_format = shared
        .effective_format
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .expect("effective format set before the dispatcher starts");
    let chunk_bytes = target_chunk_bytes(native_format);

    loop {
        if let Some(err) = backend_health(&shared) {
            shared.record_failure(err);
            drain_once(&shared, chunk_bytes, native_format, effective_format);
            break;
        }

        if shared.stop_requested.load(Ordering::Acquire) {
            drain_once(&shared, chunk_bytes, native_format, effective_format);
            break;
        }

        let has_callback = shared
            .callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some();
        if !has_callback {
            thread::sleep(IDLE_POLL);
            continue;
        }

        if !shared.ring.wait(RING_POLL) {
            continue;
        }

        deliver_chunk(&shared, chunk_bytes, native_format, effective_format);
    }

    let _ = done.send(());
}

/// Drains and converts up to `chunk_bytes` from the ring and invokes the
/// callback if one is still registered. No-op if the ring is currently
/// empty or no callback is set.
fn deliver_chunk(shared: &Shared, chunk_bytes: usize, native_format: Format, effective_format: Format) {
    let raw = shared.ring.read_available(chunk_bytes);
    if raw.is_empty() {
        return;
    }
    let mut guard = shared
        .callback
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let Some(cb) = guard.as_mut() else {
        return;
    };
    let bytes = convert(shared, raw, native_format, effective_format);
    let frame_count = bytes.len() / effective_format.frame_size();
    invoke_callback(cb, &bytes, frame_count);
}

/// On shutdown, delivers whatever is left in the ring exactly once, then
/// stops — (spec §4.6: "drains remaining data (deliverable once, then
/// discarded)").
fn drain_once(shared: &Shared, chunk_bytes: usize, native_format: Format, effective_format: Format) {
    loop {
        let raw = shared.ring.read_available(chunk_bytes);
        if raw.is_empty() {
            return;
        }
        let mut guard = shared
            .callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(cb) = guard.as_mut() else {
            return;
        };
        let bytes = convert(shared, raw, native_format, effective_format);
        let frame_count = bytes.len() / effective_format.frame_size();
        invoke_callback(cb, &bytes, frame_count);
    }
}

fn convert(shared: &Shared, raw: Vec<u8>, native_format: Format, effective_format: Format) -> Vec<u8> {
    if native_format == effective_format {
        return raw;
    }
    match proctap_dsp::convert_chunk(raw, native_format, effective_format, shared.quality) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "dispatcher conversion failed, dropping chunk");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_chunk_bytes_is_ten_milliseconds_of_audio() {
        let format = Format {
            sample_rate: 48_000,
            channels: 2,
            sample_format: proctap_core::SampleFormat::Float32,
        };
        // 480 frames * 8 bytes/frame.
        assert_eq!(target_chunk_bytes(format), 480 * 8);
    }

    #[test]
    fn target_chunk_bytes_never_rounds_to_zero() {
        let format = Format {
            sample_rate: 1,
            channels: 1,
            sample_format: proctap_core::SampleFormat::Int16,
        };
        assert!(target_chunk_bytes(format) >= format.frame_size());
    }
}
