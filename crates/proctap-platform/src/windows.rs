//! Windows backend: WASAPI process-scoped loopback via the `wasapi` crate.
//!
//! Grounded on the reference per-process WASAPI capture module's use of
//! `AudioClient::new_application_loopback_client`, `StreamMode::EventsShared`,
//! and an event-driven pump loop — generalized from that module's hardcoded
//! f32/48kHz/stereo capture to the requested/native format negotiation spec
//! §4.3 describes, and from its own-process EXCLUDE-tree use case to our
//! target-process INCLUDE use case (`new_application_loopback_client(pid,
//! false)`).
//!
//! WASAPI's `IAudioCaptureClient` is not `Send`; every WASAPI call in this
//! module therefore happens on one dedicated thread spawned by `activate`,
//! which also does the pumping, mirroring the reference module's single
//! background-thread design rather than splitting setup and pumping across
//! threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use proctap_core::{CaptureError, CaptureTarget, ErrorKind, Format, SampleFormat};
use proctap_ring::FrameRing;
use proctap_registry::CaptureBackend;

use wasapi::{AudioClient, Direction, StreamMode, WaveFormat};

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 2;

/// Falls back to 48kHz stereo when the caller didn't request a specific
/// rate/channel count — WASAPI's own `autoconvert` makes any choice here
/// cheap, since the engine resamples/remixes to match regardless.
fn negotiated_rate_and_channels(requested: Option<Format>) -> (u32, u16) {
    (
        requested.map_or(DEFAULT_SAMPLE_RATE, |f| f.sample_rate),
        requested.map_or(DEFAULT_CHANNELS, |f| f.channels),
    )
}

/// Process-scoped WASAPI loopback capture.
pub struct WasapiProcessBackend {
    pid: u32,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WasapiProcessBackend {
    fn new(pid: u32, requested: Option<Format>, ring: Arc<FrameRing>) -> Self {
        WasapiProcessBackend {
            pid,
            requested,
            ring,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl CaptureBackend for WasapiProcessBackend {
    fn name(&self) -> &str {
        "wasapi-process-loopback"
    }

    fn activate(&mut self) -> Result<Format, CaptureError> {
        let (tx, rx) = mpsc::channel::<Result<Format, (ErrorKind, String)>>();
        self.running.store(true, Ordering::SeqCst);

        let pid = self.pid;
        let requested = self.requested;
        let ring = Arc::clone(&self.ring);
        let running = Arc::clone(&self.running);

        self.thread = Some(thread::spawn(move || {
            if let Err(reason) = capture_loop(pid, requested, &ring, &running, &tx) {
                let _ = tx.send(Err(reason));
            }
        }));

        match rx.recv_timeout(ACTIVATION_TIMEOUT) {
            Ok(Ok(format)) => Ok(format),
            Ok(Err((kind, reason))) => Err(CaptureError::new(kind, reason)),
            Err(_) => Err(CaptureError::new(
                ErrorKind::BackendTimeout,
                "wasapi activation did not signal readiness in time",
            )),
        }
    }

    fn deactivate(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Classifies a WASAPI call's failure by inspecting its `Display` text for
/// the HRESULTs spec §4.3 step 3 calls out by name: `E_ACCESSDENIED` means
/// the OS refused the capture (`PermissionDenied`), `AUDCLNT_E_DEVICE_
/// INVALIDATED` (or the target process having already exited) means
/// `TargetNotFound`; anything else is `BackendUnavailable`. The `wasapi`
/// crate surfaces HRESULT-derived errors only as formatted strings, so
/// substring matching is the only classification point available.
fn classify_wasapi_error(context: &str, cause: impl std::fmt::Display) -> (ErrorKind, String) {
    let detail = cause.to_string();
    let lower = detail.to_lowercase();
    let kind = if lower.contains("e_accessdenied") || lower.contains("access is denied") {
        ErrorKind::PermissionDenied
    } else if lower.contains("audclnt_e_device_invalidated")
        || lower.contains("device_invalidated")
        || lower.contains("invalid parameter")
            && lower.contains("process")
    {
        ErrorKind::TargetNotFound
    } else {
        ErrorKind::BackendUnavailable
    };
    (kind, format!("wasapi: {context}: {detail}"))
}

/// Runs on the dedicated WASAPI thread: COM init, client activation, format
/// negotiation, and the event-driven pump loop, all confined to this thread
/// since `IAudioCaptureClient` is `!Send`.
fn capture_loop(
    pid: u32,
    requested: Option<Format>,
    ring: &FrameRing,
    running: &AtomicBool,
    ready: &mpsc::Sender<Result<Format, (ErrorKind, String)>>,
) -> Result<(), (ErrorKind, String)> {
    wasapi::initialize_mta()
        .ok()
        .map_err(|e| classify_wasapi_error("COM initialization failed", e))?;

    // `false` = INCLUDE the target process tree, the opposite of the
    // reference module's own-process EXCLUDE use case.
    let mut client = AudioClient::new_application_loopback_client(pid, false)
        .map_err(|e| classify_wasapi_error(&format!("loopback client creation failed for pid {pid}"), e))?;

    let (sample_rate, channels) = negotiated_rate_and_channels(requested);
    let desired = WaveFormat::new(32, 32, &wasapi::SampleType::Float, sample_rate as usize, channels as usize, None);
    let frame_size = desired.get_blockalign() as usize;

    let mode = StreamMode::EventsShared {
        autoconvert: true,
        buffer_duration_hns: 0,
    };
    client
        .initialize_client(&desired, &Direction::Capture, &mode)
        .map_err(|e| classify_wasapi_error("client initialization failed", e))?;

    let event_handle = client
        .set_get_eventhandle()
        .map_err(|e| classify_wasapi_error("failed to obtain event handle", e))?;
    let capture_client = client
        .get_audiocaptureclient()
        .map_err(|e| classify_wasapi_error("failed to obtain capture client", e))?;

    client
        .start_stream()
        .map_err(|e| classify_wasapi_error("failed to start stream", e))?;

    // Autoconvert always normalizes shared-mode WASAPI output to float32,
    // regardless of what `requested` asked for.
    let native_format = Format {
        sample_rate,
        channels,
        sample_format: SampleFormat::Float32,
    };
    ring.set_frame_size(frame_size);
    let _ = ready.send(Ok(native_format));

    let mut sample_queue: std::collections::VecDeque<u8> = std::collections::VecDeque::new();
    let mut flat = Vec::new();
    'outer: while running.load(Ordering::SeqCst) {
        if event_handle.wait_for_event(100).is_err() {
            continue;
        }

        loop {
            match capture_client.get_next_packet_size() {
                Ok(Some(0)) | Ok(None) => break,
                Ok(Some(_frames)) => {
                    if let Err(e) = capture_client.read_from_device_to_deque(&mut sample_queue) {
                        tracing::warn!(error = %e, "wasapi: device read failed, ending capture");
                        break 'outer;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "wasapi: packet size query failed, ending capture");
                    break 'outer;
                }
            }
        }

        if !sample_queue.is_empty() {
            flat.clear();
            flat.extend(sample_queue.drain(..));
            ring.write(&flat);
        }
    }

    client.stop_stream().ok();
    ring.close();
    Ok(())
}

/// Builds a [`WasapiProcessBackend`] for a process-id target.
///
/// Rejects anything but [`CaptureTarget::ProcessId`] — WASAPI has no notion
/// of a bundle id.
pub fn construct(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
    let pid = target.process_id().ok_or_else(|| {
        (
            ErrorKind::BackendUnavailable,
            "wasapi: target is not a process id".to_string(),
        )
    })?;
    Ok(Box::new(WasapiProcessBackend::new(pid, requested, ring)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_falls_back_to_defaults() {
        assert_eq!(
            negotiated_rate_and_channels(None),
            (DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS)
        );
    }

    #[test]
    fn negotiation_honors_requested_values() {
        let requested = Format {
            sample_rate: 44_100,
            channels: 1,
            sample_format: SampleFormat::Int16,
        };
        assert_eq!(negotiated_rate_and_channels(Some(requested)), (44_100, 1));
    }
}
