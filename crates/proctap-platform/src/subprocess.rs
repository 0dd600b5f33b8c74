//! Shared machinery for backends that receive PCM over a child process's
//! stdout.
//!
//! Both the Linux `pw-record`/`parec` fallback strategies (spec §4.4,
//! strategies 2 and 3) and the macOS ScreenCaptureKit helper (spec §4.5)
//! bridge a child process's stdout to the ring the same way: spawn, read
//! raw interleaved PCM off stdout on a dedicated thread, write whole frames
//! into the ring, close the ring when the child's stdout ends.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use proctap_core::{CaptureError, ErrorKind};
use proctap_ring::FrameRing;

/// A child process whose stdout is bridged to a [`FrameRing`] on a
/// dedicated reader thread, for the lifetime of the backend.
///
/// Stderr is drained on its own thread into a buffer `health_check` can
/// quote, and an unexpected exit (detected by polling `try_wait`, never a
/// blocking `wait`, so it never races `stop`'s own kill+wait) is reported
/// back as a [`CaptureError`] rather than silently starving the ring.
pub struct PipedChildBackend {
    label: String,
    command: Option<Command>,
    child: Option<Child>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    stderr_reader: Option<JoinHandle<()>>,
    stderr: Arc<Mutex<String>>,
    frame_size: usize,
    ring: Arc<FrameRing>,
}

impl PipedChildBackend {
    pub fn new(label: impl Into<String>, command: Command, frame_size: usize, ring: Arc<FrameRing>) -> Self {
        PipedChildBackend {
            label: label.into(),
            command: Some(command),
            child: None,
            running: Arc::new(AtomicBool::new(false)),
            reader: None,
            stderr_reader: None,
            stderr: Arc::new(Mutex::new(String::new())),
            frame_size,
            ring,
        }
    }

    /// Spawns the child, wiring its stdout to a reader thread and its
    /// stderr to a separate collector thread.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same backend.
    pub fn spawn(&mut self) -> Result<(), CaptureError> {
        let mut command = self.command.take().expect("spawn called twice");
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            CaptureError::new(
                ErrorKind::BackendUnavailable,
                format!("{}: failed to spawn: {e}", self.label),
            )
            .with_source(e)
        })?;

        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut stderr = child.stderr.take().expect("stderr was piped");
        self.ring.set_frame_size(self.frame_size);
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let ring = Arc::clone(&self.ring);
        let frame_size = self.frame_size;
        let label = self.label.clone();

        self.reader = Some(thread::spawn(move || {
            let mut buf = vec![0u8; frame_size.max(1) * 256];
            while running.load(Ordering::SeqCst) {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let whole = (n / frame_size) * frame_size;
                        if whole > 0 {
                            ring.write(&buf[..whole]);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(backend = %label, error = %e, "stdout read failed, ending capture");
                        break;
                    }
                }
            }
            ring.close();
        }));

        let stderr_buf = Arc::clone(&self.stderr);
        self.stderr_reader = Some(thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            *stderr_buf
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = text;
        }));

        self.child = Some(child);
        Ok(())
    }

    /// Non-blocking check for the child having exited on its own, between
    /// `spawn` and `stop`.
    ///
    /// Uses `try_wait` rather than `wait` so it never blocks the caller and
    /// never contends with `stop`, which takes ownership of `self.child`
    /// directly to kill it. Returns `None` while the child is alive, not
    /// yet spawned, or already stopped intentionally via [`Self::stop`].
    pub fn health_check(&mut self) -> Option<CaptureError> {
        if !self.running.load(Ordering::SeqCst) {
            return None;
        }
        let status = match self.child.as_mut()?.try_wait() {
            Ok(Some(status)) => status,
            _ => return None,
        };
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.stderr_reader.take() {
            let _ = handle.join();
        }
        let detail = self
            .stderr
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .trim()
            .to_string();

        Some(CaptureError::new(
            ErrorKind::BackendLost,
            if detail.is_empty() {
                format!("{}: exited unexpectedly with {status}", self.label)
            } else {
                format!("{}: exited unexpectedly with {status}: {detail}", self.label)
            },
        ))
    }

    /// Kills the child (if still alive) and joins the reader threads.
    ///
    /// Idempotent: safe to call before `spawn` or more than once.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stderr_reader.take() {
            let _ = handle.join();
        }
    }
}
