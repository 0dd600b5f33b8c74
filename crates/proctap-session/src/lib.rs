//! The capture façade: `Session`, the single public entry point a caller
//! uses to open, start, read from, and tear down a per-process capture
//! (spec §4.1).
//!
//! A `Session` owns exactly one backend instance, one ring buffer, and one
//! dispatcher thread (spec §3 "Ownership"). State transitions are
//! serialized under a `std::sync::Mutex<SessionState>` that is never held
//! while an OS audio API blocks or a user callback runs — the same
//! `Arc<AtomicBool> running` discipline `sonido_io::stream::AudioStream`
//! uses for its own start/stop flag, generalized here to a full state enum
//! since a capture session has more than two states.

mod dispatcher;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub use proctap_core::{
    CaptureError, CaptureTarget, Chunk, ErrorKind, Format, ResampleQuality, SampleFormat,
    SessionState,
};
use proctap_ring::FrameRing;
use proctap_registry::{BackendStrategy, CaptureBackend};

/// A push-delivery callback: receives one chunk's raw interleaved bytes and
/// its frame count, in the session's *effective* format (native format if
/// no conversion was requested, else the requested format).
///
/// A panic inside a callback is caught and logged; it never stops capture
/// and never propagates to a `read`/`stream` consumer (spec §4.1).
pub type CaptureCallback = Box<dyn FnMut(&[u8], usize) + Send + 'static>;

/// Default ring capacity: ≈4 MiB, roughly 20s at 48kHz stereo float32
/// (spec §3 "Ring buffer").
const DEFAULT_RING_CAPACITY: usize = 4 * 1024 * 1024;

/// Bound on how long `stop`/`close` wait for the dispatcher thread to
/// acknowledge shutdown before detaching it (spec §4.1 "target: ≤500 ms").
const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on a single `read`'s drain from the ring, so one call can't
/// be made arbitrarily slow by a backlog that built up while nobody was
/// reading.
const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Poll interval used by [`Session::stream`] while the ring is empty and
/// the session is still running.
const STREAM_POLL: Duration = Duration::from_millis(200);

/// Options accepted by [`open`], beyond the capture target itself.
///
/// Mirrors spec §4.1's `open(target, requested_config, callback,
/// capacity_hint)` argument list, plus a resampling quality hint (spec
/// §4.7) folded in here rather than added as a fifth positional argument.
#[derive(Default)]
pub struct OpenOptions {
    /// Desired output format. `None` adopts the backend's native format and
    /// bypasses the conversion pipeline entirely.
    pub requested_format: Option<Format>,
    /// Push-delivery callback, if the caller wants one from the start.
    /// Can also be installed or cleared later via [`Session::set_callback`].
    pub callback: Option<CaptureCallback>,
    /// Ring buffer capacity override, in bytes. Defaults to
    /// [`DEFAULT_RING_CAPACITY`].
    pub capacity_hint: Option<usize>,
    /// Resample quality hint, used only when resampling actually runs.
    pub quality: ResampleQuality,
}

/// Diagnostic snapshot exposed alongside the stable public surface (spec
/// §4.4 "successful strategy choice is observable via a diagnostic field").
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Name of the backend strategy that activated, if `start` succeeded.
    pub strategy: Option<String>,
    /// Frames dropped by the ring buffer due to overflow, cumulative.
    pub dropped_frames: u64,
    /// The kind of the most recent failure, if any occurred.
    pub last_error: Option<ErrorKind>,
}

struct Shared {
    target: CaptureTarget,
    requested_format: Option<Format>,
    quality: ResampleQuality,
    strategies: Vec<BackendStrategy>,
    ring: Arc<FrameRing>,

    state: Mutex<SessionState>,
    closed: AtomicBool,
    backend: Mutex<Option<Box<dyn CaptureBackend>>>,
    native_format: Mutex<Option<Format>>,
    effective_format: Mutex<Option<Format>>,
    strategy_name: Mutex<Option<String>>,
    last_error: Mutex<Option<ErrorKind>>,

    callback: Arc<Mutex<Option<CaptureCallback>>>,
    stop_requested: Arc<AtomicBool>,
    dispatcher: Mutex<Option<DispatcherHandle>>,
}

struct DispatcherHandle {
    handle: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

impl Shared {
    /// Transitions the session to `Failed`, tearing down the backend the
    /// same way `stop_inner` does (minus joining the dispatcher's own
    /// thread, since this runs on that thread).
    ///
    /// Called by the dispatcher when [`CaptureBackend::health_check`]
    /// reports an asynchronous fault — a helper process dying mid-capture,
    /// for instance (spec §4.5 step 6 / §8 scenario 6).
    fn record_failure(&self, err: CaptureError) {
        let kind = err.kind();
        {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.is_terminal() {
                return;
            }
            *state = SessionState::Failed(kind);
        }

        *self
            .last_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(kind);
        self.stop_requested.store(true, Ordering::SeqCst);
        self.ring.close();

        if let Some(mut backend) = self
            .backend
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            backend.deactivate();
        }

        tracing::warn!(?kind, detail = %err.detail(), "capture backend failed asynchronously");
    }
}

/// Constructs a session for `target` without starting any audio activity
/// (spec §4.1 `open`).
///
/// Validates the target generically (`InvalidTarget` on `pid = 0` or a
/// blank bundle id); per-OS validation (no such process, unsupported OS,
/// permission denied) only happens once [`Session::start`] actually probes
/// a backend, since that's the earliest point real OS calls are made.
pub fn open(target: CaptureTarget, options: OpenOptions) -> Result<Session, CaptureError> {
    open_impl(target, options, proctap_platform::strategies())
}

fn open_impl(
    target: CaptureTarget,
    options: OpenOptions,
    strategies: Vec<BackendStrategy>,
) -> Result<Session, CaptureError> {
    if !target.is_valid() {
        return Err(CaptureError::new(
            ErrorKind::InvalidTarget,
            format!("invalid capture target: {target:?}"),
        ));
    }

    let capacity = options.capacity_hint.unwrap_or(DEFAULT_RING_CAPACITY);
    let shared = Shared {
        target,
        requested_format: options.requested_format,
        quality: options.quality,
        strategies,
        ring: Arc::new(FrameRing::new(capacity)),
        state: Mutex::new(SessionState::Created),
        closed: AtomicBool::new(false),
        backend: Mutex::new(None),
        native_format: Mutex::new(None),
        effective_format: Mutex::new(None),
        strategy_name: Mutex::new(None),
        last_error: Mutex::new(None),
        callback: Arc::new(Mutex::new(options.callback)),
        stop_requested: Arc::new(AtomicBool::new(false)),
        dispatcher: Mutex::new(None),
    };

    Ok(Session {
        shared: Arc::new(shared),
    })
}

/// A live or not-yet-started per-process capture.
///
/// Not `Clone`: a session is owned by exactly one caller (spec §3 "a
/// session is not shareable across processes"). Dropping a session that was
/// never explicitly closed runs [`close`](Session::close) on its behalf, so
/// teardown is never accidentally skipped.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    fn ensure_not_closed(&self) -> Result<(), CaptureError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(CaptureError::new(
                ErrorKind::SessionClosed,
                "session is closed",
            ));
        }
        Ok(())
    }

    fn fail(&self, kind: ErrorKind) {
        *self.shared.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
            SessionState::Failed(kind);
        *self
            .shared
            .last_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(kind);
    }

    /// Initializes the backend, acquires OS resources, and spawns the
    /// dispatcher thread (spec §4.1 `start`: `Created → Starting →
    /// Running`).
    ///
    /// On any failure, resources already acquired are released and the
    /// session becomes `Failed`; the error is also returned synchronously.
    pub fn start(&self) -> Result<(), CaptureError> {
        self.ensure_not_closed()?;

        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.can_transition_to(&SessionState::Starting) {
                return Err(CaptureError::new(
                    ErrorKind::Internal,
                    format!("cannot start a session in state {state:?}"),
                ));
            }
            *state = SessionState::Starting;
        }

        let mut backend = match proctap_registry::open(
            &self.shared.target,
            self.shared.requested_format,
            Arc::clone(&self.shared.ring),
            &self.shared.strategies,
        ) {
            Ok(backend) => backend,
            Err(e) => {
                self.fail(e.kind());
                return Err(e);
            }
        };

        let native_format = match backend.activate() {
            Ok(format) => format,
            Err(e) => {
                backend.deactivate();
                self.fail(e.kind());
                return Err(e);
            }
        };

        self.shared.ring.set_frame_size(native_format.frame_size());
        let effective_format = self.shared.requested_format.unwrap_or(native_format);

        *self
            .shared
            .native_format
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(native_format);
        *self
            .shared
            .effective_format
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(effective_format);
        *self
            .shared
            .strategy_name
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(backend.name().to_string());
        *self
            .shared
            .backend
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(backend);

        self.shared.stop_requested.store(false, Ordering::SeqCst);

        let (done_tx, done_rx) = mpsc::channel();
        let handle = dispatcher::spawn(Arc::clone(&self.shared), done_tx);
        *self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(DispatcherHandle {
            handle,
            done_rx,
        });

        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = SessionState::Running;
        Ok(())
    }

    /// Idempotent. Drains and tears down within a bounded time regardless
    /// of OS-side state (spec §4.1 `stop`).
    pub fn stop(&self) -> Result<(), CaptureError> {
        self.ensure_not_closed()?;
        self.stop_inner();
        Ok(())
    }

    fn stop_inner(&self) {
        {
            let mut state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            match &*state {
                SessionState::Stopped | SessionState::Failed(_) => return,
                SessionState::Created => {
                    *state = SessionState::Stopped;
                    return;
                }
                _ => *state = SessionState::Stopping,
            }
        }

        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.shared.ring.close();

        if let Some(mut backend) = self
            .shared
            .backend
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            backend.deactivate();
        }

        if let Some(dispatcher) = self
            .shared
            .dispatcher
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            match dispatcher.done_rx.recv_timeout(STOP_TIMEOUT) {
                Ok(()) => {
                    let _ = dispatcher.handle.join();
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = STOP_TIMEOUT.as_millis() as u64,
                        "dispatcher did not acknowledge shutdown in time, detaching"
                    );
                }
            }
        }

        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = SessionState::Stopped;
    }

    /// Calls [`stop`](Session::stop) if necessary, then marks the session
    /// unusable. Idempotent; further operations return `SessionClosed`
    /// (spec §4.1 `close`).
    pub fn close(&self) -> Result<(), CaptureError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_inner();
        Ok(())
    }

    /// Blocks up to `timeout` for at least one frame, returning `None` on
    /// timeout or an empty drain, `Err(SessionStopped)` if the session is
    /// no longer `Starting`/`Running` (spec §4.1 `read`).
    ///
    /// Always returns `Ok(None)` while a callback is registered — chunks
    /// delivered to a callback are never also enqueued for `read` (spec
    /// §4.1 "dual delivery contract").
    pub fn read(&self, timeout: Duration) -> Result<Option<Chunk>, CaptureError> {
        self.ensure_not_closed()?;

        if self
            .shared
            .callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
        {
            return Ok(None);
        }

        {
            let state = self
                .shared
                .state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if !state.accepts_reads() {
                return Err(CaptureError::new(
                    ErrorKind::SessionStopped,
                    format!("session is not accepting reads in state {state:?}"),
                ));
            }
        }

        if !self.shared.ring.wait(timeout) {
            return Ok(None);
        }

        let raw = self.shared.ring.read_available(READ_CHUNK_BYTES);
        if raw.is_empty() {
            return Ok(None);
        }

        let native = self
            .shared
            .native_format
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .expect("native format set before the ring can produce data");
        let effective = self
            .shared
            .effective_format
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .expect("effective format set alongside native format");

        let bytes = if native == effective {
            raw
        } else {
            proctap_dsp::convert_chunk(raw, native, effective, self.shared.quality)?
        };
        Ok(Some(Chunk::new(bytes, effective)))
    }

    /// A finite, non-restartable iterator of chunks that ends cleanly once
    /// the session stops (spec §4.1 `stream`).
    ///
    /// Dropping the iterator does not stop capture (spec §4.1 "cancellation
    /// of the consumer task ... does not stop the capture session").
    pub fn stream(&self) -> ChunkStream<'_> {
        ChunkStream { session: self }
    }

    /// Atomically replaces the push callback. Takes effect at the next
    /// chunk boundary if the session is already `Running` (spec §4.1
    /// `set_callback`).
    pub fn set_callback(&self, callback: Option<CaptureCallback>) -> Result<(), CaptureError> {
        self.ensure_not_closed()?;
        *self
            .shared
            .callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = callback;
        Ok(())
    }

    /// The format actually flowing from the backend. Valid only while
    /// `Running` (spec §4.1 `native_format`).
    pub fn native_format(&self) -> Result<Format, CaptureError> {
        self.ensure_not_closed()?;
        let state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != SessionState::Running {
            return Err(CaptureError::new(
                ErrorKind::SessionStopped,
                format!("native format unavailable in state {state:?}"),
            ));
        }
        Ok(self
            .shared
            .native_format
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .expect("native format set once Running"))
    }

    /// Whether the session is currently `Running`.
    pub fn is_running(&self) -> bool {
        *self
            .shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            == SessionState::Running
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// A snapshot of diagnostic counters: dropped frames, the strategy that
    /// activated, and the last error observed, if any.
    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            state: self.state(),
            strategy: self
                .shared
                .strategy_name
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone(),
            dropped_frames: self.shared.ring.dropped_frames(),
            last_error: *self
                .shared
                .last_error
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Iterator returned by [`Session::stream`].
pub struct ChunkStream<'a> {
    session: &'a Session,
}

impl Iterator for ChunkStream<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            match self.session.read(STREAM_POLL) {
                Ok(Some(chunk)) => return Some(chunk),
                Ok(None) => {
                    if !self.session.is_running() {
                        return None;
                    }
                }
                Err(_) => return None,
            }
        }
    }
}

fn swallow_panic(result: std::thread::Result<()>) {
    if let Err(payload) = result {
        tracing::warn!(panic = %panic_message(&payload), "capture callback panicked; suppressing");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) fn invoke_callback(cb: &mut CaptureCallback, bytes: &[u8], frame_count: usize) {
    let result = catch_unwind(AssertUnwindSafe(|| cb(bytes, frame_count)));
    swallow_panic(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctap_core::SampleFormat;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_format() -> Format {
        Format {
            sample_rate: 48_000,
            channels: 2,
            sample_format: SampleFormat::Float32,
        }
    }

    struct MockBackend {
        ring: Arc<FrameRing>,
        format: Format,
        feeder: Option<JoinHandle<()>>,
    }

    impl CaptureBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        fn activate(&mut self) -> Result<Format, CaptureError> {
            self.ring.set_frame_size(self.format.frame_size());
            let ring = Arc::clone(&self.ring);
            let frame = vec![0u8; self.format.frame_size()];
            self.feeder = Some(std::thread::spawn(move || {
                for _ in 0..5 {
                    std::thread::sleep(Duration::from_millis(5));
                    ring.write(&frame);
                }
            }));
            Ok(self.format)
        }

        fn deactivate(&mut self) {
            if let Some(handle) = self.feeder.take() {
                let _ = handle.join();
            }
        }
    }

    fn mock_strategy(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Ok(Box::new(MockBackend {
            ring,
            format: test_format(),
            feeder: None,
        }))
    }

    fn always_fails(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        _ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Err((ErrorKind::BackendUnavailable, "mock backend unavailable".to_string()))
    }

    fn open_mock(options: OpenOptions) -> Session {
        open_impl(CaptureTarget::ProcessId(1234), options, vec![mock_strategy])
            .expect("mock open should succeed")
    }

    /// A backend that activates cleanly but reports itself lost on the
    /// first `health_check` poll, for exercising the dispatcher's
    /// asynchronous-failure path.
    struct FailingHealthBackend {
        format: Format,
        reported: bool,
    }

    impl CaptureBackend for FailingHealthBackend {
        fn name(&self) -> &str {
            "mock-failing"
        }

        fn activate(&mut self) -> Result<Format, CaptureError> {
            Ok(self.format)
        }

        fn deactivate(&mut self) {}

        fn health_check(&mut self) -> Option<CaptureError> {
            if self.reported {
                return None;
            }
            self.reported = true;
            Some(CaptureError::new(ErrorKind::BackendLost, "mock helper exited unexpectedly"))
        }
    }

    fn failing_health_strategy(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        _ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Ok(Box::new(FailingHealthBackend {
            format: test_format(),
            reported: false,
        }))
    }

    #[test]
    fn invalid_target_is_rejected_at_open() {
        let err = open_impl(CaptureTarget::ProcessId(0), OpenOptions::default(), vec![mock_strategy])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn fresh_session_is_created_and_not_running() {
        let session = open_mock(OpenOptions::default());
        assert_eq!(session.state(), SessionState::Created);
        assert!(!session.is_running());
    }

    #[test]
    fn start_transitions_to_running_and_reports_native_format() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        assert!(session.is_running());
        assert_eq!(session.native_format().unwrap(), test_format());
        session.stop().unwrap();
    }

    #[test]
    fn start_failure_when_all_strategies_fail() {
        let session = open_impl(
            CaptureTarget::ProcessId(1),
            OpenOptions::default(),
            vec![always_fails],
        )
        .unwrap();
        let err = session.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(session.state(), SessionState::Failed(ErrorKind::BackendUnavailable));
    }

    #[test]
    fn read_delivers_chunks_while_running() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        let chunk = session
            .read(Duration::from_secs(1))
            .unwrap()
            .expect("a chunk should arrive");
        assert!(!chunk.is_empty());
        session.stop().unwrap();
    }

    #[test]
    fn read_returns_none_once_a_callback_is_registered() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        session
            .set_callback(Some(Box::new(|_bytes, _frames| {})))
            .unwrap();
        assert_eq!(session.read(Duration::from_millis(50)).unwrap(), None);
        session.stop().unwrap();
    }

    #[test]
    fn callback_receives_chunks() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_for_cb = Arc::clone(&count);
        let session = open_mock(OpenOptions {
            callback: Some(Box::new(move |_bytes, frames| {
                if frames > 0 {
                    count_for_cb.fetch_add(1, Ordering::SeqCst);
                }
            })),
            ..Default::default()
        });
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        session.stop().unwrap();
        assert!(count.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn panicking_callback_does_not_kill_the_session() {
        let session = open_mock(OpenOptions {
            callback: Some(Box::new(|_bytes, _frames| panic!("boom"))),
            ..Default::default()
        });
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert!(session.is_running());
        session.stop().unwrap();
    }

    #[test]
    fn stop_is_idempotent() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        session.stop().unwrap();
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn stopping_before_start_just_moves_created_to_stopped() {
        let session = open_mock(OpenOptions::default());
        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn close_rejects_further_operations() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        session.close().unwrap();
        let err = session.read(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
        assert_eq!(session.start().unwrap_err().kind(), ErrorKind::SessionClosed);
    }

    #[test]
    fn close_is_idempotent() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        session.close().unwrap();
        session.close().unwrap();
    }

    #[test]
    fn stream_terminates_when_session_stops() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        session.stop().unwrap();
        // The mock backend's feeder thread has already exited and the ring
        // is closed, so this collect must terminate rather than hang.
        let _chunks: Vec<_> = session.stream().collect();
    }

    #[test]
    fn backend_health_failure_moves_session_to_failed() {
        let session = open_impl(
            CaptureTarget::ProcessId(1234),
            OpenOptions::default(),
            vec![failing_health_strategy],
        )
        .expect("mock open should succeed");
        session.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(session.state(), SessionState::Failed(ErrorKind::BackendLost));
        assert_eq!(session.diagnostic().last_error, Some(ErrorKind::BackendLost));
        // The backend was already torn down by record_failure; stop must
        // still return cleanly rather than double-deactivating it.
        session.stop().unwrap();
    }

    #[test]
    fn diagnostic_reports_strategy_name_once_started() {
        let session = open_mock(OpenOptions::default());
        session.start().unwrap();
        let diag = session.diagnostic();
        assert_eq!(diag.strategy.as_deref(), Some("mock"));
        session.stop().unwrap();
    }
}
