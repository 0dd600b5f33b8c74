//! The real-time data path: a bounded, frame-aligned byte queue bridging a
//! capture backend's audio thread to whatever is reading from a session
//! (spec §3 "ring buffer", §4.3).
//!
//! This is lock-light rather than lock-free: a single [`std::sync::Mutex`]
//! guards a [`VecDeque<u8>`], held only for the duration of a memcpy-sized
//! copy on each side. That keeps the implementation small and auditable
//! (no unsafe code, unlike a hand-rolled SPSC ring) while still keeping the
//! backend's write path non-blocking under the uncontended, briefly-held
//! lock a single-producer/single-consumer queue sees in practice — the same
//! tradeoff `sonido-core`'s buffer pool makes by centralizing all shared
//! state behind ordinary ownership rather than atomics.
//!
//! Overflow is lossy by design (spec §4.3 "oldest frames are discarded"):
//! when a write would exceed capacity, whole frames are dropped from the
//! front until the new data fits, and the count is exposed via
//! [`FrameRing::dropped_frames`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner {
    buf: VecDeque<u8>,
    capacity: usize,
    frame_size: usize,
    closed: bool,
}

/// A bounded, frame-aligned byte queue with overwrite-oldest-on-full
/// semantics.
///
/// Constructed once per session at `open` time (before the native frame
/// size is known), then told its frame size via [`set_frame_size`] once a
/// backend's `activate` call reports the native format — mirroring the
/// construction order in spec §4.2, where `construct(target, config, ring)`
/// happens before `activate() -> NativeFormat`.
///
/// [`set_frame_size`]: FrameRing::set_frame_size
pub struct FrameRing {
    state: Mutex<Inner>,
    not_empty: Condvar,
    dropped_frames: AtomicU64,
}

impl FrameRing {
    /// Builds a ring with the given byte capacity.
    ///
    /// The frame size starts at 1 (byte-granular); callers must not invoke
    /// [`write`](FrameRing::write) before [`set_frame_size`](FrameRing::set_frame_size)
    /// establishes the real native frame size, or whole-frame alignment
    /// cannot be maintained.
    pub fn new(capacity_bytes: usize) -> Self {
        assert!(capacity_bytes > 0, "ring capacity must be positive");
        FrameRing {
            state: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity_bytes),
                capacity: capacity_bytes,
                frame_size: 1,
                closed: false,
            }),
            not_empty: Condvar::new(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Sets the frame size (in bytes) that every subsequent `write` and
    /// `read_available` call must respect.
    ///
    /// Called once, after a backend's `activate` reports the native format
    /// and before its pump thread starts writing.
    pub fn set_frame_size(&self, frame_size: usize) {
        assert!(frame_size > 0, "frame size must be positive");
        let mut inner = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.frame_size = frame_size;
    }

    /// The byte capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .capacity
    }

    /// The number of bytes currently queued.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .buf
            .len()
    }

    /// Whether the ring currently holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of frames discarded so far to make room for newer data.
    ///
    /// Exposed by the session façade as a diagnostic counter (spec §4.9
    /// `diagnostic()`), never reset during a session's lifetime.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Appends `bytes` to the ring, evicting the oldest whole frames first
    /// if the ring is full.
    ///
    /// `bytes.len()` must be a multiple of the configured frame size; this
    /// is an invariant every backend pump loop maintains by construction
    /// (spec §4.3), so a violation here panics rather than returning a
    /// recoverable error.
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut inner = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(
            bytes.len() % inner.frame_size,
            0,
            "write of {} bytes is not a multiple of frame size {}",
            bytes.len(),
            inner.frame_size
        );

        if bytes.len() > inner.capacity {
            // A single write larger than the whole ring: keep only its tail,
            // rounded down to a whole number of frames that fit.
            let frame_size = inner.frame_size;
            let keep = (inner.capacity / frame_size) * frame_size;
            let keep_from = bytes.len() - keep;
            self.dropped_frames
                .fetch_add((keep_from / frame_size) as u64, Ordering::Relaxed);
            inner.buf.clear();
            inner.buf.extend(&bytes[keep_from..]);
            drop(inner);
            self.not_empty.notify_one();
            return;
        }

        let frame_size = inner.frame_size;
        while inner.buf.len() + bytes.len() > inner.capacity {
            let free_needed = inner.buf.len() + bytes.len() - inner.capacity;
            let frames_to_drop = free_needed.div_ceil(frame_size);
            let bytes_to_drop = (frames_to_drop * frame_size).min(inner.buf.len());
            inner.buf.drain(..bytes_to_drop);
            self.dropped_frames
                .fetch_add(frames_to_drop as u64, Ordering::Relaxed);
        }
        inner.buf.extend(bytes);
        drop(inner);
        self.not_empty.notify_one();
    }

    /// Drains up to `max_bytes` from the front of the ring, rounded down to
    /// a whole number of frames, without blocking.
    ///
    /// Returns an empty vector if the ring currently holds fewer bytes than
    /// one frame.
    pub fn read_available(&self, max_bytes: usize) -> Vec<u8> {
        let mut inner = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let frame_size = inner.frame_size;
        let take = (max_bytes.min(inner.buf.len()) / frame_size) * frame_size;
        inner.buf.drain(..take).collect()
    }

    /// Blocks until at least one frame is available, the ring is closed, or
    /// `timeout` elapses.
    ///
    /// Returns `true` if data is available to read, `false` on timeout or a
    /// closed, empty ring.
    pub fn wait(&self, timeout: Duration) -> bool {
        let inner = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let frame_size = inner.frame_size;
        let (inner, timed_out) = self
            .not_empty
            .wait_timeout_while(inner, timeout, |inner| {
                !inner.closed && inner.buf.len() < frame_size
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        !timed_out.timed_out() && inner.buf.len() >= frame_size
    }

    /// Marks the ring closed and wakes any blocked waiter.
    ///
    /// Called by the session façade during `stop`/`close` so a consumer
    /// blocked in [`wait`](FrameRing::wait) is released promptly instead of
    /// waiting out its full timeout.
    pub fn close(&self) {
        let mut inner = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let ring = FrameRing::new(64);
        ring.set_frame_size(4);
        ring.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(ring.len(), 8);
        let out = ring.read_available(8);
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(ring.is_empty());
    }

    #[test]
    fn overflow_drops_oldest_whole_frames() {
        let ring = FrameRing::new(8);
        ring.set_frame_size(4);
        ring.write(&[1, 1, 1, 1]);
        ring.write(&[2, 2, 2, 2]);
        ring.write(&[3, 3, 3, 3]);
        // Capacity 8 = two frames; the oldest frame (all 1s) must be gone.
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.dropped_frames(), 1);
        let out = ring.read_available(8);
        assert_eq!(out, vec![2, 2, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn read_available_rounds_down_to_whole_frames() {
        let ring = FrameRing::new(64);
        ring.set_frame_size(4);
        ring.write(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let out = ring.read_available(6);
        assert_eq!(out.len(), 4);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn wait_returns_true_once_data_arrives() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(FrameRing::new(64));
        ring.set_frame_size(4);
        let writer = Arc::clone(&ring);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write(&[9, 9, 9, 9]);
        });
        assert!(ring.wait(Duration::from_secs(1)));
        handle.join().unwrap();
        assert_eq!(ring.read_available(4), vec![9, 9, 9, 9]);
    }

    #[test]
    fn wait_times_out_on_empty_ring() {
        let ring = FrameRing::new(64);
        ring.set_frame_size(4);
        assert!(!ring.wait(Duration::from_millis(10)));
    }

    #[test]
    fn close_releases_a_blocked_waiter() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(FrameRing::new(64));
        ring.set_frame_size(4);
        let closer = Arc::clone(&ring);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        assert!(!ring.wait(Duration::from_secs(2)));
        handle.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "not a multiple of frame size")]
    fn write_rejects_misaligned_bytes() {
        let ring = FrameRing::new(64);
        ring.set_frame_size(4);
        ring.write(&[1, 2, 3]);
    }

    #[test]
    fn oversized_single_write_keeps_only_the_tail() {
        let ring = FrameRing::new(8);
        ring.set_frame_size(4);
        ring.write(&[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
        assert_eq!(ring.len(), 8);
        assert_eq!(ring.read_available(8), vec![2, 2, 2, 2, 3, 3, 3, 3]);
    }
}
