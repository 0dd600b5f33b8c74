//! The [`CaptureBackend`] trait and the first-available strategy-selection
//! orchestration that picks a concrete backend for a target (spec §4.4).
//!
//! This crate has no OS-specific code at all — the object-safe trait here
//! is implemented per platform in `proctap-platform`, which is also where
//! `construct`/`supported` free functions live (the spec's backend
//! contract describes `construct` and `supported` as backend-level
//! operations, but they're inherently per-OS and not instance methods, so
//! they can't live on an object-safe trait; modeled here instead as a
//! [`BackendStrategy`] function pointer list, the way `sonido_io::backend`
//! keeps its `AudioBackend` trait object-safe by pushing anything that
//! isn't a per-instance operation out of the trait).

use std::sync::Arc;

use proctap_core::{CaptureError, CaptureTarget, ErrorKind, Format};
use proctap_ring::FrameRing;

/// An activated, per-process capture backend.
///
/// Mirrors `sonido_io::AudioBackend`'s shape: an object-safe trait over
/// `Box<dyn CaptureBackend>`, with construction and capability probing kept
/// outside the trait (see [`BackendStrategy`]) so only truly per-instance
/// operations — `activate`/`deactivate` — need a `self`.
pub trait CaptureBackend: Send {
    /// Human-readable name for diagnostics (e.g. `"wasapi-process-loopback"`,
    /// `"pipewire-native"`, `"screencapturekit-helper"`).
    fn name(&self) -> &str;

    /// Acquires OS resources and begins capture, returning the native
    /// format the backend will deliver bytes in.
    ///
    /// Cheap construction already happened when the strategy function ran;
    /// this is the point at which OS audio APIs are actually touched (spec
    /// §4.2: "`activate()` ... acquires OS resources").
    fn activate(&mut self) -> Result<Format, CaptureError>;

    /// Releases every OS resource acquired by `activate`, in reverse
    /// acquisition order (spec §5 "scoped acquisition"). Idempotent: safe
    /// to call on a backend that never activated, or twice.
    fn deactivate(&mut self);

    /// Non-blocking check for an asynchronous, post-`activate` failure (a
    /// helper process dying, a native stream erroring out mid-capture).
    ///
    /// Polled by the session's dispatcher thread; a backend that can only
    /// ever fail during `activate` (or signals end-of-stream purely by
    /// closing the ring) doesn't need to override this.
    fn health_check(&mut self) -> Option<CaptureError> {
        None
    }
}

/// A single capture strategy: attempts to construct a backend for `target`
/// against this platform's audio API, writing into `ring` once activated.
///
/// Returns `Err((kind, reason))` rather than a bare string so a strategy
/// that can identify a specific cause — e.g. macOS bundle-id resolution
/// finding no matching process, which is squarely `TargetNotFound` — isn't
/// forced to collapse it into generic unavailability. [`open`] only folds
/// failures into [`CaptureError::backend_unavailable`] when no strategy
/// reported anything more specific (spec §4.4: "each strategy failure is
/// captured and folded into a composite error only surfaced if *all*
/// strategies fail").
pub type BackendStrategy = fn(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)>;

/// Tries each strategy in order, returning the first that constructs
/// successfully.
///
/// Strategies are tried in the order given — callers pass the current
/// platform's list from `proctap_platform::strategies()`, already ordered
/// by preference (e.g. native PipeWire before the `pw-record` subprocess
/// fallback before PulseAudio null-sink routing). Every strategy is tried
/// even after one reports a specific failure kind, since a later strategy
/// may still succeed; only once all of them have failed does the most
/// specific kind seen win over the generic aggregate.
///
/// Returns `UnsupportedOS` if `strategies` is empty (no backend exists for
/// this platform at all); otherwise the first non-`BackendUnavailable` kind
/// reported by any strategy, or `BackendUnavailable` aggregating every
/// strategy's failure reason if none reported anything more specific.
pub fn open(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
    strategies: &[BackendStrategy],
) -> Result<Box<dyn CaptureBackend>, CaptureError> {
    if strategies.is_empty() {
        return Err(CaptureError::new(
            ErrorKind::UnsupportedOS,
            "no capture backend is implemented for this platform",
        ));
    }

    let mut reasons = Vec::with_capacity(strategies.len());
    let mut specific: Option<CaptureError> = None;
    for strategy in strategies {
        match strategy(target, requested, Arc::clone(&ring)) {
            Ok(backend) => {
                tracing::debug!(backend = backend.name(), "capture strategy succeeded");
                return Ok(backend);
            }
            Err((kind, reason)) => {
                tracing::debug!(reason = %reason, ?kind, "capture strategy failed, trying next");
                if kind != ErrorKind::BackendUnavailable && specific.is_none() {
                    specific = Some(CaptureError::new(kind, reason.clone()));
                }
                reasons.push(reason);
            }
        }
    }

    Err(specific.unwrap_or_else(|| CaptureError::backend_unavailable(reasons)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockBackend {
        activated: bool,
        format: Format,
    }

    impl CaptureBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        fn activate(&mut self) -> Result<Format, CaptureError> {
            self.activated = true;
            Ok(self.format)
        }

        fn deactivate(&mut self) {
            self.activated = false;
        }
    }

    fn always_fails(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        _ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Err((ErrorKind::BackendUnavailable, "mock failure".to_string()))
    }

    fn always_reports_target_not_found(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        _ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Err((ErrorKind::TargetNotFound, "mock target gone".to_string()))
    }

    fn always_succeeds(
        _target: &CaptureTarget,
        _requested: Option<Format>,
        _ring: Arc<FrameRing>,
    ) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
        Ok(Box::new(MockBackend {
            activated: false,
            format: Format {
                sample_rate: 48_000,
                channels: 2,
                sample_format: proctap_core::SampleFormat::Float32,
            },
        }))
    }

    fn ring() -> Arc<FrameRing> {
        Arc::new(FrameRing::new(4096))
    }

    #[test]
    fn no_strategies_is_unsupported_os() {
        let target = CaptureTarget::ProcessId(1234);
        let err = open(&target, None, ring(), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOS);
    }

    #[test]
    fn first_success_wins() {
        let target = CaptureTarget::ProcessId(1234);
        let mut backend = open(
            &target,
            None,
            ring(),
            &[always_fails, always_succeeds, always_fails],
        )
        .unwrap();
        assert_eq!(backend.name(), "mock");
        let format = backend.activate().unwrap();
        assert_eq!(format.sample_rate, 48_000);
    }

    #[test]
    fn every_strategy_failing_aggregates_reasons() {
        let target = CaptureTarget::ProcessId(1234);
        let err = open(&target, None, ring(), &[always_fails, always_fails]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(err.detail().matches("mock failure").count(), 2);
    }

    #[test]
    fn a_specific_kind_wins_over_the_generic_aggregate() {
        let target = CaptureTarget::ProcessId(1234);
        let err = open(
            &target,
            None,
            ring(),
            &[always_fails, always_reports_target_not_found],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TargetNotFound);
    }
}
