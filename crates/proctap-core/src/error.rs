//! The error taxonomy shared by every proctap crate (spec §7).

/// The kind of failure, independent of any human-readable detail.
///
/// Library callers are expected to match on `ErrorKind`, not on
/// [`CaptureError`]'s `Display` text (spec §6: "Library callers match on
/// `ErrorKind`"); the CLI maps each kind to one of the stable exit codes in
/// spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Identifier malformed, or `pid = 0`.
    InvalidTarget,
    /// No such process / bundle at start time.
    TargetNotFound,
    /// Host below required version (Win 10 19041, macOS 13, Linux without
    /// PipeWire/PulseAudio).
    UnsupportedOS,
    /// OS refused the capture (TCC, sandbox, ACL).
    PermissionDenied,
    /// No backend strategy succeeded; aggregates per-strategy reasons.
    BackendUnavailable,
    /// Asynchronous activation did not complete within the deadline.
    BackendTimeout,
    /// A previously healthy capture failed mid-stream.
    BackendLost,
    /// A requested conversion has no implemented path.
    FormatUnsupported,
    /// Operation on a session that is no longer running.
    SessionStopped,
    /// Operation on a closed session.
    SessionClosed,
    /// Invariant violation; diagnostic only.
    Internal,
}

impl ErrorKind {
    /// The CLI exit code this kind maps to (spec §6).
    pub const fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidTarget => 1,
            ErrorKind::UnsupportedOS => 2,
            ErrorKind::TargetNotFound => 3,
            ErrorKind::PermissionDenied => 4,
            ErrorKind::BackendUnavailable
            | ErrorKind::BackendTimeout => 5,
            ErrorKind::BackendLost
            | ErrorKind::FormatUnsupported
            | ErrorKind::SessionStopped
            | ErrorKind::SessionClosed
            | ErrorKind::Internal => 6,
        }
    }
}

/// The error type returned by every fallible proctap operation.
///
/// Carries a [`kind`](CaptureError::kind) plus a human-readable `detail`
/// string and, where one exists, a source error. Modeled on
/// `sonido_io::Error`'s `thiserror`-derived variants, but collapsed to a
/// single struct-like shape since every proctap error is identified first by
/// its `ErrorKind` and the detail string is secondary.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {detail}")]
pub struct CaptureError {
    kind: ErrorKind,
    detail: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CaptureError {
    /// Builds an error with the given kind and detail message.
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        CaptureError {
            kind,
            detail: detail.into(),
            source: None,
        }
    }

    /// Attaches an underlying error as this error's source.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The error's kind.
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable detail message.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Convenience constructor for [`ErrorKind::BackendUnavailable`] that
    /// joins several per-strategy failure reasons into one detail string
    /// (spec §4.4: "Each strategy failure is captured and folded into a
    /// composite error only surfaced if *all* strategies fail").
    pub fn backend_unavailable(reasons: impl IntoIterator<Item = String>) -> Self {
        let joined = reasons.into_iter().collect::<Vec<_>>().join("; ");
        CaptureError::new(
            ErrorKind::BackendUnavailable,
            format!("no capture strategy succeeded: {joined}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(ErrorKind::InvalidTarget.exit_code(), 1);
        assert_eq!(ErrorKind::UnsupportedOS.exit_code(), 2);
        assert_eq!(ErrorKind::TargetNotFound.exit_code(), 3);
        assert_eq!(ErrorKind::PermissionDenied.exit_code(), 4);
        assert_eq!(ErrorKind::BackendUnavailable.exit_code(), 5);
        assert_eq!(ErrorKind::BackendTimeout.exit_code(), 5);
        assert_eq!(ErrorKind::BackendLost.exit_code(), 6);
    }

    #[test]
    fn backend_unavailable_joins_reasons() {
        let err = CaptureError::backend_unavailable([
            "pipewire: missing symbol".to_string(),
            "pw-record: not found".to_string(),
        ]);
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert!(err.detail().contains("missing symbol"));
        assert!(err.detail().contains("not found"));
    }
}
