//! Capture target identification.

/// What a [`Session`](crate) should capture audio from.
///
/// A `ProcessId` is the universal spelling: every supported OS can resolve a
/// running process id to whatever it actually needs internally (a WASAPI
/// loopback activation, a PipeWire `application.process.id` filter). `BundleId`
/// exists because macOS's ScreenCaptureKit addresses applications by bundle
/// identifier, not pid; the macOS backend resolves a `ProcessId` target to a
/// `BundleId` itself (spec §4.5 step 3), but callers who already know the
/// bundle id can skip that resolution step by constructing one directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    /// A running process, identified by its OS process id.
    ProcessId(u32),
    /// A macOS application bundle identifier, e.g. `"com.apple.Music"`.
    ///
    /// Only meaningful to the macOS backend; other backends reject it with
    /// [`ErrorKind::InvalidTarget`](crate::ErrorKind::InvalidTarget).
    BundleId(String),
}

impl CaptureTarget {
    /// Validates the target independent of any backend.
    ///
    /// `pid = 0` is never a capturable process (spec §7: `InvalidTarget`
    /// "Identifier malformed, or `pid=0`"); an empty bundle id is likewise
    /// malformed.
    pub fn is_valid(&self) -> bool {
        match self {
            CaptureTarget::ProcessId(pid) => *pid != 0,
            CaptureTarget::BundleId(id) => !id.trim().is_empty(),
        }
    }

    /// Returns the process id, if this target carries one.
    pub fn process_id(&self) -> Option<u32> {
        match self {
            CaptureTarget::ProcessId(pid) => Some(*pid),
            CaptureTarget::BundleId(_) => None,
        }
    }

    /// Returns the bundle id, if this target carries one.
    pub fn bundle_id(&self) -> Option<&str> {
        match self {
            CaptureTarget::BundleId(id) => Some(id.as_str()),
            CaptureTarget::ProcessId(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_zero_is_invalid() {
        assert!(!CaptureTarget::ProcessId(0).is_valid());
        assert!(CaptureTarget::ProcessId(1234).is_valid());
    }

    #[test]
    fn blank_bundle_id_is_invalid() {
        assert!(!CaptureTarget::BundleId("   ".into()).is_valid());
        assert!(CaptureTarget::BundleId("com.apple.Music".into()).is_valid());
    }

    #[test]
    fn accessors_are_mutually_exclusive() {
        let pid = CaptureTarget::ProcessId(42);
        assert_eq!(pid.process_id(), Some(42));
        assert_eq!(pid.bundle_id(), None);

        let bundle = CaptureTarget::BundleId("com.apple.Music".into());
        assert_eq!(bundle.process_id(), None);
        assert_eq!(bundle.bundle_id(), Some("com.apple.Music"));
    }
}
