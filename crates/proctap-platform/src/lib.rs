//! Concrete per-OS [`proctap_registry::CaptureBackend`] implementations and
//! the strategy list each platform exposes to [`proctap_registry::open`]
//! (spec §4.3, §4.4, §4.5).
//!
//! Exactly one of the platform modules below compiles on any given target;
//! [`strategies`] is the single entry point callers need, already selecting
//! the right module and already ordered by preference.

#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(any(target_os = "linux", target_os = "macos"))]
mod subprocess;

use proctap_registry::BackendStrategy;

/// The ordered list of capture strategies for the current platform.
///
/// Empty on any OS none of the backend modules above support — `open` turns
/// that into [`proctap_core::ErrorKind::UnsupportedOS`] rather than this
/// crate needing its own empty-platform error path.
pub fn strategies() -> Vec<BackendStrategy> {
    #[cfg(windows)]
    {
        vec![windows::construct]
    }

    #[cfg(target_os = "linux")]
    {
        linux::strategies()
    }

    #[cfg(target_os = "macos")]
    {
        macos::strategies()
    }

    #[cfg(not(any(windows, target_os = "linux", target_os = "macos")))]
    {
        Vec::new()
    }
}
