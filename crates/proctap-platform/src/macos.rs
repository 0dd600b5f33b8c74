//! macOS backend: spawns `proctap-macos-helper`, which does the actual
//! ScreenCaptureKit work in a separate process (spec §4.5), and bridges its
//! stdout to the ring exactly as the Linux subprocess fallbacks do.
//!
//! ScreenCaptureKit addresses applications by bundle identifier, not pid, so
//! this module resolves a `ProcessId` target to a bundle id before spawning
//! the helper (spec §4.5 step 3) — grounded on the reference system-audio
//! module's `Command::new(...).stdout(Stdio::piped())` + reader-thread
//! pattern, generalized from that module's length-prefixed multi-channel
//! protocol down to plain interleaved PCM, since one helper invocation
//! captures exactly one audio-only stream.

use std::process::{Command, Stdio};
use std::sync::Arc;

use proctap_core::{CaptureError, CaptureTarget, ErrorKind, Format, SampleFormat};
use proctap_ring::FrameRing;
use proctap_registry::CaptureBackend;

use crate::subprocess::PipedChildBackend;

const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 2;
const HELPER_BINARY: &str = "proctap-macos-helper";

struct ScreenCaptureKitBackend {
    format: Format,
    inner: PipedChildBackend,
}

impl CaptureBackend for ScreenCaptureKitBackend {
    fn name(&self) -> &str {
        "screencapturekit-helper"
    }

    fn activate(&mut self) -> Result<Format, CaptureError> {
        self.inner.spawn()?;
        Ok(self.format)
    }

    fn deactivate(&mut self) {
        self.inner.stop();
    }

    fn health_check(&mut self) -> Option<CaptureError> {
        self.inner.health_check()
    }
}

/// Builds a [`ScreenCaptureKitBackend`], resolving `target` to a bundle id
/// first if it was given as a pid.
pub fn construct(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
    let bundle_id = match target {
        CaptureTarget::BundleId(id) => id.clone(),
        CaptureTarget::ProcessId(pid) => resolve_bundle_id(*pid).ok_or_else(|| {
            (
                ErrorKind::TargetNotFound,
                format!("screencapturekit: no bundle id found for pid {pid}"),
            )
        })?,
    };

    let format = Format {
        sample_rate: requested.map_or(DEFAULT_SAMPLE_RATE, |f| f.sample_rate),
        channels: requested.map_or(DEFAULT_CHANNELS, |f| f.channels),
        sample_format: SampleFormat::Float32,
    };

    let mut command = Command::new(HELPER_BINARY);
    command
        .arg("--bundle-id")
        .arg(&bundle_id)
        .arg("--sample-rate")
        .arg(format.sample_rate.to_string())
        .arg("--channels")
        .arg(format.channels.to_string())
        .arg("--sample-format")
        .arg("f32")
        .stdin(Stdio::null());

    let inner = PipedChildBackend::new(HELPER_BINARY, command, format.frame_size(), ring);
    Ok(Box::new(ScreenCaptureKitBackend { format, inner }))
}

/// Resolves a pid to the bundle identifier of its owning application, via
/// `lsappinfo` — every running GUI app on macOS is registered there.
fn resolve_bundle_id(pid: u32) -> Option<String> {
    let info = Command::new("lsappinfo")
        .args(["info", "-app", &format!("ASN:0x0-0x0:{pid}")])
        .output()
        .ok()?;
    if info.status.success() {
        if let Some(id) = parse_bundle_id(&String::from_utf8_lossy(&info.stdout)) {
            return Some(id);
        }
    }

    // `lsappinfo` addresses apps by ASN, not pid directly; fall back to
    // walking every running app's info block and matching its pid.
    let list = Command::new("lsappinfo").args(["list"]).output().ok()?;
    if !list.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&list.stdout);
    for block in text.split("ASN:") {
        if !block.contains(&format!("pid = {pid}")) {
            continue;
        }
        if let Some(id) = parse_bundle_id(block) {
            return Some(id);
        }
    }
    None
}

fn parse_bundle_id(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix("bundle ID=\"")
            .or_else(|| trimmed.strip_prefix("bundle ID = \""))
            .and_then(|rest| rest.strip_suffix('"'))
            .map(str::to_string)
    })
}

pub fn strategies() -> Vec<proctap_registry::BackendStrategy> {
    vec![construct]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bundle_id_from_lsappinfo_line() {
        let text = "pid = 1234\n  bundle ID=\"com.apple.Music\"\n  other = 1";
        assert_eq!(parse_bundle_id(text), Some("com.apple.Music".to_string()));
    }

    #[test]
    fn missing_bundle_id_line_yields_none() {
        assert_eq!(parse_bundle_id("pid = 1234\nother = 1"), None);
    }
}
