//! Helper process spawned by `proctap-platform`'s macOS backend (spec §4.5).
//!
//! Runs the actual ScreenCaptureKit session — something that only works
//! from a full process with its own entitlements and TCC prompt, not from a
//! library linked into an arbitrary host — and streams raw interleaved PCM
//! bytes on stdout. Diagnostics go to stderr so stdout stays a clean byte
//! stream the parent can read without framing.
//!
//! Grounded on the reference system-audio module's `SCShareableContent` /
//! `SCContentFilter` / `SCStreamConfiguration` usage, generalized from that
//! module's fixed display-wide filter and 16kHz mono config to a per-app
//! filter (bundle id, not display) and caller-chosen rate/channels.

use clap::Parser;

/// Exit codes mirror `proctap_core::ErrorKind::exit_code` so the parent
/// process can fold a helper failure into the same CLI exit-code table.
mod exit {
    pub const UNSUPPORTED_OS: i32 = 2;
    pub const TARGET_NOT_FOUND: i32 = 3;
    pub const PERMISSION_DENIED: i32 = 4;
    pub const BACKEND_UNAVAILABLE: i32 = 5;
    pub const INTERNAL: i32 = 6;
}

#[derive(Parser)]
#[command(name = "proctap-macos-helper")]
struct Args {
    /// Bundle identifier of the application to capture, e.g. "com.apple.Music".
    #[arg(long)]
    bundle_id: String,

    /// Sample rate to request from ScreenCaptureKit, in hertz.
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Channel count to request from ScreenCaptureKit.
    #[arg(long, default_value = "2")]
    channels: u16,

    /// Sample format written to stdout. Only "f32" is implemented —
    /// ScreenCaptureKit delivers float PCM natively.
    #[arg(long, default_value = "f32")]
    sample_format: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let code = platform::run(args);
    std::process::exit(code);
}

#[cfg(target_os = "macos")]
mod platform {
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use screencapturekit::prelude::*;

    use super::{exit, Args};

    struct StdoutSink {
        stdout: Mutex<std::io::Stdout>,
    }

    impl SCStreamOutputTrait for StdoutSink {
        fn did_output_sample_buffer(&self, sample: CMSampleBuffer, of_type: SCStreamOutputType) {
            if of_type != SCStreamOutputType::Audio {
                return;
            }
            let Some(buffer_list) = sample.audio_buffer_list() else {
                return;
            };
            let mut out = self.stdout.lock().expect("stdout lock poisoned");
            for buf in &buffer_list {
                let bytes = buf.data();
                if bytes.is_empty() {
                    continue;
                }
                if out.write_all(bytes).is_err() {
                    // Parent closed its read end (session stopped) — nothing
                    // more to do, the main loop will exit on the next tick.
                    return;
                }
            }
        }
    }

    pub fn run(args: Args) -> i32 {
        if args.sample_format != "f32" {
            tracing::error!(format = %args.sample_format, "only f32 output is implemented");
            return exit::INTERNAL;
        }

        let content = match SCShareableContent::get() {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(error = ?e, "SCShareableContent::get failed (screen recording permission?)");
                return exit::PERMISSION_DENIED;
            }
        };

        let Some(app) = content
            .applications()
            .into_iter()
            .find(|app| app.bundle_identifier() == args.bundle_id)
        else {
            tracing::error!(bundle_id = %args.bundle_id, "no running application with this bundle id");
            return exit::TARGET_NOT_FOUND;
        };

        let Some(display) = content.displays().into_iter().next() else {
            tracing::error!("no display available to anchor the content filter");
            return exit::BACKEND_UNAVAILABLE;
        };

        let filter = SCContentFilter::create()
            .with_display(&display)
            .with_including_applications(&[app])
            .build();

        let config = SCStreamConfiguration::new()
            .with_width(2)
            .with_height(2)
            .with_captures_audio(true)
            .with_excludes_current_process_audio(true)
            .with_sample_rate(args.sample_rate)
            .with_channel_count(args.channels.into());

        let sink = StdoutSink {
            stdout: Mutex::new(std::io::stdout()),
        };

        let mut stream = SCStream::new(&filter, &config);
        stream.add_output_handler(sink, SCStreamOutputType::Audio);

        if let Err(e) = stream.start_capture() {
            tracing::error!(error = ?e, "SCStream::start_capture failed");
            return exit::BACKEND_UNAVAILABLE;
        }
        tracing::info!(bundle_id = %args.bundle_id, "capture started");

        let running = Arc::new(AtomicBool::new(true));
        let running_for_handler = Arc::clone(&running);
        if ctrlc::set_handler(move || running_for_handler.store(false, Ordering::SeqCst)).is_err() {
            tracing::warn!("failed to install termination handler, relying on process kill");
        }

        while running.load(Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        stream.stop_capture().ok();
        tracing::info!("capture stopped");
        0
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::{exit, Args};

    pub fn run(_args: Args) -> i32 {
        tracing::error!("proctap-macos-helper only runs on macOS");
        exit::UNSUPPORTED_OS
    }
}
