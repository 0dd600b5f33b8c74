//! Thin command-line wrapper around [`proctap_session`] (spec §6
//! "command-line surface (thin wrapper, not core, but contractually
//! stable)").
//!
//! Everything here is an external collaborator by the library's own
//! accounting: argument parsing, process-name→pid lookup, and raw-PCM
//! stdout writing. The actual capture logic lives entirely in
//! `proctap-session`/`proctap-platform`/`proctap-dsp`.

mod exit;
mod process_lookup;

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use proctap_core::{CaptureTarget, ErrorKind, Format, ResampleQuality, SampleFormat};
use proctap_session::OpenOptions;

/// Capture one running process's audio output to standard output.
#[derive(Parser)]
#[command(name = "proctap", author, version, about, long_about = None)]
struct Args {
    /// Process id to capture. Exactly one of `--pid`/`--name` is required.
    #[arg(long)]
    pid: Option<u32>,

    /// Process name to capture (resolved to a pid). Exactly one of
    /// `--pid`/`--name` is required.
    #[arg(long)]
    name: Option<String>,

    /// Emit raw PCM to standard output. Currently the only supported mode;
    /// present as a flag because a future file-output mode is an external
    /// collaborator, not part of this binary's contract.
    #[arg(long)]
    stdout: bool,

    /// Requested sample rate in hertz. Omit to use the backend's native
    /// rate and skip resampling.
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Requested channel count (1 or 2). Omit to use the backend's native
    /// channel count and skip remixing.
    #[arg(long)]
    channels: Option<u16>,

    /// Requested sample format. Omit to use the backend's native format
    /// and skip sample-format conversion.
    #[arg(long, value_enum)]
    sample_format: Option<CliSampleFormat>,

    /// Resampling quality, used only when resampling actually runs.
    #[arg(long, value_enum, default_value = "best")]
    resample_quality: CliResampleQuality,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliSampleFormat {
    Int16,
    Int24,
    Int32,
    Float32,
}

impl From<CliSampleFormat> for SampleFormat {
    fn from(value: CliSampleFormat) -> Self {
        match value {
            CliSampleFormat::Int16 => SampleFormat::Int16,
            CliSampleFormat::Int24 => SampleFormat::Int24,
            CliSampleFormat::Int32 => SampleFormat::Int32,
            CliSampleFormat::Float32 => SampleFormat::Float32,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliResampleQuality {
    Best,
    Medium,
    Fast,
}

impl From<CliResampleQuality> for ResampleQuality {
    fn from(value: CliResampleQuality) -> Self {
        match value {
            CliResampleQuality::Best => ResampleQuality::Best,
            CliResampleQuality::Medium => ResampleQuality::Medium,
            CliResampleQuality::Fast => ResampleQuality::Fast,
        }
    }
}

fn init_tracing() {
    let filter = std::env::var("PROCTAP_LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

fn main() {
    init_tracing();
    let args = Args::parse();
    std::process::exit(run(args));
}

fn run(args: Args) -> i32 {
    let target = match resolve_target(&args) {
        Ok(target) => target,
        Err((code, message)) => {
            eprintln!("proctap: {message}");
            return code;
        }
    };

    let requested_format = requested_format(&args);

    let options = OpenOptions {
        requested_format,
        capacity_hint: None,
        quality: args.resample_quality.into(),
        callback: None,
    };

    let session = match proctap_session::open(target, options) {
        Ok(session) => session,
        Err(e) => return report_and_exit(&e.to_string(), e.kind()),
    };

    if let Err(e) = session.start() {
        return report_and_exit(&e.to_string(), e.kind());
    }
    tracing::info!(
        strategy = session.diagnostic().strategy.as_deref().unwrap_or("unknown"),
        "capture started"
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    if ctrlc::set_handler(move || running_for_handler.store(false, Ordering::SeqCst)).is_err() {
        tracing::warn!("failed to install Ctrl-C handler, relying on process kill");
    }

    let mut stdout = std::io::stdout().lock();
    while running.load(Ordering::SeqCst) {
        match session.read(Duration::from_millis(200)) {
            Ok(Some(chunk)) => {
                if args.stdout {
                    if stdout.write_all(&chunk.bytes).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                if !session.is_running() {
                    break;
                }
            }
            Err(_) => break,
        }
    }

    let _ = stdout.flush();
    session.close().ok();

    match session.diagnostic().last_error {
        Some(kind) => kind.exit_code(),
        None => exit::SUCCESS,
    }
}

fn report_and_exit(message: &str, kind: ErrorKind) -> i32 {
    eprintln!("proctap: {message}");
    kind.exit_code()
}

fn resolve_target(args: &Args) -> Result<CaptureTarget, (i32, String)> {
    match (args.pid, &args.name) {
        (Some(_), Some(_)) => Err((
            exit::INVALID_ARGS,
            "exactly one of --pid or --name is required, not both".to_string(),
        )),
        (None, None) => Err((
            exit::INVALID_ARGS,
            "one of --pid or --name is required".to_string(),
        )),
        (Some(pid), None) => Ok(CaptureTarget::ProcessId(pid)),
        (None, Some(name)) => process_lookup::resolve_pid(name)
            .map(CaptureTarget::ProcessId)
            .map_err(|e| (exit::TARGET_NOT_FOUND, format!("{e:#}"))),
    }
}

fn requested_format(args: &Args) -> Option<Format> {
    if args.sample_rate.is_none() && args.channels.is_none() && args.sample_format.is_none() {
        return None;
    }
    Some(Format {
        sample_rate: args.sample_rate.unwrap_or(48_000),
        channels: args.channels.unwrap_or(2),
        sample_format: args
            .sample_format
            .map(SampleFormat::from)
            .unwrap_or(SampleFormat::Float32),
    })
}
