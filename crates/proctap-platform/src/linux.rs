//! Linux backend: a three-strategy chain (spec §4.4), tried in order by
//! [`proctap_registry::open`] — native PipeWire first, then two subprocess
//! fallbacks for hosts where linking `libpipewire` isn't an option.

use std::process::{Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use proctap_core::{CaptureError, CaptureTarget, ErrorKind, Format, SampleFormat};
use proctap_ring::FrameRing;
use proctap_registry::CaptureBackend;

use crate::subprocess::PipedChildBackend;

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const DEFAULT_CHANNELS: u16 = 2;

fn negotiated_format(requested: Option<Format>) -> Format {
    Format {
        sample_rate: requested.map_or(DEFAULT_SAMPLE_RATE, |f| f.sample_rate),
        channels: requested.map_or(DEFAULT_CHANNELS, |f| f.channels),
        sample_format: SampleFormat::Float32,
    }
}

// --- Strategy 1: native PipeWire -------------------------------------------

/// Captures directly from a target process's PipeWire output node by
/// matching `application.process.id` on the registry and connecting an
/// input stream to it, in the shape the reference PipeWire backend module
/// builds its `pw::stream::Stream` and drains buffers in `process`.
pub struct PipewireNativeBackend {
    pid: u32,
    format: Format,
    ring: Arc<FrameRing>,
    shutdown: Option<pipewire::channel::Sender<Shutdown>>,
    thread: Option<JoinHandle<()>>,
}

/// Zero-sized signal sent through the `pw::channel` pair to stop the
/// PipeWire main loop from outside its own thread (mirrors the shutdown
/// handshake the reference PipeWire backend module uses, since `MainLoopRc`
/// itself cannot be driven from another thread).
struct Shutdown;

impl PipewireNativeBackend {
    fn new(pid: u32, format: Format, ring: Arc<FrameRing>) -> Self {
        PipewireNativeBackend {
            pid,
            format,
            ring,
            shutdown: None,
            thread: None,
        }
    }
}

impl CaptureBackend for PipewireNativeBackend {
    fn name(&self) -> &str {
        "pipewire-native"
    }

    fn activate(&mut self) -> Result<Format, CaptureError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (shutdown_tx, shutdown_rx) = pipewire::channel::channel::<Shutdown>();
        self.shutdown = Some(shutdown_tx);

        let pid = self.pid;
        let format = self.format;
        let ring = Arc::clone(&self.ring);

        ring.set_frame_size(format.frame_size());
        self.thread = Some(thread::spawn(move || {
            if let Err(reason) = pipewire_loop(pid, format, &ring, shutdown_rx, &ready_tx) {
                let _ = ready_tx.send(Err(reason));
            }
        }));

        match ready_rx.recv_timeout(ACTIVATION_TIMEOUT) {
            Ok(Ok(())) => Ok(self.format),
            Ok(Err(reason)) => Err(CaptureError::new(ErrorKind::BackendUnavailable, reason)),
            Err(_) => Err(CaptureError::new(
                ErrorKind::BackendTimeout,
                "pipewire stream did not reach Streaming state in time",
            )),
        }
    }

    fn deactivate(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(Shutdown);
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn pipewire_loop(
    pid: u32,
    format: Format,
    ring: &FrameRing,
    shutdown_rx: pipewire::channel::Receiver<Shutdown>,
    ready: &mpsc::Sender<Result<(), String>>,
) -> Result<(), String> {
    use pipewire::context::ContextRc;
    use pipewire::main_loop::MainLoopRc;
    use pipewire::properties::properties;
    use pipewire::spa::param::audio::{AudioFormat, AudioInfoRaw};
    use pipewire::spa::pod::serialize::PodSerializer;
    use pipewire::spa::pod::{Object, Pod, Value};
    use pipewire::spa::sys::{SPA_PARAM_EnumFormat, SPA_TYPE_OBJECT_Format};
    use pipewire::spa::utils::Direction as SpaDirection;
    use pipewire::stream::{StreamFlags, StreamRc, StreamState};

    pipewire::init();
    let mainloop = MainLoopRc::new(None).map_err(|e| format!("pipewire: main loop failed: {e}"))?;
    let context = ContextRc::new(&mainloop, None).map_err(|e| format!("pipewire: context failed: {e}"))?;
    let core = context.connect_rc(None).map_err(|e| format!("pipewire: connect failed: {e}"))?;

    // Capture from the target process's output node: matching on
    // `application.process.id` is the registry-side half of this, done by
    // the session manager when `TARGET_OBJECT` names that node.
    let props = properties! {
        *pipewire::keys::MEDIA_TYPE => "Audio",
        *pipewire::keys::MEDIA_CATEGORY => "Capture",
        *pipewire::keys::MEDIA_ROLE => "Production",
        *pipewire::keys::STREAM_CAPTURE_SINK => "true",
        *pipewire::keys::TARGET_OBJECT => pid.to_string(),
        *pipewire::keys::NODE_NAME => "proctap",
    };
    let stream = StreamRc::new(&core, "proctap-capture", props)
        .map_err(|e| format!("pipewire: stream creation failed: {e}"))?;

    let _shutdown_listener = shutdown_rx.attach(mainloop.loop_(), {
        let mainloop = mainloop.clone();
        move |_: Shutdown| mainloop.quit()
    });

    let ready_for_listener = ready.clone();
    let mainloop_for_listener = mainloop.clone();
    let _listener = stream
        .add_local_listener::<()>()
        .state_changed(move |_, _, old, new| {
            tracing::debug!(?old, ?new, "pipewire stream state changed");
            match new {
                StreamState::Streaming => {
                    let _ = ready_for_listener.send(Ok(()));
                }
                StreamState::Error(reason) => {
                    let _ = ready_for_listener.send(Err(format!("pipewire stream error: {reason}")));
                    mainloop_for_listener.quit();
                }
                _ => {}
            }
        })
        .process(move |stream, _| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }
            let data = &mut datas[0];
            let size = data.chunk().size() as usize;
            let offset = data.chunk().offset() as usize;
            if let Some(bytes) = data.data() {
                if size > 0 && offset + size <= bytes.len() {
                    ring.write(&bytes[offset..offset + size]);
                }
            }
        })
        .register()
        .map_err(|e| format!("pipewire: listener registration failed: {e}"))?;

    let mut audio_info = AudioInfoRaw::new();
    audio_info.set_format(AudioFormat::F32LE);
    audio_info.set_rate(format.sample_rate);
    audio_info.set_channels(format.channels.into());
    let object = Object {
        type_: SPA_TYPE_OBJECT_Format,
        id: SPA_PARAM_EnumFormat,
        properties: audio_info.into(),
    };
    let mut pod_buffer = [0u8; 1024];
    let (cursor, _) = PodSerializer::serialize(std::io::Cursor::new(&mut pod_buffer[..]), &Value::Object(object))
        .map_err(|e| format!("pipewire: format pod serialization failed: {e:?}"))?;
    let pod = Pod::from_bytes(&pod_buffer[..cursor.position() as usize])
        .ok_or_else(|| "pipewire: failed to build format pod".to_string())?;

    let flags = StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS | StreamFlags::RT_PROCESS;
    stream
        .connect(SpaDirection::Input, None, flags, &mut [pod])
        .map_err(|e| format!("pipewire: stream connect failed: {e}"))?;

    mainloop.run();

    stream.disconnect().ok();
    ring.close();
    Ok(())
}

/// Builds a [`PipewireNativeBackend`] for a process-id target.
pub fn construct_pipewire(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
    let pid = target.process_id().ok_or_else(|| {
        (
            ErrorKind::BackendUnavailable,
            "pipewire: target is not a process id".to_string(),
        )
    })?;
    Ok(Box::new(PipewireNativeBackend::new(
        pid,
        negotiated_format(requested),
        ring,
    )))
}

// --- Strategy 2: `pw-record` subprocess ------------------------------------

struct SubprocessBackend {
    name: &'static str,
    format: Format,
    inner: PipedChildBackend,
}

impl CaptureBackend for SubprocessBackend {
    fn name(&self) -> &str {
        self.name
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

/// Builds a `pw-record --target <pid>` subprocess backend, streaming raw
/// interleaved f32 PCM on stdout.
pub fn construct_pw_record(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
    let pid = target.process_id().ok_or_else(|| {
        (
            ErrorKind::BackendUnavailable,
            "pw-record: target is not a process id".to_string(),
        )
    })?;
    let format = negotiated_format(requested);

    let mut command = Command::new("pw-record");
    command
        .arg("--target")
        .arg(pid.to_string())
        .arg("--rate")
        .arg(format.sample_rate.to_string())
        .arg("--channels")
        .arg(format.channels.to_string())
        .arg("--format")
        .arg("f32")
        .arg("-")
        .stdin(Stdio::null());

    let inner = PipedChildBackend::new("pw-record", command, format.frame_size(), ring);
    Ok(Box::new(SubprocessBackend {
        name: "pw-record-subprocess",
        format,
        inner,
    }))
}

// --- Strategy 3: `parec` subprocess against a private null sink -----------

/// A transient `module-null-sink` created so strategy 3 can capture the
/// target's audio in isolation, rather than monitoring whatever sink it
/// happens to already be playing through (spec §4.4: creates a null sink,
/// moves the target's sink-input onto it, and tears both down on stop).
struct NullSink {
    name: String,
    module_index: u32,
}

/// Builds a `parec` subprocess backend that captures from a private
/// `module-null-sink`, for hosts running PulseAudio (or pipewire-pulse)
/// without a native PipeWire client library available.
///
/// The sink-input index for `pid` is resolved by shelling out to
/// `pactl list sink-inputs` and matching `application.process.id`, since
/// `parec` itself has no "capture by pid" option. The target's sink-input
/// is then moved onto a freshly loaded null sink so other applications
/// sharing the original sink never leak into the captured stream;
/// `deactivate` unloads the null-sink module, which returns the sink-input
/// to its original sink automatically.
pub fn construct_parec(
    target: &CaptureTarget,
    requested: Option<Format>,
    ring: Arc<FrameRing>,
) -> Result<Box<dyn CaptureBackend>, (ErrorKind, String)> {
    let pid = target.process_id().ok_or_else(|| {
        (
            ErrorKind::BackendUnavailable,
            "parec: target is not a process id".to_string(),
        )
    })?;
    let format = negotiated_format(requested);

    let sink_input = find_sink_input_for_pid(pid).ok_or_else(|| {
        (
            ErrorKind::TargetNotFound,
            format!("parec: no sink-input found for pid {pid}"),
        )
    })?;

    let null_sink = create_null_sink(pid)
        .map_err(|reason| (ErrorKind::BackendUnavailable, reason))?;

    if let Err(reason) = move_sink_input(sink_input, &null_sink.name) {
        teardown_null_sink(&null_sink);
        return Err((ErrorKind::BackendUnavailable, reason));
    }

    let mut command = Command::new("parec");
    command
        .arg(format!("--device={}.monitor", null_sink.name))
        .arg("--rate")
        .arg(format.sample_rate.to_string())
        .arg("--channels")
        .arg(format.channels.to_string())
        .arg("--format=float32le")
        .arg("--raw")
        .stdin(Stdio::null());

    let inner = PipedChildBackend::new("parec", command, format.frame_size(), ring);
    Ok(Box::new(ParecBackend {
        format,
        inner,
        null_sink: Some(null_sink),
    }))
}

struct ParecBackend {
    format: Format,
    inner: PipedChildBackend,
    null_sink: Option<NullSink>,
}

impl CaptureBackend for ParecBackend {
    fn name(&self) -> &str {
        "parec-subprocess"
    }

    fn activate(&mut self) -> Result<Format, CaptureError> {
        self.inner.spawn()?;
        Ok(self.format)
    }

    fn deactivate(&mut self) {
        self.inner.stop();
        if let Some(sink) = self.null_sink.take() {
            teardown_null_sink(&sink);
        }
    }

    fn health_check(&mut self) -> Option<CaptureError> {
        self.inner.health_check()
    }
}

/// Loads a private `module-null-sink` named after `pid`, returning its sink
/// name and the module index `deactivate` needs to unload it.
fn create_null_sink(pid: u32) -> Result<NullSink, String> {
    let sink_name = format!("proctap_capture_{pid}");
    let output = Command::new("pactl")
        .args([
            "load-module",
            "module-null-sink",
            &format!("sink_name={sink_name}"),
            "sink_properties=device.description=proctap-capture",
        ])
        .output()
        .map_err(|e| format!("pactl load-module failed to run: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "pactl load-module module-null-sink failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    let module_index = String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<u32>()
        .map_err(|_| "pactl load-module did not return a module index".to_string())?;
    Ok(NullSink {
        name: sink_name,
        module_index,
    })
}

/// Moves `sink_input`'s playback onto `sink_name`.
fn move_sink_input(sink_input: u32, sink_name: &str) -> Result<(), String> {
    let output = Command::new("pactl")
        .args(["move-sink-input", &sink_input.to_string(), sink_name])
        .output()
        .map_err(|e| format!("pactl move-sink-input failed to run: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "pactl move-sink-input failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// Unloads the null-sink module; PulseAudio moves any sink-input still
/// attached to it back to the default sink as part of tearing the module
/// down, which is what returns the target's audio to its original sink
/// (spec §8 scenario 3).
fn teardown_null_sink(sink: &NullSink) {
    match Command::new("pactl")
        .args(["unload-module", &sink.module_index.to_string()])
        .output()
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::warn!(
            module = sink.module_index,
            stderr = %String::from_utf8_lossy(&output.stderr),
            "pactl unload-module failed"
        ),
        Err(e) => tracing::warn!(
            module = sink.module_index,
            error = %e,
            "failed to run pactl unload-module"
        ),
    }
}

fn find_sink_input_for_pid(pid: u32) -> Option<u32> {
    let output = Command::new("pactl").args(["list", "sink-inputs"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_sink_input_index(&String::from_utf8_lossy(&output.stdout), pid)
}

/// Parses `pactl list sink-inputs` text, returning the index of the first
/// block whose `application.process.id` property matches `pid`.
fn parse_sink_input_index(text: &str, pid: u32) -> Option<u32> {
    let needle = format!("application.process.id = \"{pid}\"");
    let mut current_index: Option<u32> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Sink Input #") {
            current_index = rest.trim().parse().ok();
        } else if trimmed == needle {
            return current_index;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Sink Input #42
\tapplication.name = \"firefox\"
\tapplication.process.id = \"1234\"
\tsome.other.prop = \"x\"
Sink Input #43
\tapplication.process.id = \"5678\"
";

    #[test]
    fn finds_matching_sink_input_by_pid() {
        assert_eq!(parse_sink_input_index(SAMPLE, 1234), Some(42));
        assert_eq!(parse_sink_input_index(SAMPLE, 5678), Some(43));
    }

    #[test]
    fn missing_pid_yields_none() {
        assert_eq!(parse_sink_input_index(SAMPLE, 9999), None);
    }

    #[test]
    fn negotiated_format_falls_back_to_defaults() {
        let format = negotiated_format(None);
        assert_eq!(format.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(format.channels, DEFAULT_CHANNELS);
        assert_eq!(format.sample_format, SampleFormat::Float32);
    }
}

/// Strategy chain, most capable first: native PipeWire, then `pw-record`,
/// then `parec`.
pub fn strategies() -> Vec<proctap_registry::BackendStrategy> {
    vec![construct_pipewire, construct_pw_record, construct_parec]
}
