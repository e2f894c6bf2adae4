//! synthetic-record: drive a full capture session against the synthetic
//! backend and save the artifact.
//!
//! Usage:
//!   synthetic-record [OPTIONS]            Record and export
//!   synthetic-record --list-devices       Show the devices the profile exposes

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;

use capture_compose_core::{
    Artifact, CaptureConfig, CaptureEngine, CaptureError, EngineOptions, MediaEncoder, RecordingSession,
    Resolution, SessionEvents, UnifiedTrackSet,
};
use capture_compose_synthetic::{
    summarize, DeviceEnumerator, DeviceProfile, FileExporter, FrameEncoder, PermissionState, Permissions,
    SyntheticDevices, CONTAINER_MIME,
};

#[derive(Parser)]
#[command(
    name = "synthetic-record",
    about = "Record a capture session from synthetic devices",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// List synthetic devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Overlay the camera onto the display
    #[arg(long)]
    camera: bool,

    /// With --camera, record the camera alone
    #[arg(long)]
    camera_only: bool,

    /// Disable microphone capture
    #[arg(long)]
    no_mic: bool,

    /// Disable display audio capture
    #[arg(long)]
    no_system_audio: bool,

    /// Request a watermark (carried in the config only)
    #[arg(long)]
    watermark: bool,

    /// Seconds of recording, excluding pauses
    #[arg(short, long, default_value = "3.0")]
    duration: f64,

    /// Pause for this many seconds halfway through
    #[arg(long, default_value = "0.0")]
    pause: f64,

    /// Mute for this many seconds halfway through
    #[arg(long, default_value = "0.0")]
    mute: f64,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Artifact file name
    #[arg(short, long, default_value = "recording.ccf")]
    name: String,

    /// Display resolution as WIDTHxHEIGHT
    #[arg(long, default_value = "1280x720", value_parser = parse_resolution)]
    display: Resolution,

    /// Answer to the display prompt: granted|denied|unavailable
    #[arg(long, default_value = "granted")]
    display_permission: PermissionState,

    /// Answer to the camera prompt: granted|denied|unavailable
    #[arg(long, default_value = "granted")]
    camera_permission: PermissionState,

    /// Answer to the microphone prompt: granted|denied|unavailable
    #[arg(long, default_value = "granted")]
    microphone_permission: PermissionState,

    /// Untick "share audio" at the display prompt
    #[arg(long)]
    decline_display_audio: bool,

    /// Engine options as a JSON file
    #[arg(long)]
    options: Option<PathBuf>,
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width: u32 = w.trim().parse().map_err(|e| format!("bad width '{}': {}", w, e))?;
    let height: u32 = h.trim().parse().map_err(|e| format!("bad height '{}': {}", h, e))?;
    if width == 0 || height == 0 {
        return Err("resolution must be non-zero".into());
    }
    Ok(Resolution::new(width, height))
}

/// Logs every session event and keeps the outcome.
#[derive(Default)]
struct Recorder {
    artifact: Mutex<Option<Artifact>>,
    error: Mutex<Option<CaptureError>>,
}

impl SessionEvents for Recorder {
    fn on_media(&self, tracks: &UnifiedTrackSet) {
        let labels: Vec<_> = tracks.tracks().map(|t| t.label().to_string()).collect();
        log::info!("Preview ready: {}", labels.join(", "));
    }

    fn on_start(&self) {
        log::info!("Recording started");
    }

    fn on_pause(&self) {
        log::info!("Recording paused");
    }

    fn on_resume(&self) {
        log::info!("Recording resumed");
    }

    fn on_data(&self, chunk: &[u8]) {
        log::debug!("Chunk of {} bytes", chunk.len());
    }

    fn on_stop(&self, artifact: &Artifact) {
        log::info!(
            "Recording stopped: {} chunks, {} bytes, {:.2}s",
            artifact.chunk_count,
            artifact.size(),
            artifact.duration_secs
        );
        *self.artifact.lock() = Some(artifact.clone());
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("Session error: {}", error);
        *self.error.lock() = Some(error.clone());
    }
}

fn load_options(cli: &Cli, encoder: &FrameEncoder) -> Result<EngineOptions, CaptureError> {
    let mut options = match &cli.options {
        Some(path) => {
            let json = fs::read_to_string(path).map_err(|e| {
                CaptureError::ConfigurationFailed(format!("cannot read {}: {}", path.display(), e))
            })?;
            EngineOptions::from_json(&json)?
        }
        None => EngineOptions::default(),
    };
    if !encoder.is_type_supported(&options.mime_type) {
        log::info!(
            "Encoder does not produce '{}', recording as {}",
            options.mime_type,
            CONTAINER_MIME
        );
        options.mime_type = CONTAINER_MIME.into();
    }
    Ok(options)
}

fn record_for(session: &RecordingSession, secs: f64) {
    if secs > 0.0 {
        thread::sleep(Duration::from_secs_f64(secs));
    }
    log::debug!("Elapsed {:?} ({})", session.duration(), session.state());
}

fn run(cli: Cli) -> Result<(), CaptureError> {
    let profile = DeviceProfile {
        display_resolution: cli.display,
        ..Default::default()
    };
    let permissions = Permissions {
        display: cli.display_permission,
        camera: cli.camera_permission,
        microphone: cli.microphone_permission,
        share_display_audio: !cli.decline_display_audio,
    };

    if cli.list_devices {
        for device in DeviceEnumerator::new(&profile, permissions).list_devices() {
            println!("{}", device);
        }
        return Ok(());
    }

    let encoder = FrameEncoder::new();
    let options = load_options(&cli, &encoder)?;
    let devices = Arc::new(SyntheticDevices::new(profile).with_permissions(permissions));
    let engine = CaptureEngine::new(devices, Arc::new(encoder), options)?;

    let config = CaptureConfig {
        use_camera: cli.camera || cli.camera_only,
        use_microphone: !cli.no_mic,
        use_system_audio: !cli.no_system_audio,
        use_watermark: cli.watermark,
        camera_only: cli.camera_only,
    };
    log::info!("Capturing in {:?} mode", config.mode());

    let recorder = Arc::new(Recorder::default());
    let session = engine.create_session(config, recorder.clone())?;

    session.start();
    record_for(&session, cli.duration / 2.0);
    if cli.pause > 0.0 {
        session.pause();
        thread::sleep(Duration::from_secs_f64(cli.pause));
        session.resume();
    }
    if cli.mute > 0.0 {
        session.mute();
        record_for(&session, cli.mute);
        session.unmute();
    }
    record_for(&session, cli.duration / 2.0);
    session.stop();

    if !session.wait_for_completion(Duration::from_secs(10)) {
        return Err(CaptureError::Unknown("session did not finish in time".into()));
    }
    if let Some(error) = recorder.error.lock().take() {
        return Err(error);
    }
    let artifact = recorder
        .artifact
        .lock()
        .take()
        .ok_or_else(|| CaptureError::Unknown("session finished without an artifact".into()))?;

    let exporter = FileExporter::new(&cli.output);
    artifact.export(&exporter, &cli.name)?;

    let metadata = serde_json::to_string_pretty(&artifact.metadata())
        .map_err(|e| CaptureError::StorageError(format!("failed to serialize metadata: {}", e)))?;
    println!("{}", metadata);
    if let Ok(summary) = summarize(&artifact.payload) {
        println!(
            "{} video frames, {} audio frames ({} silent records), {:.2}s",
            summary.video_frames, summary.audio_frames, summary.silent_records, summary.duration_secs
        );
    }
    println!("{}", serde_json::to_string_pretty(&session.diagnostics()).unwrap_or_default());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
