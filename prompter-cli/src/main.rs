//! Thin terminal host for `prompter-core`.
//!
//! Owns exactly what the engine delegates to a caller: loading settings,
//! picking an audio device, driving the session controller's single message
//! loop, and printing published state. All matching/backend/session logic
//! lives in the library crate.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use prompter_core::backend::external::ExternalSubprocessDriver;
use prompter_core::backend::TranscriptionBackend;
use prompter_core::config::{self, EngineSettings, SpeechEngineMode};
use prompter_core::session::{AuthorizationProvider, AuthorizationStatus, BackendFactory, ControllerMessage, PrivacyPaneKind, SessionController, SessionState};
use prompter_core::{Result, Script, TrackerError};

#[derive(Parser, Debug)]
#[command(name = "prompter", about = "Terminal host for the teleprompter speech-tracking engine")]
struct Cli {
    /// Script file: pages separated by a line containing only "---".
    script: Option<PathBuf>,

    /// Settings file override (defaults to the platform data dir).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Input device id to capture from (see --list-devices).
    #[arg(long)]
    device: Option<String>,

    /// List available input devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Page to start reading from (0-indexed).
    #[arg(long, default_value_t = 0)]
    page: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();

    if cli.list_devices {
        for device in prompter_core::audio::device::enumerate_audio_input_devices() {
            println!("{}\t{}", device.id, device.name);
        }
        return Ok(());
    }

    let script_path = cli.script.ok_or_else(|| anyhow::anyhow!("a script file is required unless --list-devices is passed"))?;
    let pages = load_script_pages(&script_path)?;
    let script = Script::new(pages);

    let settings_path = cli.settings.unwrap_or_else(config::default_settings_path);
    let mut settings = config::load_settings(&settings_path);
    if let Some(device) = &cli.device {
        settings.selected_mic_uid = device.clone();
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(script, cli.page, settings))
}

async fn run(script: Script, start_page: usize, settings: EngineSettings) -> anyhow::Result<()> {
    let (messages_tx, mut messages_rx) = tokio::sync::mpsc::unbounded_channel::<ControllerMessage>();
    let mut controller = SessionController::new(settings.clone(), Box::new(HostBackendFactory), Box::new(AutoGrantAuthorization), tokio::runtime::Handle::current(), messages_tx.clone());

    controller.start(&script, start_page)?;
    info!(page = start_page, "session started");

    let audio = match prompter_core::audio::AudioCapture::start(non_empty(&settings.selected_mic_uid)) {
        Ok(audio) => Some(audio),
        Err(e) => {
            warn!(error = %e, "audio capture unavailable, running without level metering");
            None
        }
    };

    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            Some(message) = messages_rx.recv() => {
                controller.handle_message(message, chrono::Utc::now());
            }
            line = stdin_lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_command(&mut controller, &script, &line) {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            _ = ticker.tick() => {
                if let Some(audio) = &audio {
                    if audio.poll_config_change() {
                        let _ = messages_tx.send(ControllerMessage::ConfigChanged);
                    }
                }
                print_snapshot(&mut controller);
                if controller.state() == SessionState::Paused {
                    warn!("session paused after exhausting retries — type 'resume' or 'quit'");
                }
            }
        }
    }

    controller.stop();
    Ok(())
}

fn handle_command(controller: &mut SessionController, script: &Script, line: &str) -> bool {
    let line = line.trim();
    match line.split_once(' ').unwrap_or((line, "")) {
        ("jump", rest) => {
            if let Ok(target) = rest.trim().parse::<usize>() {
                controller.jump_to(target);
            }
        }
        ("resume", _) => {
            if let Err(e) = controller.resume() {
                warn!(error = %e, "resume failed");
            }
        }
        ("restart", _) => {
            controller.stop();
            if let Err(e) = controller.start(script, 0) {
                warn!(error = %e, "restart failed");
            }
        }
        ("quit", _) | ("exit", _) => return false,
        _ => {}
    }
    true
}

fn print_snapshot(controller: &mut SessionController) {
    let snapshot = controller.snapshot();
    println!(
        "[{:?}] cursor={} speaking={} advance={} dismiss={} error={:?}",
        controller.state(),
        snapshot.recognized_char_count,
        snapshot.is_speaking,
        snapshot.should_advance_page,
        snapshot.should_dismiss,
        snapshot.error,
    );
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_script_pages(path: &PathBuf) -> anyhow::Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    let pages: Vec<String> = raw.split("\n---\n").map(|page| page.trim().to_string()).filter(|page| !page.is_empty()).collect();
    if pages.is_empty() {
        anyhow::bail!("script file contains no pages");
    }
    Ok(pages)
}

/// Grants every permission request immediately — this host has no OS
/// permission system of its own to defer to.
struct AutoGrantAuthorization;
impl AuthorizationProvider for AutoGrantAuthorization {
    fn request_microphone_authorization(&mut self) -> AuthorizationStatus {
        AuthorizationStatus::Granted
    }
    fn request_speech_recognition_authorization(&mut self) -> AuthorizationStatus {
        AuthorizationStatus::Granted
    }
    fn open_system_privacy_pane(&mut self, _kind: PrivacyPaneKind) {}
}

/// Builds the configured backend from `EngineSettings` on every start/restart.
struct HostBackendFactory;
impl BackendFactory for HostBackendFactory {
    fn create(&self, settings: &EngineSettings) -> Result<Box<dyn TranscriptionBackend>> {
        match settings.speech_engine_mode {
            SpeechEngineMode::ExternalStream => {
                let config = prompter_core::backend::external::ExternalBackendConfig {
                    executable_path: settings.external_executable_path.clone(),
                    model_path: settings.external_model_path.clone(),
                    language: settings.external_language,
                    disable_gpu: settings.external_disable_gpu,
                    library_search_paths: Vec::new(),
                };
                Ok(Box::new(ExternalSubprocessDriver::new(config)))
            }
            // No OS speech-recognition binding ships in this build; a real
            // host links a platform crate and supplies a `PlatformRecognizerProvider` here.
            SpeechEngineMode::Platform => Err(TrackerError::RecognizerUnavailable("no platform recognizer is linked into this host".into())),
        }
    }
}
