//! Subprocess lifecycle: executable validation, argument/environment
//! construction, spawn, and stdout/stderr event plumbing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::config::ExternalLanguage;
use crate::error::{Result, TrackerError};
use crate::matcher::BackendKind;

use super::parser::{is_error_line, is_transcript_candidate, sanitize, strip_ansi_csi, DedupGate, LineAccumulator};
use crate::backend::{BackendEvent, TranscriptionBackend};

const EXECUTABLE_MARKER: &str = "sense-voice-stream";

#[derive(Debug, Clone)]
pub struct ExternalBackendConfig {
    pub executable_path: String,
    pub model_path: String,
    pub language: ExternalLanguage,
    pub disable_gpu: bool,
    pub library_search_paths: Vec<PathBuf>,
}

pub struct ExternalSubprocessDriver {
    config: ExternalBackendConfig,
    child: Option<Child>,
    intentional_stop: Arc<AtomicBool>,
}

impl ExternalSubprocessDriver {
    pub fn new(config: ExternalBackendConfig) -> Self {
        Self { config, child: None, intentional_stop: Arc::new(AtomicBool::new(false)) }
    }
}

impl TranscriptionBackend for ExternalSubprocessDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Segment
    }

    fn start(&mut self, runtime: &tokio::runtime::Handle, sink: UnboundedSender<BackendEvent>) -> Result<()> {
        if self.config.executable_path.trim().is_empty() || self.config.model_path.trim().is_empty() {
            return Err(TrackerError::InvalidConfiguration("missing executable or model path".into()));
        }

        let resolved_path = validate_executable(Path::new(&self.config.executable_path))
            .map_err(|_| TrackerError::InvalidConfiguration(format!("no valid executable at '{}'", self.config.executable_path)))?;

        let args = build_args(&self.config);
        let mut command = Command::new(&resolved_path);
        command
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let exe_dir = resolved_path.parent().unwrap_or_else(|| Path::new("."));
        let mut library_paths = self.config.library_search_paths.clone();
        library_paths.extend(resolve_library_paths(exe_dir));
        apply_library_search_path(&mut command, std::env::var(library_path_env_var()).ok().as_deref(), &library_paths);

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(|e| TrackerError::BackendSpawnFailed {
            path: resolved_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");
        self.intentional_stop.store(false, Ordering::SeqCst);

        spawn_reader(runtime, stdout, sink.clone(), self.intentional_stop.clone(), false);
        spawn_reader(runtime, stderr, sink.clone(), self.intentional_stop.clone(), true);

        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        self.intentional_stop.store(true, Ordering::SeqCst);
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

fn spawn_reader<R>(
    runtime: &tokio::runtime::Handle,
    io: R,
    sink: UnboundedSender<BackendEvent>,
    intentional_stop: Arc<AtomicBool>,
    is_stderr: bool,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    runtime.spawn(async move {
        let mut lines = BufReader::new(io).lines();
        let mut accumulator = LineAccumulator::new();
        let mut dedup = DedupGate::new();

        loop {
            match lines.next_line().await {
                Ok(Some(raw)) => {
                    for line in accumulator.feed(&raw) {
                        handle_line(&line, is_stderr, &mut dedup, &sink);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "subprocess pipe read failed");
                    break;
                }
            }
        }

        if !intentional_stop.load(Ordering::SeqCst) && !is_stderr {
            let _ = sink.send(BackendEvent::Exited);
        }
    });
}

fn handle_line(raw: &str, is_stderr: bool, dedup: &mut DedupGate, sink: &UnboundedSender<BackendEvent>) {
    let stripped = strip_ansi_csi(raw);

    if is_stderr {
        if is_error_line(&stripped) {
            let _ = sink.send(BackendEvent::Error(stripped));
        }
        return;
    }

    if !is_transcript_candidate(&stripped) {
        debug!(line = %stripped, "non-transcript stdout line ignored");
        return;
    }

    let text = sanitize(&stripped);
    if text.is_empty() {
        return;
    }
    if dedup.should_emit(&text) {
        let _ = sink.send(BackendEvent::Hypothesis(text));
    }
}

/// Builds the stable CLI contract (§6): model/language/VAD flags, plus
/// `-ng` iff GPU is disabled.
fn build_args(config: &ExternalBackendConfig) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        config.model_path.clone(),
        "-l".to_string(),
        language_flag(config.language).to_string(),
        "--use-vad".to_string(),
        "--chunk-size".to_string(),
        "80".to_string(),
        "-mmc".to_string(),
        "8".to_string(),
        "-mnc".to_string(),
        "120".to_string(),
        "--speech-prob-threshold".to_string(),
        "0.2".to_string(),
    ];
    if config.disable_gpu {
        args.push("-ng".to_string());
    }
    args
}

fn language_flag(language: ExternalLanguage) -> &'static str {
    match language {
        ExternalLanguage::Auto => "auto",
        ExternalLanguage::Zh => "zh",
        ExternalLanguage::En => "en",
        ExternalLanguage::Yue => "yue",
        ExternalLanguage::Ja => "ja",
        ExternalLanguage::Ko => "ko",
    }
}

fn library_path_env_var() -> &'static str {
    if cfg!(target_os = "macos") {
        "DYLD_LIBRARY_PATH"
    } else if cfg!(windows) {
        "PATH"
    } else {
        "LD_LIBRARY_PATH"
    }
}

fn apply_library_search_path(command: &mut Command, inherited: Option<&str>, new_paths: &[PathBuf]) {
    let merged = merge_library_search_paths(inherited, new_paths);
    if !merged.is_empty() {
        command.env(library_path_env_var(), merged);
    }
}

/// Derives the dynamic-linker search path implied by the executable's own
/// location (§4.3 "Library-path resolution"): `../lib` and `../../lib`
/// relative to `exe_dir`, plus `exe_dir` itself. Nonexistent directories
/// are dropped; the remaining entries keep this order with duplicates
/// removed.
fn resolve_library_paths(exe_dir: &Path) -> Vec<PathBuf> {
    let candidates = [exe_dir.join("..").join("lib"), exe_dir.join("..").join("..").join("lib"), exe_dir.to_path_buf()];

    let mut seen = std::collections::HashSet::new();
    candidates.into_iter().filter(|p| p.is_dir()).filter(|p| seen.insert(p.clone())).collect()
}

/// Prepends `new_paths` onto `inherited`, deduplicating while preserving
/// the first occurrence of each entry.
pub fn merge_library_search_paths(inherited: Option<&str>, new_paths: &[PathBuf]) -> String {
    let separator = if cfg!(windows) { ';' } else { ':' };
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();

    for path in new_paths {
        let s = path.to_string_lossy().to_string();
        if !s.is_empty() && seen.insert(s.clone()) {
            merged.push(s);
        }
    }
    if let Some(existing) = inherited {
        for part in existing.split(separator) {
            if !part.is_empty() && seen.insert(part.to_string()) {
                merged.push(part.to_string());
            }
        }
    }

    merged.join(&separator.to_string())
}

/// Validates `path` as an invocable `sense-voice-stream` binary: exists,
/// basename carries the marker, executable (chmod 0755 fallback on Unix).
/// Falls back to probing default install locations if `path` is invalid.
pub fn validate_executable(path: &Path) -> std::result::Result<PathBuf, ()> {
    if let Some(valid) = validate_candidate(path) {
        return Ok(valid);
    }
    default_install_locations().into_iter().find_map(|candidate| validate_candidate(&candidate)).ok_or(())
}

fn validate_candidate(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() || !path.is_file() {
        return None;
    }
    let basename = path.file_name()?.to_string_lossy();
    if !basename.contains(EXECUTABLE_MARKER) {
        return None;
    }
    ensure_executable(path).then(|| path.to_path_buf())
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let Ok(metadata) = std::fs::metadata(path) else { return false };
    let mode = metadata.permissions().mode();
    if mode & 0o111 != 0 {
        return true;
    }
    let mut perms = metadata.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).is_ok()
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> bool {
    true
}

fn default_install_locations() -> Vec<PathBuf> {
    let Some(home) = dirs::home_dir() else { return Vec::new() };
    let binary_name = if cfg!(windows) { "sense-voice-stream.exe" } else { "sense-voice-stream" };
    vec![
        home.join(".prompter").join("bin").join(binary_name),
        home.join(".local").join("bin").join(binary_name),
        home.join("Applications").join("sense-voice-stream").join(binary_name),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_matches_stable_cli_contract() {
        let config = ExternalBackendConfig {
            executable_path: "sense-voice-stream".into(),
            model_path: "/models/sense.bin".into(),
            language: ExternalLanguage::Zh,
            disable_gpu: false,
            library_search_paths: Vec::new(),
        };
        let args = build_args(&config);
        assert_eq!(
            args,
            vec!["-m", "/models/sense.bin", "-l", "zh", "--use-vad", "--chunk-size", "80", "-mmc", "8", "-mnc", "120", "--speech-prob-threshold", "0.2"]
        );
    }

    #[test]
    fn build_args_appends_no_gpu_flag_when_disabled() {
        let config = ExternalBackendConfig {
            executable_path: "sense-voice-stream".into(),
            model_path: "/models/sense.bin".into(),
            language: ExternalLanguage::Auto,
            disable_gpu: true,
            library_search_paths: Vec::new(),
        };
        assert_eq!(build_args(&config).last(), Some(&"-ng".to_string()));
    }

    #[test]
    fn merge_library_search_paths_prepends_and_dedupes() {
        let new_paths = vec![PathBuf::from("/opt/sense/lib"), PathBuf::from("/usr/lib")];
        let merged = merge_library_search_paths(Some("/usr/lib:/usr/local/lib"), &new_paths);
        assert_eq!(merged, "/opt/sense/lib:/usr/lib:/usr/local/lib");
    }

    #[test]
    fn merge_library_search_paths_with_no_inherited_value() {
        let new_paths = vec![PathBuf::from("/opt/sense/lib")];
        assert_eq!(merge_library_search_paths(None, &new_paths), "/opt/sense/lib");
    }

    #[test]
    fn resolve_library_paths_collects_existing_dirs_relative_to_exe_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        // root/install/bin is the executable directory; root/lib and
        // root/install/lib are the two candidate sibling "lib" dirs.
        let exe_dir = root.path().join("install").join("bin");
        std::fs::create_dir_all(&exe_dir).expect("mkdir exe_dir");
        std::fs::create_dir_all(root.path().join("install").join("lib")).expect("mkdir ../lib");
        std::fs::create_dir_all(root.path().join("lib")).expect("mkdir ../../lib");

        let resolved = resolve_library_paths(&exe_dir);

        assert_eq!(resolved, vec![exe_dir.join("..").join("lib"), exe_dir.join("..").join("..").join("lib"), exe_dir.clone()]);
    }

    #[test]
    fn resolve_library_paths_drops_nonexistent_candidates() {
        let root = tempfile::tempdir().expect("tempdir");
        let exe_dir = root.path().join("bin");
        std::fs::create_dir_all(&exe_dir).expect("mkdir exe_dir");
        // Neither `../lib` nor `../../lib` exists under a bare tempdir.

        let resolved = resolve_library_paths(&exe_dir);

        assert_eq!(resolved, vec![exe_dir]);
    }

    #[test]
    fn validate_executable_rejects_wrong_basename() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("some-other-binary");
        std::fs::write(&path, b"#!/bin/sh\n").expect("write");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        assert!(validate_candidate(&path).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn validate_executable_chmods_a_non_executable_marker_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sense-voice-stream");
        std::fs::write(&path, b"#!/bin/sh\n").expect("write");

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).expect("chmod");

        let validated = validate_candidate(&path).expect("should validate after chmod");
        let mode = std::fs::metadata(&validated).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
