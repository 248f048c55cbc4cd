//! Engine settings: the fields an external settings layer persists and the
//! engine reads at `start()` time.
//!
//! The settings *UI* is out of scope for this crate (see spec §1's
//! out-of-scope list); this module only owns the shape, normalization, and
//! JSON load/save path, the same way the engine owns nothing about how a
//! caller got a `Script` but still owns `Script` itself.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// `speech_engine_mode` — which transcription backend variant is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechEngineMode {
    Platform,
    ExternalStream,
}

/// `external_language` — the subset of languages the external ASR binary
/// accepts on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalLanguage {
    Auto,
    Zh,
    En,
    Yue,
    Ja,
    Ko,
}

/// `listening_mode` — the engine only transcribes in `WordTracking`; the
/// other two modes are UI-only reading aids (out of scope here) that still
/// round-trip through settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    WordTracking,
    SilencePaused,
    Classic,
}

impl ListeningMode {
    /// Whether the engine should run transcription at all in this mode.
    pub fn runs_transcription(self) -> bool {
        matches!(self, ListeningMode::WordTracking)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineSettings {
    pub speech_locale: String,
    pub speech_engine_mode: SpeechEngineMode,
    pub external_executable_path: String,
    pub external_model_path: String,
    pub external_language: ExternalLanguage,
    pub external_disable_gpu: bool,
    pub listening_mode: ListeningMode,
    pub selected_mic_uid: String,
    pub auto_next_page: bool,
    pub auto_next_page_delay: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            speech_locale: "en-US".into(),
            speech_engine_mode: SpeechEngineMode::Platform,
            external_executable_path: String::new(),
            external_model_path: String::new(),
            external_language: ExternalLanguage::Auto,
            external_disable_gpu: false,
            listening_mode: ListeningMode::WordTracking,
            selected_mic_uid: String::new(),
            auto_next_page: false,
            auto_next_page_delay: 2,
        }
    }
}

impl EngineSettings {
    pub fn normalize(&mut self) {
        self.speech_locale = normalize_locale(&self.speech_locale);
        self.external_executable_path = self.external_executable_path.trim().to_string();
        self.external_model_path = self.external_model_path.trim().to_string();
        self.selected_mic_uid = self.selected_mic_uid.trim().to_string();
        self.auto_next_page_delay = self.auto_next_page_delay.clamp(0, 60);
    }
}

fn normalize_locale(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        "en-US".into()
    } else {
        trimmed.to_string()
    }
}

/// Default settings file location: `<platform data dir>/prompter/settings.json`.
pub fn default_settings_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("prompter")
        .join("settings.json")
}

pub fn load_settings(path: &Path) -> EngineSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<EngineSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &EngineSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_run_transcription_in_word_tracking_mode() {
        let settings = EngineSettings::default();
        assert!(settings.listening_mode.runs_transcription());
    }

    #[test]
    fn normalize_fills_blank_locale_and_clamps_delay() {
        let mut settings = EngineSettings {
            speech_locale: "  ".into(),
            auto_next_page_delay: 500,
            ..EngineSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.speech_locale, "en-US");
        assert_eq!(settings.auto_next_page_delay, 60);
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let mut settings = EngineSettings::default();
        settings.speech_locale = "zh-CN".into();
        settings.speech_engine_mode = SpeechEngineMode::ExternalStream;
        save_settings(&path, &settings).expect("save settings");

        let loaded = load_settings(&path);
        assert_eq!(loaded.speech_locale, "zh-CN");
        assert_eq!(loaded.speech_engine_mode, SpeechEngineMode::ExternalStream);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_settings(&dir.path().join("missing.json"));
        assert_eq!(loaded.speech_locale, "en-US");
    }
}
