//! Platform Recognizer backend variant.
//!
//! No OS speech-recognition crate lives in this workspace, so the actual
//! recognizer session is behind [`PlatformRecognizerProvider`] — a
//! dependency-inverted seam that keeps this module's locale resolution
//! and event plumbing independent of any one OS recognizer API.
//! `PlatformBackend<P>` owns locale resolution and event plumbing; `P`
//! owns the OS call.

use tokio::sync::mpsc::UnboundedSender;

use crate::buffering::chunk::AudioChunk;
use crate::error::{Result, TrackerError};
use crate::matcher::BackendKind;

use super::{BackendEvent, TranscriptionBackend};

/// Seam for the actual OS streaming recognizer session. A real build wires
/// this to Speech Framework / SAPI / equivalent; tests use a fake.
pub trait PlatformRecognizerProvider: Send {
    /// The locales this recognizer reports as installed/supported.
    fn supported_locales(&self) -> Vec<String>;

    /// Starts a recognizer session for `locale`, pushing cumulative
    /// `Transcript` text onto `sink` until `stop` is called.
    fn start_session(&mut self, locale: &str, sink: UnboundedSender<BackendEvent>) -> Result<()>;

    /// Feeds one captured audio frame (non-blocking; buffered internally),
    /// wired from `AudioCapture::set_tap` by the host.
    fn append_frame(&mut self, frame: &AudioChunk);

    fn stop_session(&mut self);
}

pub struct PlatformBackend<P: PlatformRecognizerProvider> {
    provider: P,
    script_cjk_hint: Option<char>,
    system_locale: String,
}

impl<P: PlatformRecognizerProvider> PlatformBackend<P> {
    pub fn new(provider: P, script_text: &str, system_locale: impl Into<String>) -> Self {
        Self {
            provider,
            script_cjk_hint: dominant_cjk_hint(script_text),
            system_locale: system_locale.into(),
        }
    }

    /// Resolves `preferred` against the recognizer's supported locales per
    /// the locale resolution policy, then starts a session for the result.
    pub fn configure_and_start(&mut self, preferred: &str, sink: UnboundedSender<BackendEvent>) -> Result<()> {
        let supported = self.provider.supported_locales();
        let resolved = resolve_locale(preferred, self.script_cjk_hint, &self.system_locale, &supported)
            .ok_or_else(|| TrackerError::RecognizerUnavailable("no supported locale".into()))?;
        self.provider.start_session(&resolved, sink)
    }

    /// Forwards one captured frame to the recognizer. Wire this up as the
    /// `AudioCapture::set_tap` callback while this backend is active.
    pub fn append_frame(&mut self, frame: &AudioChunk) {
        self.provider.append_frame(frame);
    }
}

impl<P: PlatformRecognizerProvider> TranscriptionBackend for PlatformBackend<P> {
    fn kind(&self) -> BackendKind {
        BackendKind::Cumulative
    }

    fn start(&mut self, _runtime: &tokio::runtime::Handle, sink: UnboundedSender<BackendEvent>) -> Result<()> {
        // The preferred locale is threaded through `configure_and_start`
        // rather than `start`, since `TranscriptionBackend::start` is
        // generic over backend variants and the external driver has no
        // equivalent concept; callers use the inherent method directly.
        let preferred = self.system_locale.clone();
        self.configure_and_start(&preferred, sink)
    }

    fn stop(&mut self) {
        self.provider.stop_session();
    }
}

/// Locale resolution policy (§4.2): prefer an exact match, then same
/// language code, then a CJK-hinted language, then system → English → any.
pub fn resolve_locale(preferred: &str, cjk_hint: Option<char>, system_locale: &str, supported: &[String]) -> Option<String> {
    if supported.is_empty() {
        return None;
    }

    if let Some(exact) = supported.iter().find(|l| l.eq_ignore_ascii_case(preferred)) {
        return Some(exact.clone());
    }

    let preferred_lang = language_code(preferred);
    if let Some(same_lang) = supported.iter().find(|l| language_code(l).eq_ignore_ascii_case(preferred_lang)) {
        return Some(same_lang.clone());
    }

    if let Some(hint) = cjk_hint {
        let hint_lang = cjk_hint_language_code(hint);
        if let Some(hinted) = supported.iter().find(|l| language_code(l).eq_ignore_ascii_case(hint_lang)) {
            return Some(hinted.clone());
        }
    }

    if let Some(sys) = supported.iter().find(|l| language_code(l).eq_ignore_ascii_case(language_code(system_locale))) {
        return Some(sys.clone());
    }

    if let Some(english) = supported.iter().find(|l| language_code(l).eq_ignore_ascii_case("en")) {
        return Some(english.clone());
    }

    supported.first().cloned()
}

fn language_code(locale: &str) -> &str {
    locale.split(['-', '_']).next().unwrap_or(locale)
}

fn cjk_hint_language_code(hint: char) -> &'static str {
    match hint {
        'H' => "zh",
        'K' => "ja",
        'G' => "ko",
        _ => "en",
    }
}

/// Counts Han, Kana, and Hangul codepoints in `text` and returns a marker
/// for whichever range dominates — `'H'` (Han), `'K'` (Kana), `'G'`
/// (Hangul) — or `None` if the script carries none of them.
pub fn dominant_cjk_hint(text: &str) -> Option<char> {
    let mut han = 0u32;
    let mut kana = 0u32;
    let mut hangul = 0u32;

    for c in text.chars() {
        let cp = c as u32;
        if is_han(cp) {
            han += 1;
        } else if is_kana(cp) {
            kana += 1;
        } else if is_hangul(cp) {
            hangul += 1;
        }
    }

    let max = han.max(kana).max(hangul);
    if max == 0 {
        return None;
    }
    if han == max {
        Some('H')
    } else if kana == max {
        Some('K')
    } else {
        Some('G')
    }
}

fn is_han(cp: u32) -> bool {
    (0x4E00..=0x9FFF).contains(&cp) || (0x3400..=0x4DBF).contains(&cp) || (0x20000..=0x2A6DF).contains(&cp)
}

fn is_kana(cp: u32) -> bool {
    (0x3040..=0x309F).contains(&cp) || (0x30A0..=0x30FF).contains(&cp)
}

fn is_hangul(cp: u32) -> bool {
    (0xAC00..=0xD7A3).contains(&cp) || (0x1100..=0x11FF).contains(&cp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_locale_is_preferred() {
        let supported = vec!["en-US".to_string(), "en-GB".to_string()];
        assert_eq!(resolve_locale("en-GB", None, "en-US", &supported), Some("en-GB".into()));
    }

    #[test]
    fn same_language_code_is_used_when_exact_is_absent() {
        let supported = vec!["en-AU".to_string(), "fr-FR".to_string()];
        assert_eq!(resolve_locale("en-US", None, "fr-FR", &supported), Some("en-AU".into()));
    }

    #[test]
    fn cjk_hint_wins_over_system_locale_when_preferred_is_unsupported() {
        let supported = vec!["fr-FR".to_string(), "ja-JP".to_string()];
        assert_eq!(resolve_locale("de-DE", Some('K'), "fr-FR", &supported), Some("ja-JP".into()));
    }

    #[test]
    fn falls_back_to_system_then_english_then_any() {
        let only_german = vec!["de-DE".to_string()];
        assert_eq!(resolve_locale("es-ES", None, "fr-FR", &only_german), Some("de-DE".into()));

        let english_and_other = vec!["ko-KR".to_string(), "en-US".to_string()];
        assert_eq!(resolve_locale("es-ES", None, "fr-FR", &english_and_other), Some("en-US".into()));
    }

    #[test]
    fn no_supported_locales_resolves_to_none() {
        assert_eq!(resolve_locale("en-US", None, "en-US", &[]), None);
    }

    #[test]
    fn dominant_cjk_hint_detects_han_over_latin() {
        assert_eq!(dominant_cjk_hint("欢迎来到 the keynote"), Some('H'));
    }

    #[test]
    fn dominant_cjk_hint_detects_kana() {
        assert_eq!(dominant_cjk_hint("ようこそ"), Some('K'));
    }

    #[test]
    fn dominant_cjk_hint_detects_hangul() {
        assert_eq!(dominant_cjk_hint("환영합니다"), Some('G'));
    }

    #[test]
    fn dominant_cjk_hint_is_none_for_plain_latin_text() {
        assert_eq!(dominant_cjk_hint("welcome to the keynote"), None);
    }
}
