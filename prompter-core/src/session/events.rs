//! Published session state: the small record the Session Controller fans
//! out to UI subscribers (spec §6 "Published").
//!
//! camelCase fields, lowercase enum tags — even though this crate has no
//! IPC channel of its own; a thin host binary is expected to forward this
//! struct verbatim.

use serde::{Deserialize, Serialize};

const AUDIO_LEVEL_RING_CAPACITY: usize = 30;
const SPEAKING_WINDOW: usize = 10;
const SPEAKING_THRESHOLD: f32 = 0.08;

/// Last 30 RMS levels, most-recent-last, with the derived speaking flag.
#[derive(Debug, Clone)]
pub struct AudioLevelRing {
    levels: Vec<f32>,
}

impl Default for AudioLevelRing {
    fn default() -> Self {
        Self { levels: Vec::with_capacity(AUDIO_LEVEL_RING_CAPACITY) }
    }
}

impl AudioLevelRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: f32) {
        if self.levels.len() == AUDIO_LEVEL_RING_CAPACITY {
            self.levels.remove(0);
        }
        self.levels.push(level);
    }

    /// Snapshot padded with leading zeros up to capacity, most-recent-last.
    pub fn snapshot(&self) -> [f32; AUDIO_LEVEL_RING_CAPACITY] {
        let mut out = [0.0f32; AUDIO_LEVEL_RING_CAPACITY];
        let start = AUDIO_LEVEL_RING_CAPACITY - self.levels.len();
        out[start..].copy_from_slice(&self.levels);
        out
    }

    /// `mean(last 10) > 0.08`.
    pub fn is_speaking(&self) -> bool {
        if self.levels.is_empty() {
            return false;
        }
        let window = &self.levels[self.levels.len().saturating_sub(SPEAKING_WINDOW)..];
        let mean = window.iter().sum::<f32>() / window.len() as f32;
        mean > SPEAKING_THRESHOLD
    }
}

/// The Session Controller's published state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub recognized_char_count: usize,
    pub is_listening: bool,
    pub error: Option<String>,
    pub audio_levels: [f32; AUDIO_LEVEL_RING_CAPACITY],
    pub last_spoken_text: String,
    pub is_speaking: bool,
    /// Edge trigger: true for exactly the snapshot where the session reaches
    /// the end of the final page. Consumers should treat it as a one-shot
    /// pulse, not a sticky flag.
    pub should_dismiss: bool,
    /// Edge trigger: true for exactly the snapshot where `auto_next_page`
    /// fires after `auto_next_page_delay` at the end of a non-final page.
    pub should_advance_page: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            recognized_char_count: 0,
            is_listening: false,
            error: None,
            audio_levels: [0.0; AUDIO_LEVEL_RING_CAPACITY],
            last_spoken_text: String::new(),
            is_speaking: false,
            should_dismiss: false,
            should_advance_page: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_level_ring_reports_not_speaking_when_empty() {
        let ring = AudioLevelRing::new();
        assert!(!ring.is_speaking());
        assert_eq!(ring.snapshot(), [0.0; AUDIO_LEVEL_RING_CAPACITY]);
    }

    #[test]
    fn audio_level_ring_derives_speaking_from_last_ten_mean() {
        let mut ring = AudioLevelRing::new();
        for _ in 0..20 {
            ring.push(0.01);
        }
        for _ in 0..10 {
            ring.push(0.2);
        }
        assert!(ring.is_speaking());
    }

    #[test]
    fn audio_level_ring_evicts_oldest_past_capacity() {
        let mut ring = AudioLevelRing::new();
        for i in 0..40 {
            ring.push(i as f32);
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot[29], 39.0);
        assert_eq!(snapshot[0], 10.0);
    }

    #[test]
    fn session_snapshot_serializes_with_camel_case_fields() {
        let snapshot = SessionSnapshot { recognized_char_count: 12, is_listening: true, ..SessionSnapshot::default() };
        let json = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(json["recognizedCharCount"], 12);
        assert_eq!(json["isListening"], true);
        assert_eq!(json["shouldDismiss"], false);
    }
}
