//! Fuzzy cursor matcher.
//!
//! Combines the character- and word-level tail matchers for steady local
//! progress, and layers a segment-backend global anchor search with
//! far-jump debouncing on top for backends that emit one finalized phrase
//! at a time rather than a running cumulative transcript.

mod anchor;
mod char_match;
mod word_match;

use chrono::{DateTime, Utc};

use crate::script::{CompactIndex, PageChars};

/// Which transcription backend produced the hypothesis being matched.
///
/// Cumulative backends (the platform recognizer) re-emit the whole
/// transcript-so-far on every update, so the local matchers alone are
/// sufficient. Segment backends (the external subprocess driver) emit one
/// finalized phrase at a time with no running context, so they also get the
/// global anchor search and its ceiling on local-matcher overreach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Cumulative,
    Segment,
}

#[derive(Debug, Clone)]
struct PendingAnchorJump {
    target: usize,
    hits: u32,
    timestamp: DateTime<Utc>,
}

const PENDING_JUMP_WINDOW_MS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub recognized_char_count: usize,
    pub match_start: usize,
}

/// Per-session matcher state. A fresh instance is built on `start(page)` and
/// discarded on `stop()`.
#[derive(Debug, Default)]
pub struct FuzzyMatcher {
    pending_jump: Option<PendingAnchorJump>,
}

impl FuzzyMatcher {
    pub fn new() -> Self {
        Self { pending_jump: None }
    }

    /// Drops any in-flight far-jump debounce state, e.g. on an explicit
    /// `jump_to` or a mode change.
    pub fn reset(&mut self) {
        self.pending_jump = None;
    }

    /// Folds one hypothesis update into the session's cursor.
    ///
    /// `recognized_char_count` and `match_start` never move backward:
    /// callers pass in the session's current values and get back values
    /// that are greater than or equal to them (clamped to the page length).
    pub fn update(
        &mut self,
        page: &PageChars,
        compact: &CompactIndex,
        match_start: usize,
        recognized_char_count: usize,
        hypothesis: &str,
        backend_kind: BackendKind,
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        self.expire_stale_pending_jump(now);

        let tail = page.tail(match_start);
        let char_advance = char_match::match_tail(&tail, hypothesis);
        let word_advance = word_match::match_tail(&tail, hypothesis);
        let mut base_advance = char_advance.max(word_advance);

        let q_len = CompactIndex::normalize(hypothesis).len();

        if backend_kind == BackendKind::Segment {
            base_advance = base_advance.min(base_matcher_ceiling(q_len));
        }

        let mut new_recognized = (match_start + base_advance)
            .min(page.len())
            .max(recognized_char_count);

        if backend_kind == BackendKind::Segment {
            if let Some(anchor_offset) = anchor::find_anchor(compact, recognized_char_count, hypothesis) {
                let far_threshold = far_jump_threshold(q_len);
                let is_far_jump = anchor_offset > recognized_char_count.saturating_add(far_threshold);

                if is_far_jump {
                    if self.commit_far_jump(anchor_offset, q_len, now) && anchor_offset > new_recognized {
                        new_recognized = anchor_offset;
                    }
                } else if anchor_offset > new_recognized {
                    self.pending_jump = None;
                    new_recognized = anchor_offset;
                }
            }
        }

        new_recognized = new_recognized.clamp(recognized_char_count, page.len());

        let new_match_start = if backend_kind == BackendKind::Segment && new_recognized > recognized_char_count {
            new_recognized.saturating_sub(24)
        } else {
            match_start
        }
        .min(new_recognized);

        MatchOutcome {
            recognized_char_count: new_recognized,
            match_start: new_match_start,
        }
    }

    fn expire_stale_pending_jump(&mut self, now: DateTime<Utc>) {
        if let Some(pending) = &self.pending_jump {
            if (now - pending.timestamp).num_milliseconds() > PENDING_JUMP_WINDOW_MS {
                self.pending_jump = None;
            }
        }
    }

    /// Debounces a far jump: commits only once the same target (within
    /// tolerance) is observed a second time inside the debounce window.
    fn commit_far_jump(&mut self, target: usize, q_len: usize, now: DateTime<Utc>) -> bool {
        let tolerance = pending_jump_tolerance(q_len);

        let matches_pending = self
            .pending_jump
            .as_ref()
            .map(|p| target.abs_diff(p.target) <= tolerance)
            .unwrap_or(false);

        if matches_pending {
            let pending = self.pending_jump.as_mut().unwrap();
            pending.hits += 1;
            pending.timestamp = now;
            if pending.hits >= 2 {
                self.pending_jump = None;
                return true;
            }
            false
        } else {
            self.pending_jump = Some(PendingAnchorJump { target, hits: 1, timestamp: now });
            false
        }
    }
}

fn base_matcher_ceiling(q_len: usize) -> usize {
    (q_len * 7).clamp(28, 180)
}

fn far_jump_threshold(q_len: usize) -> usize {
    (q_len * 7).clamp(90, 260)
}

fn pending_jump_tolerance(q_len: usize) -> usize {
    (q_len * 6).max(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::PageChars;

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup(page: &str) -> (PageChars, CompactIndex) {
        let chars = PageChars::new(page);
        let compact = CompactIndex::build(&chars);
        (chars, compact)
    }

    #[test]
    fn cumulative_backend_tracks_growing_hypothesis() {
        let page_text = "Hello world from the teleprompter.";
        let (page, compact) = setup(page_text);
        let mut matcher = FuzzyMatcher::new();

        let mut recognized = 0;
        let mut match_start = 0;
        for hyp in ["hello", "hello world", "hello world from", "hello world from the teleprompter"] {
            let outcome = matcher.update(&page, &compact, match_start, recognized, hyp, BackendKind::Cumulative, now());
            recognized = outcome.recognized_char_count;
            match_start = outcome.match_start;
        }

        assert_eq!(recognized, page.len());
        assert_eq!(match_start, 0, "cumulative backend never advances match_start");
    }

    #[test]
    fn recognized_char_count_never_regresses() {
        let (page, compact) = setup("one two three four five");
        let mut matcher = FuzzyMatcher::new();
        let first = matcher.update(&page, &compact, 0, 0, "one two three", BackendKind::Cumulative, now());
        let second = matcher.update(&page, &compact, first.match_start, first.recognized_char_count, "o", BackendKind::Cumulative, now());
        assert!(second.recognized_char_count >= first.recognized_char_count);
    }

    #[test]
    fn segment_backend_advances_match_start_after_commit() {
        let (page, compact) = setup("the product is fast. the product is cheap. the product is easy.");
        let mut matcher = FuzzyMatcher::new();
        let outcome = matcher.update(&page, &compact, 0, 0, "the product is fast", BackendKind::Segment, now());
        assert!(outcome.recognized_char_count > 0);
        assert_eq!(outcome.match_start, outcome.recognized_char_count.saturating_sub(24));
    }

    #[test]
    fn far_jump_requires_two_consistent_hits() {
        let page_text = "intro remarks to open the evening. ".to_string()
            + &"some filler content to pad the script out further. ".repeat(5)
            + "the keynote address begins now.";
        let (page, compact) = setup(&page_text);
        let mut matcher = FuzzyMatcher::new();

        // First report: the anchor is far beyond the cursor, so it only
        // registers as a pending jump rather than committing outright.
        let first = matcher.update(&page, &compact, 0, 0, "the keynote address begins", BackendKind::Segment, now());
        assert!(first.recognized_char_count < 200, "should not jump on the first hit alone");

        // A second, consistent report within the debounce window commits it.
        let second = matcher.update(
            &page,
            &compact,
            first.match_start,
            first.recognized_char_count,
            "the keynote address begins",
            BackendKind::Segment,
            now(),
        );
        assert!(second.recognized_char_count > first.recognized_char_count + 100);
    }
}
