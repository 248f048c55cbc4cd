//! The reference script: an ordered sequence of pages, plus the derived
//! compact index the matcher scans against.
//!
//! All offsets in this crate are **character offsets**, not byte offsets —
//! the teleprompter UI highlights by character position and scripts may
//! contain multi-byte text, so byte offsets would silently corrupt
//! highlighting on non-ASCII scripts. `Page::chars` is the canonical char
//! vector; build it once per page and reuse it rather than re-collecting
//! `str::chars()` on every matcher call.

/// An ordered sequence of pages. Only the active page is tracked by a
/// session at a time; pages advance on completion.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pages: Vec<String>,
}

impl Script {
    pub fn new(pages: Vec<String>) -> Self {
        Self { pages }
    }

    pub fn page(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A page's text as a char vector, so offset arithmetic is O(1) indexing
/// rather than repeated UTF-8 walks.
#[derive(Debug, Clone)]
pub struct PageChars {
    chars: Vec<char>,
}

impl PageChars {
    pub fn new(page: &str) -> Self {
        Self {
            chars: page.chars().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn as_slice(&self) -> &[char] {
        &self.chars
    }

    /// The substring from `start` to the end, as a `String`.
    pub fn tail(&self, start: usize) -> String {
        let start = start.min(self.chars.len());
        self.chars[start..].iter().collect()
    }
}

/// Letter/digit-only, lowercased projection of a page, plus an index back
/// to the original page's character offsets.
///
/// Built once per session on `start(page)`, discarded on `stop()`.
///
/// Invariant: `compact_chars.len() == compact_to_original.len()`, and
/// `compact_to_original` is strictly increasing (each compact character
/// corresponds to exactly one later original-text position).
#[derive(Debug, Clone, Default)]
pub struct CompactIndex {
    /// The page filtered to letters/digits, lowercased.
    pub compact_chars: Vec<char>,
    /// `compact_to_original[i]` is the 1-based end-offset (character count)
    /// in the original page after consuming compact character `i`.
    pub compact_to_original: Vec<usize>,
}

impl CompactIndex {
    pub fn build(page: &PageChars) -> Self {
        let mut compact_chars = Vec::with_capacity(page.len());
        let mut compact_to_original = Vec::with_capacity(page.len());

        for (idx, &ch) in page.as_slice().iter().enumerate() {
            if ch.is_alphanumeric() {
                let lower = ch.to_lowercase().next().unwrap_or(ch);
                compact_chars.push(lower);
                compact_to_original.push(idx + 1);
            }
        }

        Self {
            compact_chars,
            compact_to_original,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.compact_chars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.compact_chars.len()
    }

    /// Map a compact-index position (0-based, exclusive end `i`) to the
    /// original-text end-offset, i.e. the end-offset after consuming
    /// compact characters `[0, i)`.
    ///
    /// `end_compact_idx` is the number of compact characters consumed;
    /// `end_compact_idx == 0` maps to original offset `0`.
    pub fn original_end_offset(&self, end_compact_idx: usize) -> usize {
        if end_compact_idx == 0 {
            return 0;
        }
        self.compact_to_original
            .get(end_compact_idx - 1)
            .copied()
            .unwrap_or_else(|| self.compact_to_original.last().copied().unwrap_or(0))
    }

    /// Normalize a hypothesis string the same way the page was compacted:
    /// letters/digits only, lowercased.
    pub fn normalize(text: &str) -> Vec<char> {
        text.chars()
            .filter(|c| c.is_alphanumeric())
            .map(|c| c.to_lowercase().next().unwrap_or(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_index_strips_punctuation_and_lowercases() {
        let page = PageChars::new("Hello, World!");
        let idx = CompactIndex::build(&page);
        let s: String = idx.compact_chars.iter().collect();
        assert_eq!(s, "helloworld");
    }

    #[test]
    fn compact_to_original_is_strictly_increasing() {
        let page = PageChars::new("a b, c.d");
        let idx = CompactIndex::build(&page);
        for w in idx.compact_to_original.windows(2) {
            assert!(w[1] > w[0]);
        }
        assert_eq!(idx.compact_chars.len(), idx.compact_to_original.len());
    }

    #[test]
    fn original_end_offset_maps_back_correctly() {
        // "Hi [ok] there" — compact = "hiokthere"
        let page = PageChars::new("Hi [ok] there");
        let idx = CompactIndex::build(&page);
        // first two compact chars are 'h','i' -> original end offset 2
        assert_eq!(idx.original_end_offset(2), 2);
        // full compact consumed -> end offset should be position of final 'e' in "there"
        let full = idx.original_end_offset(idx.len());
        assert_eq!(full, page.len());
    }

    #[test]
    fn normalize_matches_compact_projection() {
        let hyp = "Hello, World!";
        let norm: String = CompactIndex::normalize(hyp).into_iter().collect();
        assert_eq!(norm, "helloworld");
    }
}
