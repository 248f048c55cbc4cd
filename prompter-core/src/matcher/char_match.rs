//! Character-level tail matcher.
//!
//! Walks the normalized (letters/digits only, lowercased) projection of the
//! remaining script against the normalized hypothesis with a two-pointer
//! scan, tolerating small amounts of STT noise by re-syncing a short lookahead
//! before falling back to a non-crediting substitution.

use crate::script::CompactIndex;

const RESYNC_LOOKAHEAD: usize = 3;

/// Returns the tail-relative character offset of the last confirmed match,
/// i.e. how far into `tail` the hypothesis has corroborated.
pub fn match_tail(tail: &str, hypothesis: &str) -> usize {
    let tail_chars: Vec<char> = tail.chars().collect();
    let mut compact_chars = Vec::with_capacity(tail_chars.len());
    let mut compact_offsets = Vec::with_capacity(tail_chars.len());
    for (idx, &ch) in tail_chars.iter().enumerate() {
        if ch.is_alphanumeric() {
            compact_chars.push(ch.to_lowercase().next().unwrap_or(ch));
            compact_offsets.push(idx + 1);
        }
    }

    let hyp_chars = CompactIndex::normalize(hypothesis);

    let mut ti = 0;
    let mut hi = 0;
    let mut last_confirmed = 0;

    while ti < compact_chars.len() && hi < hyp_chars.len() {
        if compact_chars[ti] == hyp_chars[hi] {
            ti += 1;
            hi += 1;
            last_confirmed = compact_offsets[ti - 1];
            continue;
        }

        let mut resynced = false;
        for look in 1..=RESYNC_LOOKAHEAD {
            if hi + look < hyp_chars.len() && compact_chars[ti] == hyp_chars[hi + look] {
                hi += look;
                resynced = true;
                break;
            }
        }
        if resynced {
            continue;
        }

        for look in 1..=RESYNC_LOOKAHEAD {
            if ti + look < compact_chars.len() && hyp_chars[hi] == compact_chars[ti + look] {
                ti += look;
                resynced = true;
                break;
            }
        }
        if resynced {
            continue;
        }

        // Neither side re-syncs within the lookahead: treat as a substitution,
        // advance both pointers, credit nothing.
        ti += 1;
        hi += 1;
    }

    last_confirmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_credits_full_tail() {
        let tail = "hello world";
        assert_eq!(match_tail(tail, "hello world"), 11);
    }

    #[test]
    fn punctuation_in_tail_is_ignored() {
        let tail = "hello, world!";
        // "world" ends at offset 11 in the tail; the trailing '!' earns no
        // credit since it was never part of the alphanumeric projection.
        assert_eq!(match_tail(tail, "hello world"), 11);
    }

    #[test]
    fn single_dropped_hypothesis_word_resyncs() {
        // hypothesis skips "quick" entirely; the scan should still make some
        // forward progress rather than stalling at the first mismatch.
        let tail = "the quick brown fox";
        let got = match_tail(tail, "the brown fox");
        assert!(got >= 13, "expected partial credit past 'the', got {got}");
    }

    #[test]
    fn empty_hypothesis_credits_nothing() {
        assert_eq!(match_tail("hello world", ""), 0);
    }
}
