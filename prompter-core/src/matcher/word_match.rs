//! Word-level tail matcher.
//!
//! Tokenizes the remaining script and the hypothesis on whitespace and walks
//! them in lockstep using a fuzzy token comparison, tolerant of stand-in
//! annotation tokens (stage directions, bracketed cues) that the reader never
//! speaks aloud but that should still advance the cursor.

const RESYNC_LOOKAHEAD: usize = 3;

/// Returns the tail-relative character offset of the last confirmed match.
pub fn match_tail(tail: &str, hypothesis: &str) -> usize {
    let script_tokens = tokenize_with_offsets(tail);
    let hyp_tokens: Vec<&str> = hypothesis.split_whitespace().collect();

    let mut si = 0;
    let mut hi = 0;
    let mut last_progress = 0;

    while si < script_tokens.len() && hi < hyp_tokens.len() {
        let (stok, send) = &script_tokens[si];

        if is_annotation_token(stok) {
            last_progress = *send;
            si += 1;
            continue;
        }

        if is_fuzzy_match(stok, hyp_tokens[hi]) {
            last_progress = *send;
            si += 1;
            hi += 1;
            continue;
        }

        let mut resynced = false;
        for look in 1..=RESYNC_LOOKAHEAD {
            if hi + look < hyp_tokens.len() && is_fuzzy_match(stok, hyp_tokens[hi + look]) {
                hi += look;
                resynced = true;
                break;
            }
        }
        if resynced {
            continue;
        }

        for look in 1..=RESYNC_LOOKAHEAD {
            if si + look < script_tokens.len()
                && is_fuzzy_match(&script_tokens[si + look].0, hyp_tokens[hi])
            {
                si += look;
                resynced = true;
                break;
            }
        }
        if resynced {
            continue;
        }

        // Neither side re-syncs: treat the hypothesis token as a hallucinated
        // insertion and drop it without crediting or advancing the script.
        hi += 1;
    }

    // Trailing annotation tokens (e.g. a closing stage direction) are never
    // spoken; consume and credit them once the spoken words run out.
    while si < script_tokens.len() && is_annotation_token(&script_tokens[si].0) {
        last_progress = script_tokens[si].1;
        si += 1;
    }

    last_progress
}

/// Splits `text` on whitespace, returning each token with the character
/// offset (within `text`) immediately after it.
fn tokenize_with_offsets(text: &str) -> Vec<(String, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        tokens.push((chars[start..i].iter().collect(), i));
    }
    tokens
}

/// A script token that carries no spoken content — a bracketed cue, or a
/// token with no letters or digits at all.
fn is_annotation_token(token: &str) -> bool {
    (token.starts_with('[') && token.ends_with(']'))
        || !token.chars().any(|c| c.is_alphanumeric())
}

/// Tiered fuzzy comparison between a script token and a hypothesis token.
fn is_fuzzy_match(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return true;
    }
    if a.starts_with(&b) || b.starts_with(&a) {
        return true;
    }
    if a.contains(&b) || b.contains(&a) {
        return true;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let min_len = a_chars.len().min(b_chars.len());
    if min_len >= 2 {
        let shared_prefix = a_chars
            .iter()
            .zip(b_chars.iter())
            .take_while(|(x, y)| x == y)
            .count();
        let required = ((0.6 * min_len as f64).round() as usize).max(2);
        if shared_prefix >= required {
            return true;
        }
    }

    let max_len = a_chars.len().max(b_chars.len());
    let threshold = if max_len <= 4 {
        1
    } else if max_len <= 8 {
        2
    } else {
        max_len / 3
    };
    strsim::levenshtein(&a, &b) <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_words_credit_through_trailing_punctuation() {
        let tail = "Hello world from the teleprompter.";
        assert_eq!(match_tail(tail, "hello world from the teleprompter"), 34);
    }

    #[test]
    fn bracketed_annotation_is_auto_consumed() {
        let tail = "Welcome [smile] to the show";
        // the reader never says "smile"; it should still be credited once
        // "welcome" and "to the show" are both confirmed.
        let got = match_tail(tail, "welcome to the show");
        assert_eq!(got, tail.chars().count());
    }

    #[test]
    fn hallucinated_insertion_is_dropped_without_credit() {
        let tail = "the product is fast";
        let got = match_tail(tail, "the um product is fast");
        assert_eq!(got, tail.chars().count());
    }

    #[test]
    fn fuzzy_prefix_tolerates_stt_suffix_noise() {
        assert!(is_fuzzy_match("teleprompter.", "teleprompter"));
        assert!(is_fuzzy_match("running", "run"));
    }
}
