//! Segment-backend global anchor search.
//!
//! Segment backends (external subprocesses that emit one finalized phrase at
//! a time, with no running cumulative transcript) can legitimately jump the
//! cursor far ahead of — or back before — the local matcher's reach, e.g.
//! when the reader skips a paragraph or repeats a line. This module looks
//! for the best place in the *whole* compact index that the current
//! hypothesis corroborates, independent of `match_start`.

use crate::script::CompactIndex;

struct AnchorCandidate {
    end_offset: usize,
    distance: usize,
    similarity: f64,
}

/// Looks for a global anchor point for `hypothesis` in `compact`, given the
/// session's current `match_start` and `recognized_char_count`.
///
/// Returns the original-text end-offset of the best anchor, or `None` if no
/// candidate clears the similarity/ambiguity bars.
pub fn find_anchor(
    compact: &CompactIndex,
    recognized_char_count: usize,
    hypothesis: &str,
) -> Option<usize> {
    let q = CompactIndex::normalize(hypothesis);
    if q.len() < 4 || q.len() > compact.len() {
        return None;
    }

    let (prefer_nearest, allow_far_jump) = classify_ambiguity(compact, &q, recognized_char_count);

    if let Some(exact) = exact_global_match(compact, &q, recognized_char_count, prefer_nearest, allow_far_jump) {
        return Some(exact);
    }

    fuzzy_anchor(compact, &q, recognized_char_count, prefer_nearest, allow_far_jump)
}

/// Step A: classify whether a repeated phrase upstream or downstream of the
/// cursor makes a far jump ambiguous (and so should be biased toward the
/// nearest candidate) or safe to commit anywhere in the script.
fn classify_ambiguity(compact: &CompactIndex, q: &[char], recognized_char_count: usize) -> (bool, bool) {
    let has_prior_exact = occurs_before(compact, q, recognized_char_count);

    let seed_len = q.len().min(6);
    let seed = &q[..seed_len];
    let has_prior_seed = occurs_before(compact, seed, recognized_char_count);
    let has_forward_duplicate_seed = count_occurrences_at_or_after(compact, seed, recognized_char_count) >= 2;

    let prefer_nearest = has_prior_exact || has_prior_seed || has_forward_duplicate_seed;
    (prefer_nearest, !prefer_nearest)
}

/// Step B: an exact substring match of the full (normalized) hypothesis,
/// preferred whenever the hypothesis is long enough to be unambiguous on its
/// own (6+ compact characters).
fn exact_global_match(
    compact: &CompactIndex,
    q: &[char],
    recognized_char_count: usize,
    prefer_nearest: bool,
    allow_far_jump: bool,
) -> Option<usize> {
    if q.len() < 6 {
        return None;
    }

    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for start in find_all_occurrences(&compact.compact_chars, q) {
        let end_offset = compact.original_end_offset(start + q.len());
        if end_offset >= recognized_char_count {
            candidates.push((end_offset, end_offset - recognized_char_count));
        }
    }

    // Per the anchor-search design, a local-distance cap applies only when
    // neither bias flag is set; with the two flags always complementary this
    // never trims anything, but the check is kept for fidelity.
    if !allow_far_jump && !prefer_nearest {
        let cap = local_distance_cap(q.len());
        candidates.retain(|&(_, d)| d <= cap);
    }

    candidates.into_iter().min_by_key(|&(_, d)| d).map(|(end_offset, _)| end_offset)
}

/// Steps C/D: fuzzy candidate search plus phased selection, used when no
/// exact match is available.
fn fuzzy_anchor(
    compact: &CompactIndex,
    q: &[char],
    recognized_char_count: usize,
    prefer_nearest: bool,
    allow_far_jump: bool,
) -> Option<usize> {
    let compact_len = compact.len();
    if compact_len < q.len() {
        return None;
    }
    let max_start = compact_len - q.len();

    let mut starts: Vec<usize> = (0..=max_start)
        .filter(|&i| compact.compact_chars[i] == q[0])
        .collect();

    if starts.len() > 240 && q.len() > 1 {
        starts.retain(|&i| compact.compact_chars.get(i + 1) == Some(&q[1]));
    }
    if starts.is_empty() {
        let stride = (q.len() / 3).max(1);
        starts = (0..=max_start).step_by(stride).collect();
    }
    if starts.len() > 320 {
        let keep_stride = (starts.len() as f64 / 320.0).ceil() as usize;
        starts = starts.iter().step_by(keep_stride.max(1)).copied().collect();
    }

    let mut threshold = similarity_threshold(q.len());
    if prefer_nearest {
        threshold = (threshold - 0.12).max(0.32);
    }

    let strict_limit = local_distance_cap(q.len());
    let soft_limit = soft_jump_limit(q.len());
    let q_string: String = q.iter().collect();

    let mut candidates: Vec<AnchorCandidate> = Vec::new();
    for start in starts {
        let end = start + q.len();
        if end > compact_len {
            continue;
        }
        let window = &compact.compact_chars[start..end];

        if q.len() >= 8 {
            let prefix = &q[..3.min(q.len())];
            let suffix = &q[q.len() - 3.min(q.len())..];
            let hits = prefix.iter().any(|c| window.contains(c)) || suffix.iter().any(|c| window.contains(c));
            if !hits {
                continue;
            }
        }

        let window_string: String = window.iter().collect();
        let dist = strsim::levenshtein(&q_string, &window_string);
        let similarity = 1.0 - (dist as f64 / q.len() as f64);
        if similarity < threshold {
            continue;
        }

        let end_offset = compact.original_end_offset(end);
        if end_offset < recognized_char_count {
            continue;
        }
        let distance = end_offset - recognized_char_count;

        // Vacuous given the complementary bias flags (see exact_global_match);
        // kept so the filter reads the same as the anchor-search design.
        if distance > strict_limit && !allow_far_jump && !prefer_nearest {
            continue;
        }

        if distance > soft_limit && similarity < 0.82 {
            continue;
        }

        candidates.push(AnchorCandidate { end_offset, distance, similarity });
    }

    if candidates.is_empty() {
        return None;
    }

    if prefer_nearest {
        candidates.sort_by(|a, b| rank(&a, &b));
        return Some(candidates[0].end_offset);
    }

    let best_similarity = candidates.iter().map(|c| c.similarity).fold(f64::MIN, f64::max);

    let local_bias_limit = local_bias_limit(q.len());
    let phase1_floor = (threshold + 0.08).max(best_similarity - 0.10);
    let mut phase1: Vec<&AnchorCandidate> = candidates
        .iter()
        .filter(|c| c.distance <= local_bias_limit && c.similarity >= phase1_floor)
        .collect();
    if !phase1.is_empty() {
        phase1.sort_by(|a, b| rank(a, b));
        return Some(phase1[0].end_offset);
    }

    if !allow_far_jump {
        return None;
    }

    let slack = jump_slack(q.len());
    let phase2_floor = threshold.max(best_similarity - slack);
    let mut phase2: Vec<&AnchorCandidate> = candidates.iter().filter(|c| c.similarity >= phase2_floor).collect();
    if phase2.is_empty() {
        return None;
    }
    phase2.sort_by(|a, b| rank(a, b));
    Some(phase2[0].end_offset)
}

fn rank(a: &&AnchorCandidate, b: &&AnchorCandidate) -> std::cmp::Ordering {
    a.distance
        .cmp(&b.distance)
        .then_with(|| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| a.end_offset.cmp(&b.end_offset))
}

fn similarity_threshold(q_len: usize) -> f64 {
    if q_len <= 7 {
        0.45
    } else if q_len <= 11 {
        0.52
    } else {
        0.58
    }
}

fn local_distance_cap(q_len: usize) -> usize {
    (q_len * 6).clamp(70, 220)
}

fn local_bias_limit(q_len: usize) -> usize {
    if q_len <= 7 {
        220
    } else if q_len <= 11 {
        320
    } else if q_len <= 20 {
        450
    } else {
        600
    }
}

fn soft_jump_limit(q_len: usize) -> usize {
    if q_len <= 7 {
        420
    } else if q_len <= 11 {
        700
    } else if q_len <= 20 {
        1000
    } else {
        usize::MAX
    }
}

fn jump_slack(q_len: usize) -> f64 {
    if q_len <= 7 {
        0.02
    } else if q_len <= 11 {
        0.05
    } else {
        0.08
    }
}

fn occurs_before(compact: &CompactIndex, needle: &[char], before_offset: usize) -> bool {
    if needle.is_empty() || needle.len() > compact.len() {
        return false;
    }
    find_all_occurrences(&compact.compact_chars, needle)
        .into_iter()
        .any(|start| compact.original_end_offset(start + needle.len()) < before_offset)
}

fn count_occurrences_at_or_after(compact: &CompactIndex, needle: &[char], at_or_after_offset: usize) -> usize {
    if needle.is_empty() || needle.len() > compact.len() {
        return 0;
    }
    find_all_occurrences(&compact.compact_chars, needle)
        .into_iter()
        .filter(|&start| compact.original_end_offset(start) >= at_or_after_offset)
        .count()
}

fn find_all_occurrences(haystack: &[char], needle: &[char]) -> Vec<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }
    (0..=haystack.len() - needle.len())
        .filter(|&start| &haystack[start..start + needle.len()] == needle)
        .collect()
}
