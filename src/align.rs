//! Transcript overlap alignment
//!
//! Consecutive sliding-window transcription passes re-cover a few seconds of
//! audio, so each new pass usually restates the tail of the previous one.
//! `align_overlap` finds that restated run and returns only the novel suffix.

use tracing::debug;

/// Shortest suffix/prefix run accepted as evidence of overlap; shorter runs
/// false-positive on common words
const MIN_LOOKBACK_WORDS: usize = 3;

/// Token-wise match ratio a candidate must exceed to be accepted
const MATCH_RATIO: f64 = 0.7;

/// Remove from `new_text` the leading portion that restates the tail of
/// `previous_text`, searching the first `overlap_threshold` tokens of each.
///
/// The search is greedy: candidate suffix lengths are tried longest-first,
/// offsets first-match-wins, and the first candidate whose case-insensitive
/// token match ratio exceeds 0.7 decides the cut. Stateless and
/// deterministic; with no acceptable candidate the whole of `new_text` is
/// returned.
pub fn align_overlap(previous_text: &str, new_text: &str, overlap_threshold: usize) -> String {
    if previous_text.is_empty() {
        debug!("No previous text, returning all new text");
        return new_text.to_string();
    }

    if new_text.is_empty() {
        return String::new();
    }

    let prev_words: Vec<&str> = previous_text.split_whitespace().collect();
    let new_words: Vec<&str> = new_text.split_whitespace().collect();

    if prev_words.is_empty() || new_words.is_empty() {
        return new_text.to_string();
    }

    let mut cut = 0;

    'search: for lookback in (MIN_LOOKBACK_WORDS..=overlap_threshold.min(prev_words.len())).rev() {
        let prev_suffix = &prev_words[prev_words.len() - lookback..];
        let max_offset = overlap_threshold.min((new_words.len() + 1).saturating_sub(lookback));

        for offset in 0..max_offset {
            let candidate = &new_words[offset..offset + lookback];
            let matches = prev_suffix
                .iter()
                .zip(candidate)
                .filter(|(a, b)| a.to_lowercase() == b.to_lowercase())
                .count();
            let similarity = matches as f64 / lookback as f64;

            if similarity > MATCH_RATIO {
                debug!(
                    "Found text overlap: {} words matched at position {}, similarity: {:.2}",
                    lookback, offset, similarity
                );
                cut = offset + lookback;
                break 'search;
            }
        }
    }

    let remainder = new_words[cut..].join(" ");

    if cut == 0 {
        debug!("No overlap detected, returning all {} new words", new_words.len());
    } else if remainder.is_empty() {
        debug!("Complete duplicate detected, discarding {} words", new_words.len());
    } else {
        debug!(
            "Removed {} overlapping words, returning {} new words",
            cut,
            new_words.len() - cut
        );
    }

    remainder
}
