//! Scoring of completion candidates against the word being typed.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

const PREFIX_BONUS: i64 = 1000;
const EXACT_BONUS: i64 = 2000;

/// Case-insensitive skim matcher with bonuses for prefix and exact hits, so
/// `vol` ranks `volume` above `avoid_lock`.
pub struct Ranker {
    matcher: SkimMatcherV2,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new()
    }
}

impl Ranker {
    pub fn new() -> Self {
        Self {
            matcher: SkimMatcherV2::default(),
        }
    }

    /// Score of `text` for `partial`, `None` if it does not match at all.
    /// An empty partial matches everything with score zero.
    pub fn score(&self, partial: &str, text: &str) -> Option<i64> {
        if partial.is_empty() {
            return Some(0);
        }
        let partial = partial.to_lowercase();
        let text = text.to_lowercase();
        let base = self.matcher.fuzzy_match(&text, &partial)?;
        let bonus = if text == partial {
            EXACT_BONUS
        } else if text.starts_with(&partial) {
            PREFIX_BONUS
        } else {
            0
        };
        Some(base + bonus)
    }

    /// Keep the items matching `partial`, best first. Equal scores keep
    /// their input order.
    pub fn rank<T>(&self, partial: &str, items: Vec<T>, text: impl Fn(&T) -> &str) -> Vec<T> {
        let mut scored: Vec<(i64, T)> = items
            .into_iter()
            .filter_map(|item| self.score(partial, text(&item)).map(|s| (s, item)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, item)| item).collect()
    }
}
