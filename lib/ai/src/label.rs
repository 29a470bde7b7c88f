//! Closed label sets for classification.
//!
//! A classifier only ever answers with a value of a [`LabelSet`]. Raw model
//! output goes through [`normalize`] and is matched exactly against the set;
//! anything else resolves to the set's reserved fallback label.

use std::fmt::Debug;
use std::hash::Hash;

/// A closed, statically known set of classification labels.
pub trait LabelSet: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every label, in the order they are presented to the model.
    const ALL: &'static [Self];

    /// The label used when model output matches nothing in [`Self::ALL`].
    const FALLBACK: Self;

    /// The exact token the model is asked to emit.
    fn as_str(&self) -> &'static str;

    /// When this label applies, phrased to follow "If ".
    fn description(&self) -> &'static str;

    /// Matches normalized `raw` output against the set.
    #[must_use]
    fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize(raw);
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == normalized)
    }

    /// Like [`parse`](Self::parse), but resolves unknown output to
    /// [`Self::FALLBACK`]. The flag reports whether the output matched.
    #[must_use]
    fn parse_or_fallback(raw: &str) -> (Self, bool) {
        match Self::parse(raw) {
            Some(label) => (label, true),
            None => (Self::FALLBACK, false),
        }
    }
}

/// Canonical form of a model-emitted label: trimmed, lowercased, with
/// surrounding quotes and trailing punctuation removed.
#[must_use]
pub fn normalize(raw: &str) -> String {
    const QUOTES: &[char] = &['"', '\'', '`'];
    const TRAILING: &[char] = &['.', ',', '!', '?', ';', ':'];

    raw.trim()
        .trim_end_matches(TRAILING)
        .trim_matches(QUOTES)
        .trim_end_matches(TRAILING)
        .trim()
        .to_lowercase()
}

/// Labels for the booking/info coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatorLabel {
    /// Flight or hotel bookings.
    Booker,
    /// General information questions.
    Info,
    /// Anything else.
    Unclear,
}

impl LabelSet for CoordinatorLabel {
    const ALL: &'static [Self] = &[Self::Booker, Self::Info, Self::Unclear];
    const FALLBACK: Self = Self::Unclear;

    fn as_str(&self) -> &'static str {
        match self {
            Self::Booker => "booker",
            Self::Info => "info",
            Self::Unclear => "unclear",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Booker => "the request is related to booking flights or hotels",
            Self::Info => "the request is a general information question",
            Self::Unclear => "the request is unclear or doesn't fit either category",
        }
    }
}

impl std::fmt::Display for CoordinatorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Info \n"), "info");
        assert_eq!(normalize("BOOKER"), "booker");
    }

    #[test]
    fn normalize_strips_quotes_and_punctuation() {
        assert_eq!(normalize("'booker'"), "booker");
        assert_eq!(normalize("\"info\"."), "info");
        assert_eq!(normalize("unclear!"), "unclear");
        assert_eq!(normalize("`info`"), "info");
    }

    #[test]
    fn normalize_keeps_inner_text() {
        assert_eq!(normalize("I think booker"), "i think booker");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn parse_matches_exactly() {
        assert_eq!(CoordinatorLabel::parse("booker"), Some(CoordinatorLabel::Booker));
        assert_eq!(CoordinatorLabel::parse("  Info \n"), Some(CoordinatorLabel::Info));
        assert_eq!(CoordinatorLabel::parse("bookers"), None);
        assert_eq!(CoordinatorLabel::parse("xyz"), None);
    }

    #[test]
    fn unknown_output_falls_back() {
        assert_eq!(
            CoordinatorLabel::parse_or_fallback("xyz"),
            (CoordinatorLabel::Unclear, false)
        );
        assert_eq!(
            CoordinatorLabel::parse_or_fallback("unclear"),
            (CoordinatorLabel::Unclear, true)
        );
    }
}
