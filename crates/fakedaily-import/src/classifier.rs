use fakedaily_core::{truncate_chars, ArticleLike};
use serde::Serialize;

use crate::similarity::{fold_case, quick_upper_bound, similarity};

pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.95;
pub const DEFAULT_CONTENT_THRESHOLD: f64 = 0.90;
pub const DEFAULT_MAX_COMPARE_CHARS: usize = 20_000;

/// Per-call duplicate thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub title: f64,
    pub content: f64,
    /// Content is cut to this many characters before scoring.
    pub max_compare_chars: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE_THRESHOLD,
            content: DEFAULT_CONTENT_THRESHOLD,
            max_compare_chars: DEFAULT_MAX_COMPARE_CHARS,
        }
    }
}

impl Thresholds {
    /// Both thresholds are clamped to `[0, 1]`.
    pub fn new(title: f64, content: f64) -> Self {
        Self {
            title: clamp_unit(title),
            content: clamp_unit(content),
            ..Self::default()
        }
    }

    pub fn with_max_compare_chars(mut self, max_compare_chars: usize) -> Self {
        self.max_compare_chars = max_compare_chars;
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 1.0;
    }
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "rule", content = "score", rename_all = "snake_case")]
pub enum Verdict {
    ExactTitle,
    SimilarTitle(f64),
    SimilarContent(f64),
    Distinct,
}

impl Verdict {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, Self::Distinct)
    }
}

/// Decides whether `a` and `b` are the same article.
///
/// Title rules only apply when both titles are non-blank, and the content rule
/// only when both bodies are non-blank, so two empty records are distinct.
pub fn classify<A, B>(a: &A, b: &B, thresholds: &Thresholds) -> Verdict
where
    A: ArticleLike + ?Sized,
    B: ArticleLike + ?Sized,
{
    let title_a = a.title_field().trim();
    let title_b = b.title_field().trim();
    if !title_a.is_empty() && !title_b.is_empty() {
        if fold_case(title_a) == fold_case(title_b) {
            return Verdict::ExactTitle;
        }
        let score = similarity(title_a, title_b);
        if score >= thresholds.title {
            return Verdict::SimilarTitle(score);
        }
    }

    let content_a = truncate_chars(a.content_field(), thresholds.max_compare_chars);
    let content_b = truncate_chars(b.content_field(), thresholds.max_compare_chars);
    if content_a.trim().is_empty() || content_b.trim().is_empty() {
        return Verdict::Distinct;
    }
    if quick_upper_bound(content_a, content_b) < thresholds.content {
        return Verdict::Distinct;
    }
    let score = similarity(content_a, content_b);
    if score >= thresholds.content {
        Verdict::SimilarContent(score)
    } else {
        Verdict::Distinct
    }
}

pub fn is_duplicate<A, B>(a: &A, b: &B, thresholds: &Thresholds) -> bool
where
    A: ArticleLike + ?Sized,
    B: ArticleLike + ?Sized,
{
    classify(a, b, thresholds).is_duplicate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakedaily_core::ArticleDraft;

    fn draft(title: Option<&str>, content: Option<&str>) -> ArticleDraft {
        ArticleDraft {
            title: title.map(ToString::to_string),
            content: content.map(ToString::to_string),
            ..Default::default()
        }
    }

    const WAHL_AT: &str = "Die Parteien in Wien plakatieren wieder fleißig.";
    const WAHL_DE: &str = "In Berlin streitet die Koalition über Wahlplakate.";

    #[test]
    fn identical_titles_win_regardless_of_content() {
        let a = draft(Some("Fake Daily – Breaking News"), Some("alpha"));
        let b = draft(Some("fake daily – breaking news"), Some("völlig anderer Inhalt"));
        assert_eq!(classify(&a, &b, &Thresholds::default()), Verdict::ExactTitle);

        let a = draft(Some("Hauptstraße gesperrt"), None);
        let b = draft(Some("HAUPTSTRASSE GESPERRT"), None);
        assert_eq!(classify(&a, &b, &Thresholds::default()), Verdict::ExactTitle);
    }

    #[test]
    fn trailing_emoji_is_a_similar_title() {
        let a = draft(Some("Fake Daily – Breaking News"), None);
        let b = draft(Some("Fake Daily – Breaking News 🎭"), None);
        match classify(&a, &b, &Thresholds::default()) {
            Verdict::SimilarTitle(score) => assert!(score > 0.95),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn unrelated_records_are_distinct() {
        let a = draft(
            Some("Kanzler eröffnet Würstelstand im Parlament"),
            Some("Die Opposition reagierte mit einem eigenen Kebabstand vor dem Eingang."),
        );
        let b = draft(
            Some("Mondlandung wegen Nebel verschoben"),
            Some("Raumfahrtbehörde bittet Astronauten um Geduld bis zum Frühling."),
        );
        assert_eq!(classify(&a, &b, &Thresholds::default()), Verdict::Distinct);
    }

    #[test]
    fn lowering_title_threshold_flips_borderline_pair() {
        let a = draft(Some("Österreich wählt neuen Bundeskanzler"), Some(WAHL_AT));
        let b = draft(Some("Deutschland wählt neuen Bundeskanzler"), Some(WAHL_DE));

        assert!(!is_duplicate(&a, &b, &Thresholds::default()));
        let relaxed = Thresholds::new(0.70, DEFAULT_CONTENT_THRESHOLD);
        assert!(matches!(classify(&a, &b, &relaxed), Verdict::SimilarTitle(_)));
    }

    #[test]
    fn near_identical_content_is_a_duplicate() {
        let body = "Wien. Der Bundeskanzler hat heute angekündigt, dass Montage abgeschafft werden. ";
        let a = draft(Some("Montage abgeschafft"), Some(&body.repeat(3)));
        let b = draft(
            Some("Regierung streicht den Wochenbeginn"),
            Some(&format!("{} Mehr dazu morgen.", body.repeat(3))),
        );
        assert!(matches!(
            classify(&a, &b, &Thresholds::default()),
            Verdict::SimilarContent(score) if score >= 0.90
        ));
    }

    #[test]
    fn empty_titles_fall_through_to_content() {
        let a = draft(Some(""), Some("Erster Inhalt über Wien"));
        let b = draft(None, Some("Ganz anderer Text zu Berlin"));
        assert_eq!(classify(&a, &b, &Thresholds::default()), Verdict::Distinct);

        let same_body = draft(Some("  "), Some("Erster Inhalt über Wien"));
        assert!(matches!(
            classify(&a, &same_body, &Thresholds::default()),
            Verdict::SimilarContent(_)
        ));
    }

    #[test]
    fn two_empty_records_are_not_duplicates() {
        let empty = draft(None, None);
        assert_eq!(classify(&empty, &empty, &Thresholds::default()), Verdict::Distinct);
    }

    #[test]
    fn content_is_truncated_before_scoring() {
        let shared = "x".repeat(50);
        let a = draft(None, Some(&format!("{shared}{}", "a".repeat(500))));
        let b = draft(None, Some(&format!("{shared}{}", "b".repeat(500))));
        let cut = Thresholds::default().with_max_compare_chars(50);
        assert!(is_duplicate(&a, &b, &cut));
        assert!(!is_duplicate(&a, &b, &Thresholds::default()));
    }

    #[test]
    fn thresholds_are_clamped() {
        let t = Thresholds::new(1.7, -0.2);
        assert_eq!((t.title, t.content), (1.0, 0.0));
        assert_eq!(Thresholds::new(f64::NAN, 0.5).title, 1.0);
    }
}
