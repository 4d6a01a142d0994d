//! Import reconciliation: similarity scoring, duplicate classification, the
//! batch reconciler and keyword auto-tagging.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

pub mod classifier;
pub mod reconciler;
pub mod similarity;
pub mod tagging;

pub use classifier::{classify, is_duplicate, Thresholds, Verdict};
pub use reconciler::{ImportError, ImportResponse, ItemReport, Outcome, ReconcileReport, Reconciler};
pub use similarity::{fold_case, quick_upper_bound, similarity};
pub use tagging::{RuleError, TagRule, TagRules};

#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    pub thresholds: Thresholds,
    pub auto_tag: bool,
    /// Replaces the built-in keyword table when set.
    pub tag_rules_path: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            auto_tag: true,
            tag_rules_path: None,
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Thresholds::default();
        let float = |key: &str, default: f64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .unwrap_or(default)
        };
        let thresholds = Thresholds::new(
            float("FAKEDAILY_TITLE_THRESHOLD", defaults.title),
            float("FAKEDAILY_CONTENT_THRESHOLD", defaults.content),
        )
        .with_max_compare_chars(
            lookup("FAKEDAILY_MAX_COMPARE_CHARS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(defaults.max_compare_chars),
        );
        Self {
            thresholds,
            auto_tag: lookup("FAKEDAILY_AUTO_TAG")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "on"))
                .unwrap_or(true),
            tag_rules_path: lookup("FAKEDAILY_TAG_RULES")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn build_reconciler(&self) -> anyhow::Result<Reconciler> {
        let reconciler = Reconciler::new(self.thresholds);
        if !self.auto_tag {
            return Ok(reconciler);
        }
        let rules = TagRules::load(self.tag_rules_path.as_deref()).with_context(|| {
            match &self.tag_rules_path {
                Some(path) => format!("loading tag rules from {}", path.display()),
                None => "loading built-in tag rules".to_string(),
            }
        })?;
        info!(rules = rules.rules().len(), "auto-tagging enabled");
        Ok(reconciler.with_tag_rules(Arc::new(rules)))
    }
}
