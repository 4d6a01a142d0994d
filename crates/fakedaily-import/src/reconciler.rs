use std::sync::Arc;

use fakedaily_adapters::{BatchEntry, ParsedBatch};
use fakedaily_core::{Article, ArticleChanges, ArticleDraft, ArticleLike};
use fakedaily_storage::{ArticleFilter, ArticleStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Thresholds, Verdict};
use crate::tagging::TagRules;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no articles to import")]
    EmptyBatch,
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    New { id: i64 },
    /// Matched a record that already holds exactly these fields.
    DuplicateExact { id: i64 },
    /// Matched a record at least as recent, or timestamps were not comparable.
    DuplicateStale { id: i64 },
    DuplicateFresh { id: i64 },
    Invalid { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub index: usize,
    pub title: Option<String>,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<Verdict>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
    /// One line per rejected or failed item.
    pub errors: Vec<String>,
    pub items: Vec<ItemReport>,
}

impl ReconcileReport {
    fn record(&mut self, item: ItemReport) {
        match &item.outcome {
            Outcome::New { .. } => self.imported += 1,
            Outcome::DuplicateFresh { .. } => self.updated += 1,
            Outcome::DuplicateExact { .. } | Outcome::DuplicateStale { .. } => self.skipped += 1,
            Outcome::Invalid { reason } => {
                self.rejected += 1;
                self.errors.push(reason.clone());
            }
            Outcome::Failed { reason } => {
                self.failed += 1;
                self.errors.push(match &item.title {
                    Some(title) => format!("{title}: {reason}"),
                    None => reason.clone(),
                });
            }
        }
        self.items.push(item);
    }

    /// Summary in the shape the import endpoint has always returned.
    pub fn to_response(&self) -> ImportResponse {
        ImportResponse {
            success: true,
            imported: self.imported,
            updated: self.updated,
            skipped: self.skipped + self.rejected + self.failed,
            errors: self.errors.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub imported: usize,
    pub updated: usize,
    /// Skipped, rejected and failed items together.
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Applies import batches to a store one candidate at a time.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    thresholds: Thresholds,
    tag_rules: Option<Arc<TagRules>>,
}

impl Reconciler {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            tag_rules: None,
        }
    }

    /// Candidates without tags get tags from `rules` before matching.
    pub fn with_tag_rules(mut self, rules: Arc<TagRules>) -> Self {
        self.tag_rules = Some(rules);
        self
    }

    /// Existing article that `probe` duplicates. Exact title matches beat
    /// fuzzy ones; among equals the lowest id wins.
    pub async fn find_by_similar_title_or_content<S, P>(
        &self,
        store: &S,
        probe: &P,
    ) -> Result<Option<(Article, Verdict)>, StoreError>
    where
        S: ArticleStore + ?Sized,
        P: ArticleLike + Sync + ?Sized,
    {
        let mut existing = store.list_articles(&ArticleFilter::default()).await?;
        existing.sort_by_key(|a| a.id);

        let mut fuzzy: Option<(Article, Verdict)> = None;
        for article in existing {
            match classify(probe, &article, &self.thresholds) {
                Verdict::ExactTitle => return Ok(Some((article, Verdict::ExactTitle))),
                Verdict::Distinct => {}
                verdict => {
                    if fuzzy.is_none() {
                        fuzzy = Some((article, verdict));
                    }
                }
            }
        }
        Ok(fuzzy)
    }

    #[tracing::instrument(name = "import_batch", skip_all, fields(entries = batch.len()))]
    pub async fn reconcile<S>(&self, store: &S, batch: ParsedBatch) -> Result<ReconcileReport, ImportError>
    where
        S: ArticleStore + ?Sized,
    {
        if batch.is_empty() {
            return Err(ImportError::EmptyBatch);
        }

        let mut report = ReconcileReport::default();
        for (index, entry) in batch.entries.into_iter().enumerate() {
            let item = match entry {
                BatchEntry::Unreadable { reason } => ItemReport {
                    index,
                    title: None,
                    outcome: Outcome::Invalid { reason },
                    matched_by: None,
                },
                BatchEntry::Draft(draft) => self.reconcile_one(store, index, draft).await,
            };
            debug!(index, outcome = ?item.outcome, "candidate reconciled");
            report.record(item);
        }

        info!(
            imported = report.imported,
            updated = report.updated,
            skipped = report.skipped,
            rejected = report.rejected,
            failed = report.failed,
            "import batch finished"
        );
        Ok(report)
    }

    async fn reconcile_one<S>(&self, store: &S, index: usize, mut draft: ArticleDraft) -> ItemReport
    where
        S: ArticleStore + ?Sized,
    {
        if let Some(rules) = &self.tag_rules {
            draft.tags = rules.tags_or_generated(&draft.tags, draft.title_field(), draft.content_field());
        }

        let title = draft.title_text().map(ToString::to_string);
        let item = |outcome, matched_by| ItemReport {
            index,
            title: title.clone(),
            outcome,
            matched_by,
        };

        let Some(candidate) = draft.to_new_article() else {
            return item(
                Outcome::Invalid {
                    reason: format!("entry {} has no title", index + 1),
                },
                None,
            );
        };

        let found = match self.find_by_similar_title_or_content(store, &candidate).await {
            Ok(found) => found,
            Err(err) => {
                warn!(index, error = %err, "duplicate lookup failed");
                return item(Outcome::Failed { reason: err.to_string() }, None);
            }
        };

        let Some((existing, verdict)) = found else {
            return match store.insert_article(&candidate).await {
                Ok(id) => item(Outcome::New { id }, None),
                Err(err) => {
                    warn!(index, error = %err, "insert failed");
                    item(Outcome::Failed { reason: err.to_string() }, None)
                }
            };
        };

        if existing.same_fields_as(&candidate) {
            return item(Outcome::DuplicateExact { id: existing.id }, Some(verdict));
        }

        let Some(modified) = draft.last_modified().filter(|ts| *ts > existing.updated_at) else {
            return item(Outcome::DuplicateStale { id: existing.id }, Some(verdict));
        };

        let changes = ArticleChanges {
            updated_at: Some(modified),
            ..ArticleChanges::from(candidate)
        };
        match store.update_article(existing.id, &changes).await {
            Ok(true) => item(Outcome::DuplicateFresh { id: existing.id }, Some(verdict)),
            Ok(false) => item(
                Outcome::Failed {
                    reason: format!("article {} disappeared during import", existing.id),
                },
                Some(verdict),
            ),
            Err(err) => {
                warn!(index, id = existing.id, error = %err, "update failed");
                item(Outcome::Failed { reason: err.to_string() }, Some(verdict))
            }
        }
    }
}
