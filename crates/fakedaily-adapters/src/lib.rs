//! Batch sources for the importer: JSON exports, CSV sheets and WhatsApp chat
//! exports, all turned into ordered candidate lists.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use fakedaily_core::{split_tag_list, ArticleDraft};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

mod chat;

pub use chat::{extract_chat_articles, ChatArticle};

/// Whole-input failures. Problems with a single entry never end up here; they
/// become [`BatchEntry::Unreadable`] items instead.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected batch shape: {0}")]
    Shape(String),
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV header is missing the `{0}` column")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Json,
    Csv,
    Chat,
}

impl BatchFormat {
    /// Guess from the file extension; anything unknown is treated as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Self::Csv,
            Some("txt") => Self::Chat,
            _ => Self::Json,
        }
    }
}

impl fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Chat => "chat",
        })
    }
}

impl FromStr for BatchFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "chat" | "whatsapp" | "txt" => Ok(Self::Chat),
            other => Err(format!("unknown batch format `{other}` (expected json, csv or chat)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Draft(ArticleDraft),
    /// Entry that could not be decoded into a candidate at all.
    Unreadable { reason: String },
}

/// Candidates in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub entries: Vec<BatchEntry>,
}

impl ParsedBatch {
    pub fn from_drafts(drafts: impl IntoIterator<Item = ArticleDraft>) -> Self {
        Self {
            entries: drafts.into_iter().map(BatchEntry::Draft).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drafts(&self) -> impl Iterator<Item = &ArticleDraft> {
        self.entries.iter().filter_map(|entry| match entry {
            BatchEntry::Draft(draft) => Some(draft),
            BatchEntry::Unreadable { .. } => None,
        })
    }

    pub fn unreadable_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, BatchEntry::Unreadable { .. }))
            .count()
    }
}

pub fn parse_json_batch(text: &str) -> Result<ParsedBatch, AdapterError> {
    let value: JsonValue = serde_json::from_str(text)?;
    parse_json_value(value)
}

/// Accepts a top-level array or an object carrying an `articles` array.
/// Unknown fields on entries (`id`, `images`, ...) are ignored.
pub fn parse_json_value(value: JsonValue) -> Result<ParsedBatch, AdapterError> {
    let items = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("articles") {
            Some(JsonValue::Array(items)) => items,
            Some(JsonValue::Null) | None => {
                return Err(AdapterError::Shape("no `articles` list provided".to_string()))
            }
            Some(_) => return Err(AdapterError::Shape("`articles` must be a list".to_string())),
        },
        _ => {
            return Err(AdapterError::Shape(
                "expected a list of articles or an object with `articles`".to_string(),
            ))
        }
    };

    let entries = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            if !item.is_object() {
                return BatchEntry::Unreadable {
                    reason: format!("entry {} is not an object", idx + 1),
                };
            }
            match serde_json::from_value::<ArticleDraft>(item) {
                Ok(draft) => BatchEntry::Draft(draft),
                Err(err) => BatchEntry::Unreadable {
                    reason: format!("entry {}: {err}", idx + 1),
                },
            }
        })
        .collect();
    Ok(ParsedBatch { entries })
}

struct CsvColumns {
    title: usize,
    content: usize,
    author: Option<usize>,
    published: Option<usize>,
    tags: Option<usize>,
    created_at: Option<usize>,
    updated_at: Option<usize>,
}

impl CsvColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, AdapterError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        Ok(Self {
            title: find("title").ok_or(AdapterError::MissingColumn("title"))?,
            content: find("content").ok_or(AdapterError::MissingColumn("content"))?,
            author: find("author"),
            published: find("published"),
            tags: find("tags"),
            created_at: find("created_at"),
            updated_at: find("updated_at"),
        })
    }
}

fn csv_cell(record: &csv::StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn csv_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// `published` is truthy for `true`, `1`, `yes`; tags are comma separated.
pub fn parse_csv_batch(text: &str) -> Result<ParsedBatch, AdapterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let columns = CsvColumns::from_headers(reader.headers()?)?;

    let mut entries = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let row = idx + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                entries.push(BatchEntry::Unreadable {
                    reason: format!("row {row}: {err}"),
                });
                continue;
            }
        };
        let published = columns
            .published
            .map(|i| csv_truthy(record.get(i).unwrap_or_default()));
        entries.push(BatchEntry::Draft(ArticleDraft {
            title: record.get(columns.title).map(ToString::to_string),
            content: record.get(columns.content).map(ToString::to_string),
            author: csv_cell(&record, columns.author),
            published,
            tags: csv_cell(&record, columns.tags)
                .map(|t| split_tag_list(&t))
                .unwrap_or_default(),
            created_at: csv_cell(&record, columns.created_at),
            updated_at: csv_cell(&record, columns.updated_at),
        }));
    }
    Ok(ParsedBatch { entries })
}

/// Candidates from a chat export; only messages from `sender` when given.
pub fn parse_chat_batch(text: &str, sender: Option<&str>) -> ParsedBatch {
    ParsedBatch::from_drafts(
        extract_chat_articles(text, sender)
            .iter()
            .map(ChatArticle::to_draft),
    )
}

pub fn parse_batch(
    text: &str,
    format: BatchFormat,
    sender: Option<&str>,
) -> Result<ParsedBatch, AdapterError> {
    match format {
        BatchFormat::Json => parse_json_batch(text),
        BatchFormat::Csv => parse_csv_batch(text),
        BatchFormat::Chat => Ok(parse_chat_batch(text, sender)),
    }
}

pub fn read_batch_file(
    path: impl AsRef<Path>,
    format: BatchFormat,
    sender: Option<&str>,
) -> anyhow::Result<ParsedBatch> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let batch = parse_batch(&data, format, sender)
        .with_context(|| format!("parsing {} as {format}", path.display()))?;
    debug!(path = %path.display(), %format, entries = batch.len(), "batch file parsed");
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_accepts_list_and_wrapped_shapes() {
        let batch = parse_json_batch(r#"[{"title":"A","content":"x"}]"#).expect("list");
        assert_eq!(batch.len(), 1);

        let batch = parse_json_value(json!({
            "success": true,
            "count": 2,
            "articles": [
                {"id": 1, "title": "A", "content": "x", "images": [{"id": 3}]},
                {"title": "B", "published": 1, "tags": ["Politik"]}
            ]
        }))
        .expect("wrapped");
        let drafts: Vec<_> = batch.drafts().collect();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].published, Some(true));
    }

    #[test]
    fn json_bad_entries_are_per_item() {
        let batch = parse_json_batch(r#"[{"title":"A"}, 42, {"title": 5}]"#).expect("parse");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.unreadable_count(), 2);
        assert!(matches!(
            &batch.entries[1],
            BatchEntry::Unreadable { reason } if reason.contains("not an object")
        ));
    }

    #[test]
    fn json_whole_input_errors() {
        assert!(matches!(parse_json_batch("{"), Err(AdapterError::Json(_))));
        assert!(matches!(
            parse_json_batch(r#"{"foo": 1}"#),
            Err(AdapterError::Shape(_))
        ));
        assert!(matches!(
            parse_json_batch(r#"{"articles": "x"}"#),
            Err(AdapterError::Shape(_))
        ));
        assert!(parse_json_batch(r#"{"articles": []}"#).expect("empty").is_empty());
    }

    #[test]
    fn csv_rows_become_drafts() {
        let text = "title,content,author,published,tags,created_at\n\
                    Erster,\"Inhalt, mit Komma\",Redaktion,yes,\"Politik, Satire\",2026-01-20\n\
                    Zweiter,Text,,no,,\n\
                    Dritter,Text,,on,,\n";
        let batch = parse_csv_batch(text).expect("csv");
        let drafts: Vec<_> = batch.drafts().collect();
        assert_eq!(drafts.len(), 3);
        assert_eq!(drafts[0].content.as_deref(), Some("Inhalt, mit Komma"));
        assert_eq!(drafts[0].published, Some(true));
        assert_eq!(drafts[0].tags, vec!["Politik", "Satire"]);
        assert_eq!(drafts[0].created_at.as_deref(), Some("2026-01-20"));
        assert_eq!(drafts[1].author, None);
        assert_eq!(drafts[1].published, Some(false));
        assert_eq!(drafts[2].published, Some(false));
    }

    #[test]
    fn csv_malformed_row_does_not_sink_the_batch() {
        let text = "title,content\nA,x\nB,y,unexpected\nC,z\n";
        let batch = parse_csv_batch(text).expect("csv");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.unreadable_count(), 1);
    }

    #[test]
    fn csv_requires_title_and_content_columns() {
        assert!(matches!(
            parse_csv_batch("name,content\nA,x\n"),
            Err(AdapterError::MissingColumn("title"))
        ));
        assert!(matches!(
            parse_csv_batch("Title,body\nA,x\n"),
            Err(AdapterError::MissingColumn("content"))
        ));
    }

    #[test]
    fn format_detection_and_parsing() {
        assert_eq!(BatchFormat::from_path(Path::new("a.CSV")), BatchFormat::Csv);
        assert_eq!(BatchFormat::from_path(Path::new("chat.txt")), BatchFormat::Chat);
        assert_eq!(BatchFormat::from_path(Path::new("export.json")), BatchFormat::Json);
        assert_eq!("WhatsApp".parse::<BatchFormat>(), Ok(BatchFormat::Chat));
        assert!("xml".parse::<BatchFormat>().is_err());
    }

    #[test]
    fn batch_files_are_read_with_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.json");
        fs::write(&path, r#"{"articles":[{"title":"A","content":"x"}]}"#).expect("write");
        let batch = read_batch_file(&path, BatchFormat::Json, None).expect("read");
        assert_eq!(batch.len(), 1);

        let err = read_batch_file(dir.path().join("missing.json"), BatchFormat::Json, None)
            .expect_err("missing file");
        assert!(err.to_string().contains("missing.json"));
    }
}
