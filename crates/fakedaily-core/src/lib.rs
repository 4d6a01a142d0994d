//! Core domain model for FakeDaily: articles, import candidates, images and
//! the timestamp/tag normalization shared by every other crate.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Storage representation used for SQLite `TIMESTAMP` columns. Fractional
/// seconds are kept (and omitted when zero) so stored values compare exactly
/// like freshly parsed ones.
pub const STORAGE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    // WhatsApp chat export header, e.g. `20.01.26, 10:30`.
    "%d.%m.%y, %H:%M",
];

/// Parses the timestamp spellings that show up in exports, SQLite rows, HTML
/// `datetime-local` inputs and chat logs. Offsets are normalized to UTC.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for fmt in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_storage_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(STORAGE_TIMESTAMP_FORMAT).to_string()
}

/// Trims labels, drops empty ones and keeps the first occurrence of each.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Tags column decoding: JSON list first, legacy `"Politik, Satire"` text second.
pub fn parse_stored_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => normalize_tags(list),
        Err(_) => split_tag_list(raw),
    }
}

pub fn split_tag_list(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Canonical persisted article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Article {
    pub fn has_tag(&self, tag: &str) -> bool {
        let wanted = tag.to_lowercase();
        self.tags.iter().any(|t| t.to_lowercase() == wanted)
    }

    /// Case-insensitive substring match over title and content.
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.title.to_lowercase().contains(&needle) || self.content.to_lowercase().contains(&needle)
    }

    /// True when the editable fields already hold exactly what `new` carries.
    pub fn same_fields_as(&self, new: &NewArticle) -> bool {
        self.title == new.title
            && self.content == new.content
            && self.author == new.author
            && self.published == new.published
            && self.tags == new.tags
    }
}

/// Insert payload; missing timestamps are filled by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewArticle {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// Full replacement of the editable fields of an existing article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArticleChanges {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    /// Left untouched when `None`.
    pub created_at: Option<NaiveDateTime>,
    /// Store uses "now" when `None`.
    pub updated_at: Option<NaiveDateTime>,
}

impl From<NewArticle> for ArticleChanges {
    fn from(value: NewArticle) -> Self {
        Self {
            title: value.title,
            content: value.content,
            author: value.author,
            published: value.published,
            tags: value.tags,
            created_at: None,
            updated_at: value.updated_at,
        }
    }
}

/// Candidate record proposed by an import batch. Every field is optional and
/// timestamps stay raw text until the reconciler parses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ArticleDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flexible_bool")]
    pub published: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_flexible_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ArticleDraft {
    pub fn title_text(&self) -> Option<&str> {
        non_blank(self.title.as_deref())
    }

    /// `updated_at` wins over `created_at`; blank values count as absent.
    pub fn last_modified_text(&self) -> Option<&str> {
        non_blank(self.updated_at.as_deref()).or_else(|| non_blank(self.created_at.as_deref()))
    }

    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        self.last_modified_text().and_then(parse_timestamp)
    }

    /// `None` when the candidate carries no usable title.
    pub fn to_new_article(&self) -> Option<NewArticle> {
        let title = self.title_text()?.to_string();
        let created_at = self.created_at.as_deref().and_then(parse_timestamp);
        let updated_at = self
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .or(created_at);
        Some(NewArticle {
            title,
            content: self.content.clone().unwrap_or_default(),
            author: non_blank(self.author.as_deref()).map(ToString::to_string),
            published: self.published.unwrap_or(false),
            tags: normalize_tags(&self.tags),
            created_at,
            updated_at,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexibleBool {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlexibleBool {
    fn into_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::Text(s) => parse_bool_text(&s),
        }
    }
}

/// `true`, `1`, `yes`, `on` (any case) are truthy; everything else is not.
pub fn parse_bool_text(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn deserialize_flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<FlexibleBool>::deserialize(deserializer)?;
    Ok(raw.map(FlexibleBool::into_bool))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexibleTags {
    List(Vec<String>),
    Text(String),
}

fn deserialize_flexible_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<FlexibleTags>::deserialize(deserializer)?;
    Ok(match raw {
        Some(FlexibleTags::List(list)) => normalize_tags(list),
        Some(FlexibleTags::Text(text)) => split_tag_list(&text),
        None => Vec::new(),
    })
}

/// Anything exposing an optional title and content; absent fields read as "".
pub trait ArticleLike {
    fn title_field(&self) -> &str;
    fn content_field(&self) -> &str;
}

impl ArticleLike for Article {
    fn title_field(&self) -> &str {
        &self.title
    }

    fn content_field(&self) -> &str {
        &self.content
    }
}

impl ArticleLike for NewArticle {
    fn title_field(&self) -> &str {
        &self.title
    }

    fn content_field(&self) -> &str {
        &self.content
    }
}

impl ArticleLike for ArticleDraft {
    fn title_field(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    fn content_field(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleImage {
    pub id: i64,
    pub article_id: i64,
    pub filename: String,
    pub filepath: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub article_id: i64,
    pub filename: String,
    pub filepath: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}
