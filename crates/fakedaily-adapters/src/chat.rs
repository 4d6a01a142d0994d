use fakedaily_core::{format_storage_timestamp, parse_timestamp, ArticleDraft};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static MESSAGE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\d{2}\.\d{2}\.\d{2}, \d{2}:\d{2}) - ").expect("valid header regex")
});

static IMAGE_ATTACHMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x{200E}?(IMG-\d+-WA\d+\.jpg)").expect("valid image regex"));

static ANY_ATTACHMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:IMG|VID|DOC)-\d+").expect("valid attachment regex"));

const EDIT_MARKER: &str = "<Diese Nachricht wurde bearbeitet.>";
const FILE_ATTACHED: &str = "(Datei angehängt)";
const MIN_INLINE_TEXT_CHARS: usize = 50;
const MIN_ARTICLE_CHARS: usize = 100;
const TOPIC_EMOJI: &[&str] = &[
    "🎸", "🚨", "🐮", "🏦", "💉", "🤖", "🇺🇸", "🇦🇹", "🇪🇺", "🔬", "🌌", "📰", "🗞️", "💡", "🇩🇪",
    "🍨", "🥩", "☀️", "📱", "📸",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChatMessage<'a> {
    timestamp: &'a str,
    sender: &'a str,
    body: &'a str,
}

fn split_messages(chat: &str) -> Vec<ChatMessage<'_>> {
    let headers: Vec<_> = MESSAGE_HEADER.captures_iter(chat).collect();
    let mut out = Vec::with_capacity(headers.len());
    for (idx, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(stamp)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(chat.len());
        let rest = &chat[whole.end()..end];
        let first_line = rest.split('\n').next().unwrap_or_default();
        // System notices ("Nachrichten sind Ende-zu-Ende-verschlüsselt") have no sender.
        let (sender, body) = match first_line.find(": ") {
            Some(pos) => (&rest[..pos], &rest[pos + 2..]),
            None => ("", rest),
        };
        out.push(ChatMessage {
            timestamp: stamp.as_str(),
            sender: sender.trim(),
            body: body.trim(),
        });
    }
    out
}

fn clean_article_text(text: &str) -> String {
    let text = text.replace(EDIT_MARKER, "");
    let text = text.trim();
    text.strip_prefix(FILE_ATTACHED)
        .map(str::trim)
        .unwrap_or(text)
        .to_string()
}

fn looks_like_article(text: &str) -> bool {
    text.chars().count() > MIN_ARTICLE_CHARS
        && (text.contains('*')
            || text.contains("Fake Daily")
            || text.contains("FAKE DAILY")
            || TOPIC_EMOJI.iter().any(|emoji| text.contains(emoji)))
}

/// Article posted to a chat: a picture plus its long caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatArticle {
    /// Raw `DD.MM.YY, HH:MM` stamp of the image message.
    pub timestamp: String,
    pub sender: String,
    pub image: String,
    pub text: String,
}

impl ChatArticle {
    /// First line without bold markers.
    pub fn title(&self) -> String {
        self.text
            .lines()
            .next()
            .unwrap_or_default()
            .replace('*', "")
            .trim()
            .to_string()
    }

    pub fn body(&self) -> String {
        self.text
            .split_once('\n')
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default()
    }

    /// Unpublished candidate stamped with the message time.
    pub fn to_draft(&self) -> ArticleDraft {
        let title = self.title();
        let stamp = parse_timestamp(&self.timestamp)
            .map(|ts| format_storage_timestamp(&ts))
            .unwrap_or_else(|| self.timestamp.clone());
        ArticleDraft {
            title: (!title.is_empty()).then_some(title),
            content: Some(self.body()),
            author: None,
            published: Some(false),
            tags: Vec::new(),
            created_at: Some(stamp.clone()),
            updated_at: Some(stamp),
        }
    }
}

/// Image messages whose caption (inline, or the following text-only message)
/// reads like an article.
pub fn extract_chat_articles(chat: &str, sender: Option<&str>) -> Vec<ChatArticle> {
    let messages: Vec<_> = split_messages(chat)
        .into_iter()
        .filter(|m| sender.map_or(true, |wanted| m.sender == wanted.trim()))
        .collect();

    let mut articles = Vec::new();
    for (idx, message) in messages.iter().enumerate() {
        let Some(image) = IMAGE_ATTACHMENT
            .captures(message.body)
            .and_then(|caps| caps.get(1))
        else {
            continue;
        };

        let inline = message.body[image.end()..].trim();
        let mut text = inline;
        if inline.chars().count() < MIN_INLINE_TEXT_CHARS {
            if let Some(next) = messages.get(idx + 1) {
                if !ANY_ATTACHMENT.is_match(next.body) {
                    text = next.body;
                }
            }
        }

        let text = clean_article_text(text);
        if looks_like_article(&text) {
            articles.push(ChatArticle {
                timestamp: message.timestamp.to_string(),
                sender: message.sender.to_string(),
                image: image.as_str().to_string(),
                text,
            });
        }
    }
    articles
}
