//! Markdown to WhatsApp markup (`*bold*`, `_italic_`, `~strike~`, ```` ```mono``` ````).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

// Private-use code points never occur in article text.
const BOLD: &str = "\u{E000}";
const CODE: char = '\u{E001}';

static FENCED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+#.-]*[ \t]*\n(.*?)```").expect("fenced code regex"));
static CODE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E001}(\\d+)\u{E001}").expect("code placeholder regex"));
static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+(.+?)[ \t]*$").expect("heading regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*[-*][ \t]+").expect("bullet regex"));
static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("bold regex"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").expect("bold regex"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+?)\*").expect("italic regex"));
static STRIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~(.+?)~~").expect("strike regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("inline code regex"));
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("image regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("link regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank line regex"));

/// Rewrites Markdown into the subset of markup WhatsApp renders.
pub fn convert(markdown: &str) -> String {
    let text = markdown.replace("\r\n", "\n");

    // Code blocks are lifted out first so nothing below rewrites their body.
    let mut blocks: Vec<String> = Vec::new();
    let text = FENCED_CODE.replace_all(&text, |caps: &Captures| {
        blocks.push(format!("```{}```", caps[1].trim_end_matches('\n')));
        format!("{CODE}{}{CODE}", blocks.len() - 1)
    });

    let text = HEADING.replace_all(&text, |caps: &Captures| {
        let spacer = if caps[1].len() == 1 { "\n" } else { "" };
        format!("{BOLD}{}{BOLD}{spacer}", &caps[2])
    });
    let text = BULLET.replace_all(&text, "• ");
    let text = BOLD_STARS.replace_all(&text, format!("{BOLD}${{1}}{BOLD}").as_str());
    let text = BOLD_UNDERSCORES.replace_all(&text, format!("{BOLD}${{1}}{BOLD}").as_str());
    let text = ITALIC.replace_all(&text, "_${1}_");
    let text = text.replace(BOLD, "*");
    let text = STRIKE.replace_all(&text, "~${1}~");
    let text = INLINE_CODE.replace_all(&text, "```${1}```");
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "${1}: ${2}");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");

    let text = CODE_PLACEHOLDER.replace_all(&text, |caps: &Captures| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|idx| blocks.get(idx).cloned())
            .unwrap_or_default()
    });
    text.trim().to_string()
}

/// Upper-cased bold title, a blank line, the converted body and an optional
/// italic author line.
pub fn format_article(title: &str, content: &str, author: Option<&str>) -> String {
    let mut out = format!("*{}*\n\n{}", title.to_uppercase(), convert(content));
    if let Some(author) = author.map(str::trim).filter(|a| !a.is_empty()) {
        out.push_str("\n\n_");
        out.push_str(author);
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_variants() {
        assert_eq!(convert("**bold text**"), "*bold text*");
        assert_eq!(convert("__bold text__"), "*bold text*");
    }

    #[test]
    fn bold_and_italic_in_one_line() {
        assert_eq!(
            convert("This is **bold** and *italic* text"),
            "This is *bold* and _italic_ text"
        );
    }

    #[test]
    fn headings_become_bold() {
        assert_eq!(convert("# Header 1"), "*Header 1*");
        assert_eq!(convert("# Eins\nText"), "*Eins*\n\nText");
        assert_eq!(convert("### Drei\nText"), "*Drei*\nText");
    }

    #[test]
    fn strike_and_inline_code() {
        assert_eq!(convert("~~weg~~"), "~weg~");
        assert_eq!(convert("Use `print()` now"), "Use ```print()``` now");
    }

    #[test]
    fn fenced_code_keeps_its_body() {
        let out = convert("Vorher\n\n```python\nprint(\"**nicht fett**\")\n```\n\nNachher");
        assert_eq!(out, "Vorher\n\n```print(\"**nicht fett**\")```\n\nNachher");
    }

    #[test]
    fn images_are_dropped_and_links_spelled_out() {
        assert_eq!(
            convert("Siehe ![Foto](bild.jpg)[Quelle](https://example.com)"),
            "Siehe Quelle: https://example.com"
        );
    }

    #[test]
    fn bullets_and_numbered_lists() {
        assert_eq!(convert("- Eins\n* Zwei"), "• Eins\n• Zwei");
        assert_eq!(convert("1. Erstens\n2. Zweitens"), "1. Erstens\n2. Zweitens");
    }

    #[test]
    fn blank_line_runs_collapse() {
        assert_eq!(convert("A\n\n\n\n\nB\n\n"), "A\n\nB");
    }

    #[test]
    fn plain_and_unicode_text_is_untouched() {
        assert_eq!(convert(""), "");
        let text = "Hallo 👋 Welt 🌍 äöü ß & < > @#$%";
        assert_eq!(convert(text), text);
    }

    #[test]
    fn article_layout() {
        assert_eq!(
            format_article("Test Artikel", "Das ist der **Inhalt**", Some("Redaktion")),
            "*TEST ARTIKEL*\n\nDas ist der *Inhalt*\n\n_Redaktion_"
        );
        assert_eq!(format_article("Kurz", "Text", None), "*KURZ*\n\nText");
        assert_eq!(format_article("Kurz", "Text", Some("  ")), "*KURZ*\n\nText");
    }

    #[test]
    fn full_article_conversion() {
        let out = format_article(
            "Test",
            "# Heading\n\n**Bold text** and *italic text*\n\n- List item",
            Some("Author"),
        );
        assert!(out.contains("*Heading*"));
        assert!(out.contains("*Bold text*"));
        assert!(out.contains("_italic text_"));
        assert!(out.contains("• List item"));
    }
}
