use once_cell::sync::Lazy;
use regex::Regex;

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+\.\s)").unwrap());
static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n+").unwrap());
static DANGLING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\d+\.\s*$").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s*(.+)$").unwrap());
static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.*?)__").unwrap());

/// Normalises raw answer text for display.
///
/// Numbered lists get one list item per paragraph, newline runs collapse to a
/// single blank line and lines holding nothing but a list marker are removed.
/// The result depends only on `text`, so calling this on the full accumulator
/// after every token always converges on the same output.
pub fn format_answer(text: &str) -> String {
    let mut formatted = text.trim().to_string();
    if formatted.is_empty() {
        return formatted;
    }

    if formatted.contains("1.") && formatted.contains("2.") {
        formatted = LIST_MARKER.replace_all(&formatted, "\n\n$1").into_owned();
        formatted = formatted.trim_start_matches('\n').trim().to_string();
    }

    formatted = NEWLINE_RUN.replace_all(&formatted, "\n\n").into_owned();
    formatted = formatted.trim_matches('\n').to_string();
    DANGLING_MARKER.replace_all(&formatted, "").into_owned()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML-safe rendering of already formatted text: headings and `**bold**`
/// become `<strong>`, line breaks become `<br />`.
pub fn render_html(formatted: &str) -> String {
    let escaped = escape_html(formatted);
    let with_headings = HEADING.replace_all(&escaped, "<strong>$2</strong>");
    let with_bold = BOLD_STARS.replace_all(&with_headings, "<strong>$1</strong>");
    let with_bold = BOLD_UNDERSCORES.replace_all(&with_bold, "<strong>$1</strong>");
    with_bold.replace("\n\n", "<br /><br />").replace('\n', "<br />")
}
