//! Content normalizer for LLM-generated HTML.
//!
//! Drafts come back in every shape: wrapped in a JSON envelope, fenced in
//! markdown, with headings and list items left open, with loose text
//! between blocks, or as plain text with no markup at all.
//! [`normalize_content`] repairs these in a fixed order:
//!
//! 1. strip code fences and unwrap a `{"title": …, "content": …}` envelope
//! 2. plain text (no tags) is split on blank lines into `<h1>` + `<p>`s
//! 3. parse as an HTML fragment; the html5ever tree builder closes open
//!    `<h1>`–`<h6>`, `<p>` and `<li>` and drops stray closing tags
//! 4. re-serialize the top level, wrapping bare text runs in `<p>`
//! 5. synthesize an `<h1>` from the first paragraph when no heading exists
//!
//! The function is idempotent: running it on its own output changes nothing.
//! [`validate_structure`] checks the output invariant (at least one heading
//! and one paragraph); violating it is fatal for the caller.

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::NormalizeError;
use crate::llm::{extract_string_field, strip_code_fences};

/// Maximum nesting of JSON envelopes unwrapped from one draft.
const MAX_ENVELOPE_DEPTH: usize = 3;
/// Synthesized headings are cut to this many characters at a word boundary.
const MAX_HEADLINE_CHARS: usize = 80;
/// A leading plain-text paragraph at most this long becomes the heading as-is.
const MAX_TITLE_PARAGRAPH_CHARS: usize = 120;

static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("ANY_TAG_RE should compile"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h[1-6][\s>]").expect("HEADING_RE should compile"));
static PARAGRAPH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<p[\s>]").expect("PARAGRAPH_RE should compile"));
static FIRST_P_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p>").expect("FIRST_P_RE should compile")
});
static BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n").expect("BLANK_LINE_RE should compile"));
static SENTENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?:](?:\s|$)").expect("SENTENCE_END_RE should compile"));

/// Phrasing elements that may sit in a top-level run wrapped in `<p>`.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "i", "img",
    "ins", "kbd", "mark", "q", "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u",
    "var", "wbr",
];

/// An inline element with only inline descendants. Wrapping anything else
/// in `<p>` would be split apart again by the parser.
fn is_phrasing(element: ElementRef<'_>) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .all(|e| INLINE_TAGS.contains(&e.value().name()))
}

/// Normalize an LLM draft body into well-formed HTML.
pub fn normalize_content(raw: &str) -> String {
    let unwrapped = unwrap_envelope(raw);
    let text = unwrapped.trim();
    if text.is_empty() {
        return String::new();
    }

    if !ANY_TAG_RE.is_match(text) {
        debug!("draft has no markup, rebuilding from paragraphs");
        return from_plain_text(text);
    }

    let repaired = repair_and_wrap(text);
    ensure_heading(repaired.trim())
}

/// Check the normalizer output invariant.
pub fn validate_structure(html: &str) -> Result<(), NormalizeError> {
    if html.trim().is_empty() {
        return Err(NormalizeError::Empty);
    }
    if !HEADING_RE.is_match(html) {
        return Err(NormalizeError::MissingHeading);
    }
    if !PARAGRAPH_RE.is_match(html) {
        return Err(NormalizeError::MissingParagraph);
    }
    Ok(())
}

/// Strip fences and peel `{"content": …}` envelopes or JSON-encoded strings.
fn unwrap_envelope(raw: &str) -> String {
    let mut current = strip_code_fences(raw).to_string();

    for _ in 0..MAX_ENVELOPE_DEPTH {
        let t = current.trim();
        let next = if t.starts_with('{') {
            match serde_json::from_str::<Value>(t) {
                Ok(Value::Object(map)) => map
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => extract_string_field(t, "content"),
            }
        } else if t.starts_with('"') && t.ends_with('"') && t.len() >= 2 {
            serde_json::from_str::<String>(t).ok()
        } else {
            None
        };

        match next {
            Some(inner) => {
                debug!("unwrapped JSON envelope from draft content");
                current = strip_code_fences(&inner).to_string();
            }
            None => break,
        }
    }
    current
}

/// Parse `html` as a body fragment and serialize the top level back,
/// wrapping runs of text and phrasing elements in `<p>`.
fn repair_and_wrap(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len() + 64);
    let mut run = String::new();

    for child in fragment.root_element().children() {
        match child.value() {
            Node::Text(text) => run.push_str(&escape_text(text)),
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_phrasing(element) {
                    run.push_str(&element.html());
                } else {
                    flush_run(&mut out, &mut run);
                    out.push_str(&element.html());
                }
            }
            Node::Comment(comment) => {
                flush_run(&mut out, &mut run);
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            _ => {}
        }
    }
    flush_run(&mut out, &mut run);
    out
}

/// Emit a pending top-level run, in `<p>` unless it is only whitespace.
fn flush_run(out: &mut String, run: &mut String) {
    let body = run.trim();
    if body.is_empty() {
        out.push_str(run);
    } else {
        let lead = &run[..run.len() - run.trim_start().len()];
        let trail = &run[run.trim_end().len()..];
        out.push_str(lead);
        out.push_str("<p>");
        out.push_str(body);
        out.push_str("</p>");
        out.push_str(trail);
    }
    run.clear();
}

fn ensure_heading(html: &str) -> String {
    if HEADING_RE.is_match(html) {
        return html.to_string();
    }
    let source = FIRST_P_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .unwrap_or_else(|| strip_tags(html));
    let headline = headline_from(&source);
    if headline.is_empty() {
        return html.to_string();
    }
    debug!(headline = %headline, "synthesized missing heading");
    format!("<h1>{}</h1>\n{}", headline, html)
}

fn from_plain_text(text: &str) -> String {
    let paragraphs: Vec<&str> = BLANK_LINE_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    let Some(first) = paragraphs.first() else {
        return String::new();
    };

    let first_clean = first.trim_start_matches('#').trim();
    let (heading, body) = if paragraphs.len() > 1
        && first_clean.chars().count() <= MAX_TITLE_PARAGRAPH_CHARS
        && !first_clean.contains('\n')
    {
        (first_clean.to_string(), &paragraphs[1..])
    } else {
        (headline_from(first_clean), &paragraphs[..])
    };

    let mut out = format!("<h1>{}</h1>", escape_text(&heading));
    for p in body {
        out.push_str("\n<p>");
        out.push_str(&escape_text(p));
        out.push_str("</p>");
    }
    out
}

/// Remove tags and collapse whitespace.
pub fn strip_tags(html: &str) -> String {
    ANY_TAG_RE
        .replace_all(html, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First sentence of `text`, cut at a word boundary.
fn headline_from(text: &str) -> String {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let end = SENTENCE_END_RE.find(&text).map_or(text.len(), |m| m.start());
    let sentence = text[..end].trim();
    if sentence.chars().count() <= MAX_HEADLINE_CHARS {
        return sentence.to_string();
    }

    let mut out = String::new();
    for word in sentence.split_whitespace() {
        if out.chars().count() + word.chars().count() + 1 > MAX_HEADLINE_CHARS {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('\u{a0}', "&nbsp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
