//! Fixed video embed for Top10 posts.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::card::escape_html;
use crate::config::VideoConfig;

/// Present in every embed this module writes; its presence makes
/// [`embed_video`] a no-op.
pub const EMBED_MARKER: &str = r#"data-embed="top10-video""#;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>").expect("HEADING_RE should compile")
});
static CONCLUSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)conclusion|summary|final thoughts|wrapping up|in conclusion|to sum up")
        .expect("CONCLUSION_RE should compile")
});
static LAST_PARAGRAPH_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p\s*>").expect("LAST_PARAGRAPH_CLOSE_RE should compile"));

pub fn has_video_embed(html: &str) -> bool {
    html.contains(EMBED_MARKER)
}

/// Insert the embed once.
///
/// Placement: before the last conclusion-like heading, else before the
/// second-to-last heading when there are at least three, else after the
/// last paragraph, else at the end.
pub fn embed_video(html: &str, video: &VideoConfig) -> String {
    if has_video_embed(html) {
        debug!("video embed already present");
        return html.to_string();
    }
    let snippet = render_embed(video);

    let headings: Vec<(usize, bool)> = HEADING_RE
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let text = c.get(1)?.as_str();
            Some((whole.start(), CONCLUSION_RE.is_match(text)))
        })
        .collect();

    if let Some(&(at, _)) = headings.iter().rev().find(|(_, conclusion)| *conclusion) {
        debug!(placement = "conclusion_heading", "embedding video");
        return insert_at(html, at, &format!("{}\n", snippet));
    }
    if headings.len() >= 3 {
        let at = headings[headings.len() - 2].0;
        debug!(placement = "second_to_last_heading", "embedding video");
        return insert_at(html, at, &format!("{}\n", snippet));
    }
    if let Some(m) = LAST_PARAGRAPH_CLOSE_RE.find_iter(html).last() {
        debug!(placement = "after_last_paragraph", "embedding video");
        return insert_at(html, m.end(), &format!("\n{}", snippet));
    }
    debug!(placement = "end", "embedding video");
    format!("{}\n{}", html, snippet)
}

fn render_embed(video: &VideoConfig) -> String {
    format!(
        r#"<div class="video-embed" {marker}><iframe src="{src}" title="{title}" loading="lazy" allowfullscreen></iframe></div>"#,
        marker = EMBED_MARKER,
        src = escape_html(&video.embed_url),
        title = escape_html(&video.title),
    )
}

fn insert_at(html: &str, at: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(html.len() + fragment.len());
    out.push_str(&html[..at]);
    out.push_str(fragment);
    out.push_str(&html[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embed(html: &str) -> String {
        embed_video(html, &VideoConfig::default())
    }

    #[test]
    fn before_conclusion_heading() {
        let html = "<h1>T</h1><p>a</p><h2>Picks</h2><p>b</p><h2>Final Thoughts</h2><p>c</p>";
        let out = embed(html);
        let video = out.find(EMBED_MARKER).unwrap();
        let conclusion = out.find("<h2>Final Thoughts</h2>").unwrap();
        assert!(video < conclusion);
        assert!(video > out.find("<p>b</p>").unwrap());
    }

    #[test]
    fn before_second_to_last_heading() {
        let html = "<h1>T</h1><p>a</p><h2>One</h2><p>b</p><h2>Two</h2><p>c</p>";
        let out = embed(html);
        let video = out.find(EMBED_MARKER).unwrap();
        assert!(video < out.find("<h2>One</h2>").unwrap());
        assert!(video > out.find("<p>a</p>").unwrap());
    }

    #[test]
    fn after_last_paragraph() {
        let out = embed("<h1>T</h1><p>a</p><p>b</p><ul><li>x</li></ul>");
        let video = out.find(EMBED_MARKER).unwrap();
        assert!(video > out.find("<p>b</p>").unwrap());
        assert!(video < out.find("<ul>").unwrap());
    }

    #[test]
    fn appended_when_no_anchor() {
        let out = embed("<div>only</div>");
        assert!(out.starts_with("<div>only</div>\n<div class=\"video-embed\""));
    }

    #[test]
    fn embedding_twice_keeps_one_block() {
        let html = "<h1>T</h1><p>a</p><h2>Conclusion</h2><p>z</p>";
        let once = embed(html);
        let twice = embed(&once);
        assert_eq!(twice, once);
        assert_eq!(twice.matches(EMBED_MARKER).count(), 1);
    }
}
