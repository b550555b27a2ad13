//! Duplicate product card removal.
//!
//! Cards are located by their `data-asin` attribute and the
//! [`CARD_END_MARKER`](crate::card::CARD_END_MARKER) comment. The first card
//! for each asin is kept, which preserves rank order when a later strategy
//! or a reprocessing run inserted the same product again.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)\n?<div class="product-card[^"]*"[^>]*\bdata-asin="([^"]*)"[^>]*>.*?<!-- /product-card -->"#,
    )
    .expect("CARD_RE should compile")
});
static CARD_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="product-title">(.*?)</div>"#).expect("CARD_TITLE_RE should compile")
});
static RANK_PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)\s+#(\d+)\b").expect("RANK_PAIR_RE should compile"));

/// Window around a card in which a doubled title is collapsed.
const TITLE_WINDOW: usize = 500;

/// Output of [`dedupe_products`].
#[derive(Debug, Clone)]
pub struct Dedup {
    pub html: String,
    /// Cards removed because their asin appeared earlier.
    pub removed: usize,
    /// Doubled titles and rank markers collapsed.
    pub collapsed: usize,
}

pub fn dedupe_products(html: &str) -> Dedup {
    let (html, removed) = remove_repeated_cards(html);
    let (html, titles) = collapse_doubled_titles(&html);
    let (html, ranks) = collapse_rank_markers(&html);

    if removed > 0 {
        warn!(removed, "removed duplicate product cards");
    }
    if titles + ranks > 0 {
        debug!(titles, ranks, "collapsed doubled card text");
    }
    Dedup {
        html,
        removed,
        collapsed: titles + ranks,
    }
}

fn remove_repeated_cards(html: &str) -> (String, usize) {
    let mut seen = HashSet::new();
    let mut removed = 0;
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in CARD_RE.captures_iter(html) {
        let (Some(whole), Some(asin)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if seen.insert(asin.as_str().to_string()) {
            continue;
        }
        debug!(asin = asin.as_str(), "dropping repeated card");
        out.push_str(&html[last..whole.start()]);
        last = whole.end();
        removed += 1;
    }
    out.push_str(&html[last..]);
    (out, removed)
}

fn collapse_doubled_titles(html: &str) -> (String, usize) {
    let titles: Vec<(usize, String)> = CARD_TITLE_RE
        .captures_iter(html)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str().trim().to_string())))
        .filter(|(_, t)| !t.is_empty())
        .collect();

    let mut out = html.to_string();
    let mut collapsed = 0;
    // Back to front, so a collapse never shifts the anchors still to come.
    for (anchor, title) in titles.into_iter().rev() {
        let escaped = regex::escape(&title);
        let Ok(doubled) = Regex::new(&format!(r"{}\s+{}", escaped, escaped)) else {
            continue;
        };
        let lo = floor_boundary(&out, anchor.saturating_sub(TITLE_WINDOW));
        let hi = floor_boundary(&out, (anchor + TITLE_WINDOW).min(out.len()));
        let window = &out[lo..hi];
        let hits = doubled.find_iter(window).count();
        if hits == 0 {
            continue;
        }
        let replaced = doubled.replace_all(window, title.as_str()).into_owned();
        out.replace_range(lo..hi, &replaced);
        collapsed += hits;
    }
    (out, collapsed)
}

fn collapse_rank_markers(html: &str) -> (String, usize) {
    let mut out = html.to_string();
    let mut collapsed = 0;
    // "#3 #3 #3" needs two passes.
    for _ in 0..4 {
        let mut changed = 0;
        let next = RANK_PAIR_RE
            .replace_all(&out, |caps: &regex::Captures| {
                if caps[1] == caps[2] {
                    changed += 1;
                    format!("#{}", &caps[1])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        if changed == 0 {
            break;
        }
        collapsed += changed;
        out = next;
    }
    (out, collapsed)
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::render_product_card;
    use crate::config::AffiliateConfig;
    use crate::models::ProductRecord;

    fn card(asin: &str, rank: usize) -> String {
        let p = ProductRecord {
            asin: asin.to_string(),
            title: format!("Laptop {}", asin),
            ..Default::default()
        };
        render_product_card(Some(&p), rank, &AffiliateConfig::default())
    }

    #[test]
    fn same_card_twice_collapses_to_one() {
        let c = card("A1", 1);
        let html = format!("<h3>One</h3>\n{}\n<p>x</p>\n{}\n<p>y</p>", c, c);
        let d = dedupe_products(&html);
        assert_eq!(d.removed, 1);
        assert_eq!(d.html.matches("data-asin=\"A1\"").count(), 1);
        assert!(d.html.contains("<p>x</p>"));
        assert!(d.html.contains("<p>y</p>"));
    }

    #[test]
    fn keeps_first_occurrence_in_rank_order() {
        let html = format!("{}{}{}{}", card("A1", 1), card("A2", 2), card("A1", 1), card("A3", 3));
        let d = dedupe_products(&html);
        let re = Regex::new(r#"data-asin="([^"]*)""#).unwrap();
        let order: Vec<_> = re.captures_iter(&d.html).map(|c| c[1].to_string()).collect();
        assert_eq!(order, vec!["A1", "A2", "A3"]);
    }

    #[test]
    fn distinct_cards_untouched() {
        let html = format!("{}{}", card("A1", 1), card("A2", 2));
        let d = dedupe_products(&html);
        assert_eq!(d.removed, 0);
        assert_eq!(d.collapsed, 0);
        assert_eq!(d.html, html);
    }

    #[test]
    fn collapses_doubled_title_near_card() {
        let html = format!("<p>Laptop A1 Laptop A1 is great.</p>\n{}", card("A1", 1));
        let d = dedupe_products(&html);
        assert!(d.html.starts_with("<p>Laptop A1 is great.</p>"));
        assert_eq!(d.collapsed, 1);
    }

    #[test]
    fn title_windows_stay_anchored_after_earlier_collapse() {
        let long = "a".repeat(150);
        let html = format!(
            r#"<div class="product-title">{long}</div><p>{long} {long}</p><p>{x}</p><p>Beta Beta</p><p>{y}</p><div class="product-title">Beta</div>"#,
            long = long,
            x = "x".repeat(600),
            y = "y".repeat(420),
        );
        let d = dedupe_products(&html);
        assert!(d.html.contains(&format!("<p>{}</p>", long)));
        assert!(d.html.contains("<p>Beta</p>"), "second title not collapsed");
    }

    #[test]
    fn collapses_repeated_rank_markers() {
        let d = dedupe_products("<p>#3 #3 Dell XPS, then #4 #5 and #7 #7 #7</p>");
        assert_eq!(d.html, "<p>#3 Dell XPS, then #4 #5 and #7</p>");
    }
}
