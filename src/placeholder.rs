//! Placeholder resolution: putting product cards into a Top10 draft.
//!
//! Three strategies are tried in order, each only when the previous one
//! placed fewer than the threshold of products:
//!
//! 1. [`Strategy::ExplicitTokens`] replaces `[PRODUCT_DATA_N]` tokens.
//! 2. [`Strategy::HeadingAdjacent`] inserts a card after each `<h3>`.
//! 3. [`Strategy::EvenSpacing`] spreads cards between paragraphs.
//!
//! The threshold is `min(min_replacements, products.len())`, so a short
//! product list can still be satisfied by tokens alone. Strategies 2 and 3
//! start over from the input with every token removed; a partial token pass
//! never mixes with a later strategy. Every card is rendered with
//! [`rank_for_index`], so document order is rank order.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::card::{rank_for_index, render_product_card};
use crate::config::AffiliateConfig;
use crate::models::ProductRecord;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<p(?:\s[^>]*)?>\s*\[PRODUCT_DATA_([1-9]\d*)\]\s*</p>|\[PRODUCT_DATA_([1-9]\d*)\]")
        .expect("TOKEN_RE should compile")
});
static ANY_TOKEN_PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<p(?:\s[^>]*)?>\s*\[PRODUCT_DATA_[^\]]*\]\s*</p>")
        .expect("ANY_TOKEN_PARAGRAPH_RE should compile")
});
static ANY_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[PRODUCT_DATA_[^\]]*\]").expect("ANY_TOKEN_RE should compile"));
static H3_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h3\b[^>]*>.*?</h3>").expect("H3_RE should compile"));
static HEADING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<h[1-6]\b").expect("HEADING_OPEN_RE should compile"));
static PARAGRAPH_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</p\s*>").expect("PARAGRAPH_CLOSE_RE should compile"));
static DATA_ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-asin="([^"]*)""#).expect("DATA_ASIN_RE should compile"));

/// Which placement strategy produced the final document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ExplicitTokens,
    HeadingAdjacent,
    EvenSpacing,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExplicitTokens => "explicit_tokens",
            Strategy::HeadingAdjacent => "heading_adjacent",
            Strategy::EvenSpacing => "even_spacing",
        }
    }
}

/// Result of [`resolve_placeholders`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub html: String,
    /// Cards inserted by the winning strategy.
    pub replacements: usize,
    /// Products whose card was already in the input.
    pub already_present: usize,
    /// `None` when there were no products to place.
    pub strategy: Option<Strategy>,
}

impl Resolution {
    /// Products accounted for in the output.
    pub fn placed(&self) -> usize {
        self.replacements + self.already_present
    }
}

/// Place a card for each product into `html`.
pub fn resolve_placeholders(
    html: &str,
    products: &[ProductRecord],
    affiliate: &AffiliateConfig,
    min_replacements: usize,
) -> Resolution {
    if products.is_empty() {
        return Resolution {
            html: html.to_string(),
            replacements: 0,
            already_present: 0,
            strategy: None,
        };
    }

    let present: HashSet<&str> = DATA_ASIN_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect();
    let pending: Vec<usize> = (0..products.len())
        .filter(|&i| !present.contains(products[i].asin.as_str()))
        .collect();
    let already_present = products.len() - pending.len();
    let threshold = min_replacements.min(products.len());
    debug!(
        products = products.len(),
        already_present, threshold, "resolving product placeholders"
    );

    let (tokens_html, replacements) = replace_tokens(html, products, &present, affiliate);
    if replacements + already_present >= threshold {
        info!(strategy = "explicit_tokens", replacements, "product cards placed");
        return Resolution {
            html: tokens_html,
            replacements,
            already_present,
            strategy: Some(Strategy::ExplicitTokens),
        };
    }
    debug!(replacements, threshold, "too few explicit tokens, trying headings");

    let base = strip_all_tokens(html);

    if let Some((heading_html, replacements)) =
        insert_after_headings(&base, products, &pending, affiliate, threshold)
    {
        if replacements + already_present >= threshold {
            info!(strategy = "heading_adjacent", replacements, "product cards placed");
            return Resolution {
                html: heading_html,
                replacements,
                already_present,
                strategy: Some(Strategy::HeadingAdjacent),
            };
        }
    }
    debug!("heading placement insufficient, spacing cards evenly");

    let (spaced_html, replacements) = insert_evenly(&base, products, &pending, affiliate);
    info!(strategy = "even_spacing", replacements, "product cards placed");
    Resolution {
        html: spaced_html,
        replacements,
        already_present,
        strategy: Some(Strategy::EvenSpacing),
    }
}

/// Strategy 1. Returns the rewritten html and the number of cards inserted.
fn replace_tokens(
    html: &str,
    products: &[ProductRecord],
    present: &HashSet<&str>,
    affiliate: &AffiliateConfig,
) -> (String, usize) {
    let mut inserted: HashSet<usize> = HashSet::new();
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&html[last..whole.start()]);
        last = whole.end();

        let n: usize = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let index = n.saturating_sub(1);

        match products.get(index) {
            Some(p) if present.contains(p.asin.as_str()) => {
                debug!(asin = %p.asin, "card already present, dropping token");
            }
            Some(p) if !inserted.insert(index) => {
                debug!(asin = %p.asin, "repeated token, dropping");
            }
            Some(p) => {
                out.push_str(&render_product_card(Some(p), rank_for_index(index), affiliate));
            }
            None => {
                warn!(token = n, products = products.len(), "token refers to a missing product");
                out.push_str(&render_product_card(None, n, affiliate));
            }
        }
    }
    out.push_str(&html[last..]);
    (out, inserted.len())
}

/// Strategy 2. `None` when the document has fewer `<h3>` than `threshold`.
fn insert_after_headings(
    html: &str,
    products: &[ProductRecord],
    pending: &[usize],
    affiliate: &AffiliateConfig,
    threshold: usize,
) -> Option<(String, usize)> {
    let headings: Vec<(usize, usize)> = H3_RE.find_iter(html).map(|m| (m.start(), m.end())).collect();
    if headings.len() < threshold {
        debug!(headings = headings.len(), threshold, "not enough <h3> headings");
        return None;
    }

    let mut queue = pending.iter().copied();
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    let mut replacements = 0;

    for &(_, end) in &headings {
        let section_end = HEADING_OPEN_RE
            .find(&html[end..])
            .map(|m| end + m.start())
            .unwrap_or(html.len());
        if html[end..section_end].contains("product-card") {
            continue;
        }
        let Some(index) = queue.next() else { break };

        out.push_str(&html[last..end]);
        out.push('\n');
        out.push_str(&render_product_card(
            Some(&products[index]),
            rank_for_index(index),
            affiliate,
        ));
        last = end;
        replacements += 1;
    }
    out.push_str(&html[last..]);
    Some((out, replacements))
}

/// Strategy 3. Always places every pending product.
fn insert_evenly(
    html: &str,
    products: &[ProductRecord],
    pending: &[usize],
    affiliate: &AffiliateConfig,
) -> (String, usize) {
    let closes: Vec<usize> = PARAGRAPH_CLOSE_RE.find_iter(html).map(|m| m.end()).collect();
    let cards: Vec<String> = pending
        .iter()
        .map(|&i| render_product_card(Some(&products[i]), rank_for_index(i), affiliate))
        .collect();

    if closes.is_empty() {
        let mut out = html.to_string();
        for card in &cards {
            out.push('\n');
            out.push_str(card);
        }
        return (out, cards.len());
    }

    let spacing = (closes.len() / (cards.len() + 1)).max(1);
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for (k, card) in cards.iter().enumerate() {
        let paragraph = ((k + 1) * spacing).min(closes.len());
        let at = closes[paragraph - 1];
        if at > last {
            out.push_str(&html[last..at]);
            last = at;
        }
        out.push('\n');
        out.push_str(card);
    }
    out.push_str(&html[last..]);
    (out, cards.len())
}

fn strip_all_tokens(html: &str) -> String {
    let without_paragraphs = ANY_TOKEN_PARAGRAPH_RE.replace_all(html, "");
    ANY_TOKEN_RE.replace_all(&without_paragraphs, "").into_owned()
}

/// Remove any `[PRODUCT_DATA_…]` token still in the document.
///
/// Returns the cleaned html and how many tokens were removed.
pub fn strip_leftover_tokens(html: &str) -> (String, usize) {
    let count = ANY_TOKEN_RE.find_iter(html).count();
    if count == 0 {
        return (html.to_string(), 0);
    }
    (strip_all_tokens(html), count)
}

/// Count `[PRODUCT_DATA_…]` tokens in the document.
pub fn count_tokens(html: &str) -> usize {
    ANY_TOKEN_RE.find_iter(html).count()
}
