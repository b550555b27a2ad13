//! Product card HTML rendering.
//!
//! Every card is a fixed-structure fragment:
//!
//! ```text
//! <div class="product-card" data-asin="…" data-rank="N">
//!   rank badge · linked image · title · stars + review count · price
//!   spec grid (processor, RAM, graphics, storage, display, battery)
//!   affiliate button
//! </div><!-- /product-card -->
//! ```
//!
//! Cards never contain heading or paragraph tags, so inserting one does not
//! change how the heading- and paragraph-based placement strategies see the
//! document. The trailing comment marks the end of a card for the
//! de-duplication pass.

use crate::config::AffiliateConfig;
use crate::models::ProductRecord;

/// Marks the end of a rendered card.
pub const CARD_END_MARKER: &str = "<!-- /product-card -->";

const NOT_SPECIFIED: &str = "Not specified";

/// The one rank mapping used everywhere: array index 0 is rank 1.
pub fn rank_for_index(index: usize) -> usize {
    index + 1
}

/// Render a product card. `None` renders the "not available" card.
pub fn render_product_card(
    product: Option<&ProductRecord>,
    rank: usize,
    affiliate: &AffiliateConfig,
) -> String {
    let product = match product {
        Some(p) => p,
        None => return render_unavailable(rank),
    };

    let title = escape_html(&product.title);
    let link = escape_html(&affiliate_url(product, affiliate));

    let image = match product.image_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(src) => format!(
            r#"<a class="product-image" href="{link}" target="_blank" rel="nofollow noopener sponsored"><img src="{src}" alt="{title}" loading="lazy"></a>"#,
            link = link,
            src = escape_html(src),
            title = title,
        ),
        None => r#"<div class="product-image placeholder"></div>"#.to_string(),
    };

    let rating = match product.rating {
        Some(r) => format!(
            r#"<div class="product-rating"><span class="stars" aria-label="{r:.1} out of 5">{stars}</span> <span class="review-count">({count} reviews)</span></div>"#,
            r = r,
            stars = render_stars(r),
            count = format_number(product.ratings_count),
        ),
        None => r#"<div class="product-rating"><span class="review-count">No ratings yet</span></div>"#
            .to_string(),
    };

    let price = product
        .price
        .filter(|p| *p > 0.0)
        .map(format_price)
        .unwrap_or_else(|| "Check price".to_string());

    let specs = [
        ("Processor", &product.processor),
        ("RAM", &product.ram),
        ("Graphics", &product.graphics),
        ("Storage", &product.storage),
        ("Display", &product.screen_size),
        ("Battery", &product.battery_life),
    ];
    let grid: String = specs
        .iter()
        .map(|(label, value)| {
            let value = value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(NOT_SPECIFIED);
            format!(
                r#"<div class="spec"><span class="spec-label">{}</span><span class="spec-value">{}</span></div>"#,
                label,
                escape_html(value)
            )
        })
        .collect();

    format!(
        r#"<div class="product-card" data-asin="{asin}" data-rank="{rank}">
<div class="product-rank">#{rank}</div>
{image}
<div class="product-info">
<div class="product-title">{title}</div>
{rating}
<div class="product-price">{price}</div>
<div class="spec-grid">{grid}</div>
<a class="affiliate-button" href="{link}" target="_blank" rel="nofollow noopener sponsored">Check Price on Amazon</a>
</div>
</div>{end}"#,
        asin = escape_html(&product.asin),
        rank = rank,
        image = image,
        title = title,
        rating = rating,
        price = price,
        grid = grid,
        link = link,
        end = CARD_END_MARKER,
    )
}

fn render_unavailable(rank: usize) -> String {
    format!(
        r#"<div class="product-card unavailable" data-rank="{rank}">
<div class="product-rank">#{rank}</div>
<div class="product-info"><div class="product-title">Product information not available</div></div>
</div>{end}"#,
        rank = rank,
        end = CARD_END_MARKER,
    )
}

/// Explicit product URL, else `<base>/dp/<asin>?tag=<tag>`.
pub fn affiliate_url(product: &ProductRecord, affiliate: &AffiliateConfig) -> String {
    match product.product_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => url.to_string(),
        None => format!(
            "{}/dp/{}?tag={}",
            affiliate.base_url.trim_end_matches('/'),
            product.asin,
            affiliate.tag
        ),
    }
}

/// Five stars: floor(rating) full, one half if the remainder is ≥ 0.5.
fn render_stars(rating: f64) -> String {
    let rating = rating.clamp(0.0, 5.0);
    let full = rating.floor() as usize;
    let half = usize::from(full < 5 && rating - rating.floor() >= 0.5);
    let empty = 5 - full - half;

    let mut out = String::new();
    out.push_str(&r#"<span class="star full">★</span>"#.repeat(full));
    out.push_str(&r#"<span class="star half">★</span>"#.repeat(half));
    out.push_str(&r#"<span class="star empty">☆</span>"#.repeat(empty));
    out
}

fn format_price(price: f64) -> String {
    let cents = (price * 100.0).round() as u64;
    format!("${}.{:02}", format_number(cents / 100), cents % 100)
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
