//! Search-parameter extraction from free-text prompts.
//!
//! Turns a prompt like `"Top 10 best Dell laptops under $1000"` into a
//! [`SearchParams`] request for the product-search API. Matching is
//! case-insensitive and keyword based; extraction never fails and falls back
//! to the bare query `"laptop"`.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{SearchParams, SortBy};

/// Brand vocabulary as `(needle, canonical name)`. Needles match on word
/// boundaries so that e.g. `hp` does not match inside `chip`.
const BRANDS: &[(&str, &str)] = &[
    ("alienware", "Alienware"),
    ("dell", "Dell"),
    ("hp", "HP"),
    ("hewlett[- ]packard", "HP"),
    ("lenovo", "Lenovo"),
    ("thinkpad", "Lenovo"),
    ("apple", "Apple"),
    ("macbook", "Apple"),
    ("asus", "ASUS"),
    ("acer", "Acer"),
    ("msi", "MSI"),
    ("microsoft", "Microsoft"),
    ("surface", "Microsoft"),
    ("razer", "Razer"),
    ("samsung", "Samsung"),
    ("lg", "LG"),
    ("gigabyte", "Gigabyte"),
    ("huawei", "Huawei"),
    ("google", "Google"),
];

/// Category keywords as `(needle, category)`, evaluated in order.
const CATEGORIES: &[(&str, &str)] = &[
    ("gaming", "gaming"),
    ("gamers?", "gaming"),
    ("business", "business"),
    ("office", "business"),
    ("students?", "student"),
    ("college", "student"),
    ("school", "student"),
    ("budget", "budget"),
    ("cheap", "budget"),
    ("affordable", "budget"),
];

static BRAND_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    BRANDS
        .iter()
        .map(|(needle, canonical)| (word_regex(needle), *canonical))
        .collect()
});

static CATEGORY_RES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    CATEGORIES
        .iter()
        .map(|(needle, category)| (word_regex(needle), *category))
        .collect()
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:under|below|less than)\s+\$\s?(\d[\d,]*(?:\.\d+)?)\s*(k\b)?")
        .expect("PRICE_RE should compile")
});

static NEWEST_RE: LazyLock<Regex> = LazyLock::new(|| word_regex("newest|latest"));
static BEST_RE: LazyLock<Regex> = LazyLock::new(|| word_regex("best"));

fn word_regex(needle: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b(?:{})\b", needle)).expect("keyword pattern should compile")
}

/// Derive product-search parameters from a free-text prompt.
pub fn extract_search_params(prompt: &str) -> SearchParams {
    let brand = find_brand(prompt).map(str::to_string);
    let max_price = find_max_price(prompt);
    let category = find_category(prompt).map(str::to_string);

    let sort_by = if NEWEST_RE.is_match(prompt) {
        SortBy::Newest
    } else if BEST_RE.is_match(prompt) {
        SortBy::BestSellers
    } else {
        SortBy::Relevance
    };

    let mut parts: Vec<&str> = Vec::new();
    if let Some(ref b) = brand {
        parts.push(b);
    }
    if let Some(ref c) = category {
        parts.push(c);
    }
    parts.push("laptop");

    SearchParams {
        query: parts.join(" "),
        brand,
        max_price,
        category,
        sort_by,
    }
}

/// Find the earliest brand mentioned in `text`, returned in canonical casing.
pub fn find_brand(text: &str) -> Option<&'static str> {
    BRAND_RES
        .iter()
        .filter_map(|(re, canonical)| re.find(text).map(|m| (m.start(), *canonical)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, canonical)| canonical)
}

fn find_category(text: &str) -> Option<&'static str> {
    CATEGORY_RES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, category)| *category)
}

fn find_max_price(text: &str) -> Option<f64> {
    let caps = PRICE_RE.captures(text)?;
    let amount: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let amount = if caps.get(2).is_some() {
        amount * 1000.0
    } else {
        amount
    };
    (amount > 0.0).then_some(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dell_under_price() {
        let p = extract_search_params("Top 10 best Dell laptops under $1000");
        assert_eq!(p.brand.as_deref(), Some("Dell"));
        assert_eq!(p.max_price, Some(1000.0));
        assert_eq!(p.sort_by, SortBy::BestSellers);
        assert_eq!(p.query, "Dell laptop");
    }

    #[test]
    fn canonicalizes_brand_casing() {
        assert_eq!(find_brand("cheap hp notebooks"), Some("HP"));
        assert_eq!(find_brand("msi gaming rigs"), Some("MSI"));
        assert_eq!(find_brand("best macbook for students"), Some("Apple"));
    }

    #[test]
    fn brand_needs_word_boundary() {
        assert_eq!(find_brand("laptops with a fast chip"), None);
    }

    #[test]
    fn earliest_brand_wins() {
        assert_eq!(find_brand("Lenovo vs Dell for coding"), Some("Lenovo"));
    }

    #[test]
    fn category_and_thousands_separator() {
        let p = extract_search_params("affordable gaming laptops under $1,500");
        assert_eq!(p.category.as_deref(), Some("gaming"));
        assert_eq!(p.max_price, Some(1500.0));
        assert_eq!(p.query, "gaming laptop");
        assert_eq!(p.sort_by, SortBy::Relevance);
    }

    #[test]
    fn price_with_k_suffix() {
        let p = extract_search_params("student laptops below $1.2k");
        assert_eq!(p.max_price, Some(1200.0));
        assert_eq!(p.category.as_deref(), Some("student"));
    }

    #[test]
    fn newest_beats_best() {
        let p = extract_search_params("the best and newest ultrabooks");
        assert_eq!(p.sort_by, SortBy::Newest);
    }

    #[test]
    fn falls_back_to_bare_query() {
        let p = extract_search_params("something to type on");
        assert_eq!(p.query, "laptop");
        assert!(p.brand.is_none());
        assert!(p.max_price.is_none());
        assert!(p.category.is_none());
    }
}
