//! Core data models used throughout Laptop Press.
//!
//! These types represent the product records, search parameters, LLM drafts
//! and blog posts that flow through the content assembly pipeline.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// One catalog item as returned by the product-search API.
///
/// `asin` is the de-duplication key: two records with the same `asin` in a
/// single rendered document are a defect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub asin: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub rating: Option<f64>,
    #[serde(
        alias = "ratings_count",
        alias = "reviewCount",
        deserialize_with = "null_as_default"
    )]
    pub ratings_count: u64,
    #[serde(alias = "image_url", alias = "image")]
    pub image_url: Option<String>,
    #[serde(alias = "product_url", alias = "url")]
    pub product_url: Option<String>,
    pub processor: Option<String>,
    pub ram: Option<String>,
    pub graphics: Option<String>,
    pub storage: Option<String>,
    #[serde(alias = "screen_size")]
    pub screen_size: Option<String>,
    #[serde(alias = "battery_life")]
    pub battery_life: Option<String>,
}

/// Catalog APIs send `null` for unknown counts and titles.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Sort strategy requested from the product-search API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortBy {
    #[default]
    Relevance,
    BestSellers,
    Newest,
}

/// Product-search request derived from a free-text prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,
    #[serde(default)]
    pub sort_by: SortBy,
}

/// Blog post category. Each category has its own prompt and assembly path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Top10,
    Review,
    Comparison,
    #[serde(rename = "How-To")]
    HowTo,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Top10 => "Top10",
            Category::Review => "Review",
            Category::Comparison => "Comparison",
            Category::HowTo => "How-To",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "top10" | "top-10" => Ok(Category::Top10),
            "review" => Ok(Category::Review),
            "comparison" | "compare" => Ok(Category::Comparison),
            "how-to" | "howto" => Ok(Category::HowTo),
            other => anyhow::bail!(
                "unknown category: '{}'. Must be Top10, Review, Comparison, or How-To.",
                other
            ),
        }
    }
}

/// The LLM's output plus its structured metadata.
///
/// `content` may arrive malformed or wrapped in a JSON envelope; it is only
/// trusted after the normalizer has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentDraft {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_data: Option<serde_json::Value>,
}

/// A persisted blog post row.
#[derive(Debug, Clone, Serialize)]
pub struct BlogPost {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub category: Category,
    pub image_url: Option<String>,
    pub author: String,
    pub published: bool,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Lowercase, ASCII-alphanumeric slug with single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
