//! Product fetching from the external product-search API.
//!
//! [`HttpProductSource`] POSTs [`SearchParams`] as JSON and expects
//! `{ "products": [...] }` back. [`fetch_products`] wraps any
//! [`ProductSource`] with the brand-filtering rules, enrichment and the
//! "failures become an empty list" contract: a failed fetch and an empty
//! catalog both return `[]`, and the caller decides what that means.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ProductsConfig;
use crate::models::{ProductRecord, SearchParams};
use crate::specs::enrich_product;
use crate::traits::ProductSource;

/// Exact brand matches needed before broadening the filter.
const MIN_EXACT_BRAND_MATCHES: usize = 5;
/// Broadened matches needed before giving up on brand filtering entirely.
const MIN_BROAD_BRAND_MATCHES: usize = 3;

/// Product source backed by the product-search HTTP endpoint.
pub struct HttpProductSource {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpProductSource {
    /// Create a source from `[products]` config.
    ///
    /// # Errors
    ///
    /// Returns an error if `products.endpoint` is not configured.
    pub fn new(config: &ProductsConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("products.endpoint must be configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint,
            api_key: std::env::var(&config.api_key_env).ok(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<serde_json::Value>,
}

/// Decode records one by one so a malformed record costs only itself.
fn decode_records(values: Vec<serde_json::Value>) -> Vec<ProductRecord> {
    values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed product record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ProductSource for HttpProductSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<ProductRecord>> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(params);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("product search request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("product search API error {}: {}", status, body_text);
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("product search returned an unexpected body")?;
        Ok(decode_records(body.products))
    }
}

/// Fetch, filter and enrich products for a search.
///
/// Never fails: transport and decoding errors are logged and produce an
/// empty list. Records without an ASIN and repeated ASINs are dropped.
pub async fn fetch_products(
    source: &dyn ProductSource,
    params: &SearchParams,
    limit: usize,
) -> Vec<ProductRecord> {
    let raw = match source.search(params).await {
        Ok(products) => products,
        Err(e) => {
            warn!(source = source.name(), query = %params.query, error = %e, "product fetch failed");
            return Vec::new();
        }
    };
    debug!(source = source.name(), count = raw.len(), "product search returned");

    let mut seen = HashSet::new();
    let mut products: Vec<ProductRecord> = raw
        .into_iter()
        .filter(|p| !p.asin.trim().is_empty())
        .filter(|p| seen.insert(p.asin.clone()))
        .map(|mut p| {
            enrich_product(&mut p);
            p
        })
        .collect();

    if let Some(ref brand) = params.brand {
        products = filter_by_brand(products, brand);
    }

    products.truncate(limit);
    info!(query = %params.query, count = products.len(), "products fetched");
    products
}

/// Apply the brand rules: exact brand, then brand-in-title, then unfiltered.
pub fn filter_by_brand(products: Vec<ProductRecord>, brand: &str) -> Vec<ProductRecord> {
    let exact: Vec<ProductRecord> = products
        .iter()
        .filter(|p| is_exact_brand(p, brand))
        .cloned()
        .collect();
    if exact.len() >= MIN_EXACT_BRAND_MATCHES {
        return exact;
    }

    let needles = brand_needles(brand);
    let broad: Vec<ProductRecord> = products
        .iter()
        .filter(|p| {
            let title = p.title.to_lowercase();
            is_exact_brand(p, brand) || needles.iter().any(|n| title.contains(n.as_str()))
        })
        .cloned()
        .collect();
    if broad.len() >= MIN_BROAD_BRAND_MATCHES {
        debug!(brand, exact = exact.len(), broad = broad.len(), "broadened brand filter");
        return broad;
    }

    debug!(brand, broad = broad.len(), "too few brand matches, keeping unfiltered results");
    products
}

fn is_exact_brand(product: &ProductRecord, brand: &str) -> bool {
    product
        .brand
        .as_deref()
        .is_some_and(|b| b.trim().eq_ignore_ascii_case(brand))
}

fn brand_needles(brand: &str) -> Vec<String> {
    let lower = brand.to_lowercase();
    let mut needles = vec![lower.clone()];
    if lower == "alienware" || lower == "alien" {
        needles.push("alienware".to_string());
        needles.push("alien".to_string());
    }
    needles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(asin: &str, title: &str, brand: Option<&str>) -> ProductRecord {
        ProductRecord {
            asin: asin.to_string(),
            title: title.to_string(),
            brand: brand.map(str::to_string),
            ..Default::default()
        }
    }

    struct Fixed(Vec<ProductRecord>);

    #[async_trait]
    impl ProductSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn search(&self, _params: &SearchParams) -> Result<Vec<ProductRecord>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl ProductSource for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn search(&self, _params: &SearchParams) -> Result<Vec<ProductRecord>> {
            bail!("connection refused")
        }
    }

    #[test]
    fn exact_brand_when_enough() {
        let mut products: Vec<_> = (0..6)
            .map(|i| product(&format!("D{}", i), "Laptop", Some("Dell")))
            .collect();
        products.push(product("H1", "HP Pavilion", Some("HP")));
        let out = filter_by_brand(products, "dell");
        assert_eq!(out.len(), 6);
        assert!(out.iter().all(|p| p.brand.as_deref() == Some("Dell")));
    }

    #[test]
    fn broadens_to_title_match() {
        let products = vec![
            product("D1", "Dell XPS 13", Some("Dell")),
            product("D2", "Dell Inspiron 14", None),
            product("D3", "Refurbished DELL Latitude", Some("Generic")),
            product("H1", "HP Envy", Some("HP")),
        ];
        let out = filter_by_brand(products, "Dell");
        let asins: Vec<_> = out.iter().map(|p| p.asin.as_str()).collect();
        assert_eq!(asins, vec!["D1", "D2", "D3"]);
    }

    #[test]
    fn alienware_alias() {
        let products = vec![
            product("A1", "Alienware m16 R2", None),
            product("A2", "Alien gaming laptop x17", None),
            product("A3", "alienware x14", None),
            product("O1", "Other laptop", None),
        ];
        let out = filter_by_brand(products, "Alienware");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn reverts_to_unfiltered_when_sparse() {
        let products = vec![
            product("R1", "Razer Blade 14", Some("Razer")),
            product("H1", "HP Envy", Some("HP")),
            product("L1", "Lenovo Legion", Some("Lenovo")),
        ];
        let out = filter_by_brand(products, "Razer");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn malformed_record_is_skipped() {
        let values = vec![
            serde_json::json!({ "asin": "A1", "title": "Dell XPS", "ratingsCount": null }),
            serde_json::json!({ "asin": "A2", "title": "HP Envy", "price": "cheap" }),
            serde_json::json!({ "asin": "A3", "title": "Acer Swift", "ratingsCount": 12 }),
        ];
        let asins: Vec<_> = decode_records(values).into_iter().map(|p| p.asin).collect();
        assert_eq!(asins, vec!["A1", "A3"]);
    }

    #[tokio::test]
    async fn failure_yields_empty_list() {
        let params = SearchParams {
            query: "laptop".into(),
            ..Default::default()
        };
        let out = fetch_products(&Failing, &params, 10).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn drops_blank_and_repeated_asins_then_truncates() {
        let source = Fixed(vec![
            product("A1", "Dell XPS 13, 16GB RAM", None),
            product("", "No asin", None),
            product("A1", "Dell XPS 13 duplicate", None),
            product("A2", "HP Envy", None),
            product("A3", "Acer Swift", None),
        ]);
        let params = SearchParams {
            query: "laptop".into(),
            ..Default::default()
        };
        let out = fetch_products(&source, &params, 2).await;
        let asins: Vec<_> = out.iter().map(|p| p.asin.as_str()).collect();
        assert_eq!(asins, vec!["A1", "A2"]);
        assert_eq!(out[0].brand.as_deref(), Some("Dell"));
        assert_eq!(out[0].ram.as_deref(), Some("16GB"));
    }
}
