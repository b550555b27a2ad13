//! Extension traits for product sources and completion providers.
//!
//! The pipeline talks to its two external collaborators only through these
//! traits, so tests and embedders can plug in their own implementations:
//!
//! ```text
//! ┌──────────────────┐      ┌───────────────────────┐
//! │  ProductSource   │      │  CompletionProvider   │
//! │  HTTP / custom   │      │  OpenAI / custom      │
//! └────────┬─────────┘      └───────────┬───────────┘
//!          └──────────────┬─────────────┘
//!                         ▼
//!              Pipeline::generate_blog_post()
//! ```
//!
//! # Usage
//!
//! ```rust
//! use anyhow::Result;
//! use async_trait::async_trait;
//! use laptop_press::models::{ProductRecord, SearchParams};
//! use laptop_press::traits::ProductSource;
//!
//! struct FixedCatalog(Vec<ProductRecord>);
//!
//! #[async_trait]
//! impl ProductSource for FixedCatalog {
//!     fn name(&self) -> &str { "fixed" }
//!
//!     async fn search(&self, _params: &SearchParams) -> Result<Vec<ProductRecord>> {
//!         Ok(self.0.clone())
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{ProductRecord, SearchParams};

// ═══════════════════════════════════════════════════════════════════════
// ProductSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// A catalog that can answer product searches.
///
/// Implementations return raw records; brand filtering, truncation and
/// spec enrichment happen in [`crate::product_fetch::fetch_products`].
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Short identifier used in logs (e.g. `"http"`).
    fn name(&self) -> &str;

    /// Run a product search. Errors are transport or decoding failures;
    /// "nothing matched" is `Ok(vec![])`.
    async fn search(&self, params: &SearchParams) -> Result<Vec<ProductRecord>>;

    /// Look up a single product by ASIN.
    ///
    /// The default searches for the ASIN as a query and keeps an exact match.
    async fn lookup(&self, asin: &str) -> Result<Option<ProductRecord>> {
        let params = SearchParams {
            query: asin.to_string(),
            ..Default::default()
        };
        let found = self.search(&params).await?;
        Ok(found.into_iter().find(|p| p.asin.eq_ignore_ascii_case(asin)))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CompletionProvider Trait
// ═══════════════════════════════════════════════════════════════════════

/// A single chat-completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion backend returning the raw assistant text.
///
/// Retry and timeout policy belong to the implementation; callers treat
/// any `Err` as an upstream failure.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Model identifier reported in logs and responses.
    fn model_name(&self) -> &str;

    /// Send the request and return the assistant message content.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
