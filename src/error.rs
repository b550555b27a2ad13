//! Error types for the content pipeline and the post store.

use thiserror::Error;

/// Failures of a blog-post generation request.
///
/// Structural content defects never appear here: the normalizer, resolver
/// and de-duplicator absorb them and only log.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Rejected before any network call (empty prompt, unknown category).
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// A Top10 post has no products: the search returned nothing, or the
    /// caller supplied an empty list.
    #[error("no products available for '{0}'")]
    NoProducts(String),

    /// A Review or Comparison ASIN could not be resolved.
    #[error("product not found: {0}")]
    ProductNotFound(String),

    /// LLM or product-search HTTP failure after retries.
    #[error("upstream service error: {0}")]
    Upstream(String),

    /// The LLM output could not be read as a draft.
    #[error("could not parse model response: {0}")]
    Parse(String),

    /// The draft had no usable content after normalization.
    #[error("generated content is empty or unusable: {0}")]
    EmptyContent(#[from] NormalizeError),

    /// Placeholder tokens survived every placement strategy (strict mode only).
    #[error("{0} product placeholder(s) could not be resolved")]
    UnresolvedPlaceholders(usize),

    /// No completion provider is configured.
    #[error("llm provider is disabled")]
    Disabled,
}

/// Output invariant violations of the content normalizer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("content is empty")]
    Empty,
    #[error("content has no heading")]
    MissingHeading,
    #[error("content has no paragraph")]
    MissingParagraph,
}

/// Post store failures.
#[derive(Debug, Error)]
pub enum PersistError {
    /// A post with the same slug already exists in the category.
    #[error("a {category} post with slug '{slug}' already exists")]
    Conflict { slug: String, category: String },

    #[error("post not found: {0}")]
    NotFound(String),

    /// Write rejected by an access policy or a read-only database.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("database error: {0}")]
    Database(String),
}
