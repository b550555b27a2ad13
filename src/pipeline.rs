//! The content assembly pipeline.
//!
//! One request runs as a single call chain. Fetched products are threaded
//! through as values from the fetch step to the assembly step:
//!
//! ```text
//! prompt ─▶ extract_search_params ─▶ fetch_products ─▶ completion
//!                                         │                │
//!                                         ▼                ▼
//!                                  Vec<ProductRecord> ─▶ assemble_top10
//!                                                      normalize
//!                                                      resolve placeholders
//!                                                      dedupe
//!                                                      embed video
//!                                                      leftover tokens
//!                                                      validate
//! ```
//!
//! Review and Comparison posts look their products up by ASIN and place the
//! cards with the same resolver. How-To posts are normalized only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::dedupe_products;
use crate::error::GenerateError;
use crate::llm::parse_draft;
use crate::models::{Category, ContentDraft, ProductRecord};
use crate::normalize::{normalize_content, strip_tags, validate_structure};
use crate::placeholder::{resolve_placeholders, strip_leftover_tokens, Strategy};
use crate::product_fetch::fetch_products;
use crate::progress::{GenerateProgressEvent, GenerateProgressReporter, NoProgress};
use crate::prompts::build_request;
use crate::search_params::extract_search_params;
use crate::specs::enrich_product;
use crate::traits::{CompletionProvider, ProductSource};
use crate::video::{embed_video, has_video_embed};

const EXCERPT_CHARS: usize = 160;

static DATA_ASIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-asin="[^"]*""#).expect("DATA_ASIN_RE should compile"));
static FIRST_HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]\s*>").expect("FIRST_HEADING_RE should compile")
});
static FIRST_PARAGRAPH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").expect("FIRST_PARAGRAPH_RE should compile")
});

/// Inbound generation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub category: String,
    #[serde(default)]
    pub asin: Option<String>,
    #[serde(default)]
    pub asin2: Option<String>,
}

/// What the Top10 assembly did to the draft.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyReport {
    pub strategy: Option<Strategy>,
    pub replacements: usize,
    pub already_present: usize,
    pub duplicates_removed: usize,
    pub video_embedded: bool,
    pub leftover_tokens: usize,
    /// Product cards in the final html.
    pub cards: usize,
}

/// A finished draft plus the products and report that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPost {
    pub category: Category,
    pub draft: ContentDraft,
    pub products: Vec<ProductRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AssemblyReport>,
}

/// Runs generation requests against a product source and a completion
/// provider. Holds no per-request state.
pub struct Pipeline<'a> {
    config: &'a Config,
    products: &'a dyn ProductSource,
    llm: Option<&'a dyn CompletionProvider>,
    progress: &'a dyn GenerateProgressReporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        products: &'a dyn ProductSource,
        llm: Option<&'a dyn CompletionProvider>,
    ) -> Self {
        Self {
            config,
            products,
            llm,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn GenerateProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Generate one blog post.
    ///
    /// # Errors
    ///
    /// Input errors are returned before any network call. A Top10 request
    /// whose product search comes back empty fails with
    /// [`GenerateError::NoProducts`].
    pub async fn generate_blog_post(
        &self,
        request: &GenerateRequest,
    ) -> Result<GeneratedPost, GenerateError> {
        let category = validate_request(request)?;
        let llm = self.llm.ok_or(GenerateError::Disabled)?;
        info!(%category, prompt = %request.prompt.trim(), "generating blog post");

        match category {
            Category::Top10 => self.generate_top10(llm, request.prompt.trim()).await,
            Category::Review | Category::Comparison => {
                self.generate_with_lookups(llm, category, request).await
            }
            Category::HowTo => {
                let draft = self.complete(llm, category, request.prompt.trim(), &[]).await?;
                self.progress.report(GenerateProgressEvent::Assembling);
                let content = normalize_content(&draft.content);
                validate_structure(&content)?;
                self.progress.report(GenerateProgressEvent::Done { cards: 0 });
                Ok(GeneratedPost {
                    category,
                    draft: finish_draft(draft, content),
                    products: Vec::new(),
                    report: None,
                })
            }
        }
    }

    async fn generate_top10(
        &self,
        llm: &dyn CompletionProvider,
        prompt: &str,
    ) -> Result<GeneratedPost, GenerateError> {
        self.progress.report(GenerateProgressEvent::Extracting);
        let params = extract_search_params(prompt);
        debug!(?params, "search parameters");

        self.progress.report(GenerateProgressEvent::Fetching {
            query: params.query.clone(),
        });
        let mut products = fetch_products(self.products, &params, self.config.products.limit).await;
        self.progress.report(GenerateProgressEvent::Fetched {
            count: products.len() as u64,
        });
        if products.is_empty() {
            return Err(GenerateError::NoProducts(params.query));
        }
        products.truncate(self.config.pipeline.max_products);

        let draft = self.complete(llm, Category::Top10, prompt, &products).await?;

        self.progress.report(GenerateProgressEvent::Assembling);
        let (content, report) = assemble_top10(&draft.content, &products, self.config)?;
        self.progress.report(GenerateProgressEvent::Done {
            cards: report.cards as u64,
        });

        Ok(GeneratedPost {
            category: Category::Top10,
            draft: finish_draft(draft, content),
            products,
            report: Some(report),
        })
    }

    async fn generate_with_lookups(
        &self,
        llm: &dyn CompletionProvider,
        category: Category,
        request: &GenerateRequest,
    ) -> Result<GeneratedPost, GenerateError> {
        let mut asins = vec![request.asin.as_deref().unwrap_or_default()];
        if category == Category::Comparison {
            asins.push(request.asin2.as_deref().unwrap_or_default());
        }

        let mut products = Vec::with_capacity(asins.len());
        for asin in asins {
            self.progress.report(GenerateProgressEvent::Fetching {
                query: asin.to_string(),
            });
            let mut product = self
                .products
                .lookup(asin)
                .await
                .map_err(|e| GenerateError::Upstream(format!("{:#}", e)))?
                .ok_or_else(|| GenerateError::ProductNotFound(asin.to_string()))?;
            enrich_product(&mut product);
            products.push(product);
        }
        self.progress.report(GenerateProgressEvent::Fetched {
            count: products.len() as u64,
        });

        let draft = self
            .complete(llm, category, request.prompt.trim(), &products)
            .await?;

        self.progress.report(GenerateProgressEvent::Assembling);
        let normalized = normalize_content(&draft.content);
        let resolution = resolve_placeholders(
            &normalized,
            &products,
            &self.config.affiliate,
            self.config.pipeline.min_replacements,
        );
        let (content, leftovers) = strip_leftover_tokens(&resolution.html);
        if leftovers > 0 {
            warn!(leftovers, "stripped unresolved product tokens");
        }
        validate_structure(&content)?;
        self.progress.report(GenerateProgressEvent::Done {
            cards: resolution.placed() as u64,
        });

        Ok(GeneratedPost {
            category,
            draft: finish_draft(draft, content),
            products,
            report: None,
        })
    }

    async fn complete(
        &self,
        llm: &dyn CompletionProvider,
        category: Category,
        prompt: &str,
        products: &[ProductRecord],
    ) -> Result<ContentDraft, GenerateError> {
        self.progress.report(GenerateProgressEvent::Generating {
            model: llm.model_name().to_string(),
        });
        let request = build_request(&self.config.llm, category, prompt, products);
        let raw = llm
            .complete(&request)
            .await
            .map_err(|e| GenerateError::Upstream(format!("{:#}", e)))?;
        debug!(chars = raw.len(), "completion received");
        parse_draft(&raw)
    }
}

/// Reject empty prompts and unknown categories.
pub fn validate_request(request: &GenerateRequest) -> Result<Category, GenerateError> {
    if request.prompt.trim().is_empty() {
        return Err(GenerateError::InvalidInput("prompt must not be empty".into()));
    }
    if request.category.trim().is_empty() {
        return Err(GenerateError::InvalidInput("category must not be empty".into()));
    }
    let category: Category = request
        .category
        .parse()
        .map_err(|e: anyhow::Error| GenerateError::InvalidInput(e.to_string()))?;

    let missing = |a: &Option<String>| a.as_deref().map(str::trim).unwrap_or_default().is_empty();
    match category {
        Category::Review if missing(&request.asin) => Err(GenerateError::InvalidInput(
            "Review posts require an asin".into(),
        )),
        Category::Comparison if missing(&request.asin) || missing(&request.asin2) => Err(
            GenerateError::InvalidInput("Comparison posts require asin and asin2".into()),
        ),
        _ => Ok(category),
    }
}

/// Turn a Top10 draft body into publishable html.
///
/// Structural defects are repaired and logged. The errors are an empty
/// product list, an unusable body and, with `pipeline.strict_placeholders`,
/// tokens that no strategy could resolve.
pub fn assemble_top10(
    content: &str,
    products: &[ProductRecord],
    config: &Config,
) -> Result<(String, AssemblyReport), GenerateError> {
    if products.is_empty() {
        return Err(GenerateError::NoProducts("Top10 assembly".into()));
    }
    let normalized = normalize_content(content);

    let resolution = resolve_placeholders(
        &normalized,
        products,
        &config.affiliate,
        config.pipeline.min_replacements,
    );
    let deduped = dedupe_products(&resolution.html);

    let had_video = has_video_embed(&deduped.html);
    let html = embed_video(&deduped.html, &config.video);

    let (html, leftover_tokens) = strip_leftover_tokens(&html);
    if leftover_tokens > 0 {
        if config.pipeline.strict_placeholders {
            return Err(GenerateError::UnresolvedPlaceholders(leftover_tokens));
        }
        warn!(leftover_tokens, "stripped unresolved product tokens");
    }

    validate_structure(&html)?;

    let report = AssemblyReport {
        strategy: resolution.strategy,
        replacements: resolution.replacements,
        already_present: resolution.already_present,
        duplicates_removed: deduped.removed,
        video_embedded: !had_video,
        leftover_tokens,
        cards: DATA_ASIN_RE.find_iter(&html).count(),
    };
    info!(
        strategy = report.strategy.map(|s| s.as_str()).unwrap_or("none"),
        replacements = report.replacements,
        duplicates_removed = report.duplicates_removed,
        cards = report.cards,
        "top10 content assembled"
    );
    Ok((html, report))
}

/// Install the assembled body and fill a missing title or excerpt from it.
fn finish_draft(mut draft: ContentDraft, content: String) -> ContentDraft {
    if draft.title.trim().is_empty() {
        draft.title = first_text(&content, &FIRST_HEADING_RE);
    }
    if draft.excerpt.trim().is_empty() {
        let text = first_text(&content, &FIRST_PARAGRAPH_RE);
        draft.excerpt = match text.char_indices().nth(EXCERPT_CHARS) {
            Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
            None => text,
        };
    }
    draft.content = content;
    draft
}

fn first_text(html: &str, re: &Regex) -> String {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, category: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.into(),
            category: category.into(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_prompt_and_category() {
        assert!(matches!(
            validate_request(&request("  ", "Top10")),
            Err(GenerateError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_request(&request("laptops", "")),
            Err(GenerateError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_request(&request("laptops", "news")),
            Err(GenerateError::InvalidInput(_))
        ));
    }

    #[test]
    fn lookup_categories_need_asins() {
        assert!(validate_request(&request("XPS review", "Review")).is_err());
        let mut r = request("XPS vs MacBook", "Comparison");
        r.asin = Some("B01".into());
        assert!(validate_request(&r).is_err());
        r.asin2 = Some("B02".into());
        assert_eq!(validate_request(&r).unwrap(), Category::Comparison);
    }

    #[test]
    fn finish_draft_fills_title_and_excerpt() {
        let draft = finish_draft(
            ContentDraft::default(),
            "<h1>Best <em>Dell</em> laptops</h1>\n<p>Our picks.</p>".into(),
        );
        assert_eq!(draft.title, "Best Dell laptops");
        assert_eq!(draft.excerpt, "Our picks.");
    }

    #[test]
    fn strict_mode_rejects_leftover_tokens() {
        let products = vec![ProductRecord {
            asin: "A1".into(),
            title: "Laptop".into(),
            ..Default::default()
        }];
        let content = "<h1>T</h1><p>[PRODUCT_DATA_1]</p><p>see [PRODUCT_DATA_x]</p>";

        let mut config = Config::minimal();
        let (html, report) = assemble_top10(content, &products, &config).unwrap();
        assert_eq!(report.leftover_tokens, 1);
        assert!(!html.contains("[PRODUCT_DATA"));

        config.pipeline.strict_placeholders = true;
        let err = assemble_top10(content, &products, &config).unwrap_err();
        assert!(matches!(err, GenerateError::UnresolvedPlaceholders(1)));
    }

    #[test]
    fn unusable_body_is_an_error() {
        let products = vec![ProductRecord {
            asin: "A1".into(),
            ..Default::default()
        }];
        let err = assemble_top10("", &products, &Config::minimal()).unwrap_err();
        assert!(matches!(err, GenerateError::EmptyContent(_)));
    }

    #[test]
    fn empty_product_list_is_refused() {
        let content = "<h1>T</h1><h3>1. One</h3><p>[PRODUCT_DATA_1]</p><p>x</p>";
        let err = assemble_top10(content, &[], &Config::minimal()).unwrap_err();
        assert!(matches!(err, GenerateError::NoProducts(_)));
    }
}
