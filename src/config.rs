use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub products: ProductsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub affiliate: AffiliateConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// A fully defaulted config for commands that never touch the network
    /// or the database (`process`, `params`, `card`).
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            products: ProductsConfig::default(),
            llm: LlmConfig::default(),
            affiliate: AffiliateConfig::default(),
            pipeline: PipelineConfig::default(),
            video: VideoConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/lpress.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProductsConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_products_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_products_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_products_limit")]
    pub limit: usize,
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_products_key_env(),
            timeout_secs: default_products_timeout(),
            limit: default_products_limit(),
        }
    }
}

fn default_products_key_env() -> String {
    "PRODUCT_API_KEY".to_string()
}
fn default_products_timeout() -> u64 {
    30
}
fn default_products_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff(),
            timeout_secs: default_llm_timeout(),
            api_key_env: default_llm_key_env(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_provider() -> String {
    "disabled".to_string()
}
fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff() -> u64 {
    1
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AffiliateConfig {
    #[serde(default = "default_affiliate_tag")]
    pub tag: String,
    #[serde(default = "default_affiliate_base")]
    pub base_url: String,
}

impl Default for AffiliateConfig {
    fn default() -> Self {
        Self {
            tag: default_affiliate_tag(),
            base_url: default_affiliate_base(),
        }
    }
}

fn default_affiliate_tag() -> String {
    "laptoppress-20".to_string()
}
fn default_affiliate_base() -> String {
    "https://amazon.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_min_replacements")]
    pub min_replacements: usize,
    #[serde(default = "default_max_products")]
    pub max_products: usize,
    #[serde(default)]
    pub strict_placeholders: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_replacements: default_min_replacements(),
            max_products: default_max_products(),
            strict_placeholders: false,
        }
    }
}

fn default_min_replacements() -> usize {
    5
}
fn default_max_products() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoConfig {
    #[serde(default = "default_video_url")]
    pub embed_url: String,
    #[serde(default = "default_video_title")]
    pub title: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            embed_url: default_video_url(),
            title: default_video_title(),
        }
    }
}

fn default_video_url() -> String {
    "https://www.youtube.com/embed/videoseries?list=PLlaptoppress".to_string()
}
fn default_video_title() -> String {
    "How we test laptops".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate pipeline
    if config.pipeline.max_products == 0 || config.pipeline.max_products > 10 {
        anyhow::bail!("pipeline.max_products must be in [1, 10]");
    }
    if config.pipeline.min_replacements == 0 {
        anyhow::bail!("pipeline.min_replacements must be >= 1");
    }

    // Validate LLM
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.affiliate.tag.trim().is_empty() {
        anyhow::bail!("affiliate.tag must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.pipeline.min_replacements, 5);
        assert_eq!(config.llm.max_retries, 2);
        assert_eq!(config.llm.timeout_secs, 120);
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn rejects_unknown_provider() {
        let config: Config = toml::from_str("[llm]\nprovider = \"bard\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_oversized_product_list() {
        let config: Config = toml::from_str("[pipeline]\nmax_products = 25\n").unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_products"));
    }
}
