//! # Laptop Press CLI (`lpress`)
//!
//! The `lpress` binary is the primary interface for Laptop Press. It provides
//! commands for database initialization, product search, blog post
//! generation, offline Top10 assembly, post management, and starting the
//! HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lpress --config ./config/lpress.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lpress init` | Create the SQLite database and run schema migrations |
//! | `lpress params "<prompt>"` | Show the search parameters derived from a prompt |
//! | `lpress products "<prompt>"` | Search products for a prompt |
//! | `lpress card --file p.json --rank 1` | Render one product card |
//! | `lpress process --content d.html --products p.json` | Assemble a Top10 draft offline |
//! | `lpress generate "<prompt>" --category Top10` | Run the full pipeline |
//! | `lpress posts list` | List saved posts |
//! | `lpress serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `laptop_press=info`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use laptop_press::card::render_product_card;
use laptop_press::config::{self, Config};
use laptop_press::llm::create_provider;
use laptop_press::models::{Category, ProductRecord};
use laptop_press::pipeline::{assemble_top10, GenerateRequest, Pipeline};
use laptop_press::posts::{self, NewPost};
use laptop_press::product_fetch::{fetch_products, HttpProductSource};
use laptop_press::progress::ProgressMode;
use laptop_press::search_params::extract_search_params;
use laptop_press::specs::score_product;
use laptop_press::{migrate, server};

/// Laptop Press CLI — content assembly for laptop-shopping blog posts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lpress.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lpress",
    about = "Laptop Press — content assembly for laptop-shopping blog posts",
    version,
    long_about = "Laptop Press derives product searches from a prompt, asks an LLM for an HTML \
    draft, and assembles a publishable post with product cards, de-duplication and a video embed."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lpress.toml`. Commands that need no network or
    /// database fall back to built-in defaults when the file does not exist.
    #[arg(long, global = true, default_value = "./config/lpress.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `blog_posts` table.
    /// Running it again is safe.
    Init,

    /// Print the search parameters derived from a prompt as JSON.
    Params {
        /// Free-text prompt, e.g. "Top 10 best Dell laptops under $1000".
        prompt: String,
    },

    /// Search products for a prompt and print them with their scores.
    Products {
        prompt: String,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Render a product card from a product JSON file.
    Card {
        /// File containing one product record as JSON.
        #[arg(long)]
        file: PathBuf,

        /// Rank shown on the card.
        #[arg(long, default_value_t = 1)]
        rank: usize,
    },

    /// Assemble a Top10 draft with a product list, without any network call.
    ///
    /// Prints the final HTML to stdout and the assembly report to stderr.
    Process {
        /// Draft body: HTML, plain text, or a JSON envelope.
        #[arg(long)]
        content: PathBuf,

        /// JSON array of product records, in rank order.
        #[arg(long)]
        products: PathBuf,
    },

    /// Generate a blog post.
    Generate {
        prompt: String,

        /// Top10, Review, Comparison, or How-To.
        #[arg(long, default_value = "Top10")]
        category: String,

        /// Product ASIN for Review and Comparison posts.
        #[arg(long)]
        asin: Option<String>,

        /// Second product ASIN for Comparison posts.
        #[arg(long)]
        asin2: Option<String>,

        /// Save the result as an unpublished post.
        #[arg(long)]
        save: bool,

        /// Progress output on stderr: off, human, or json.
        /// Defaults to human on a terminal, off otherwise.
        #[arg(long)]
        progress: Option<String>,

        /// Print the whole result as JSON instead of the HTML body.
        #[arg(long)]
        json: bool,
    },

    /// Manage saved posts.
    Posts {
        #[command(subcommand)]
        action: PostsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

/// Post management subcommands.
#[derive(Subcommand)]
enum PostsAction {
    /// List posts, newest first.
    List {
        #[arg(long)]
        category: Option<String>,

        /// Only published posts.
        #[arg(long)]
        published: bool,
    },
    /// Show one post by id or slug.
    Show { id: String },
    /// Mark a post as published.
    Publish {
        id: String,

        /// Revert to draft instead.
        #[arg(long)]
        unpublish: bool,
    },
    /// Delete a post.
    Delete { id: String },
}

/// Load the config file, or defaults when it does not exist.
fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Ok(Config::minimal())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn parse_category(category: Option<String>) -> Result<Option<Category>> {
    category.map(|c| c.parse::<Category>()).transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laptop_press=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    // Commands that don't require a config file
    match &cli.command {
        Commands::Params { prompt } => {
            let params = extract_search_params(prompt);
            println!("{}", serde_json::to_string_pretty(&params)?);
            return Ok(());
        }
        Commands::Card { file, rank } => {
            let cfg = load_or_minimal(&cli.config)?;
            let product: ProductRecord = read_json(file)?;
            println!("{}", render_product_card(Some(&product), *rank, &cfg.affiliate));
            return Ok(());
        }
        Commands::Process { content, products } => {
            let cfg = load_or_minimal(&cli.config)?;
            let draft = std::fs::read_to_string(content)
                .with_context(|| format!("Failed to read {}", content.display()))?;
            let products: Vec<ProductRecord> = read_json(products)?;
            let (html, report) = assemble_top10(&draft, &products, &cfg)?;
            println!("{}", html);
            eprintln!("{}", serde_json::to_string(&report)?);
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Products { prompt, json } => {
            let source = HttpProductSource::new(&cfg.products)?;
            let params = extract_search_params(&prompt);
            let products = fetch_products(&source, &params, cfg.products.limit).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&products)?);
            } else if products.is_empty() {
                println!("No products found for '{}'.", params.query);
            } else {
                for (i, p) in products.iter().enumerate() {
                    let price = p
                        .price
                        .map(|v| format!("${:.2}", v))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:>2}. {:<12} {:>10}  score {:>5.1}  {}",
                        i + 1,
                        p.asin,
                        price,
                        score_product(p),
                        p.title
                    );
                }
            }
        }
        Commands::Generate {
            prompt,
            category,
            asin,
            asin2,
            save,
            progress,
            json,
        } => {
            let source = HttpProductSource::new(&cfg.products)?;
            let llm = create_provider(&cfg.llm)?;
            if llm.is_none() {
                bail!("llm.provider is disabled; set [llm] provider = \"openai\" to generate posts");
            }
            let reporter = ProgressMode::from_flag(progress.as_deref())?.reporter();

            let pipeline =
                Pipeline::new(&cfg, &source, llm.as_deref()).with_progress(reporter.as_ref());
            let request = GenerateRequest {
                prompt,
                category,
                asin,
                asin2,
            };
            let post = pipeline.generate_blog_post(&request).await?;

            if save {
                let saved = posts::save_post(&cfg, &NewPost::from_generated(&post)).await?;
                eprintln!("Saved post {} ({})", saved.id, saved.slug);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&post)?);
            } else {
                println!("{}", post.draft.content);
            }
        }
        Commands::Posts { action } => match action {
            PostsAction::List {
                category,
                published,
            } => {
                posts::run_list(&cfg, parse_category(category)?, published).await?;
            }
            PostsAction::Show { id } => {
                posts::run_show(&cfg, &id).await?;
            }
            PostsAction::Publish { id, unpublish } => {
                let post = posts::set_published(&cfg, &id, !unpublish).await?;
                println!(
                    "{} is now {}.",
                    post.slug,
                    if post.published { "published" } else { "a draft" }
                );
            }
            PostsAction::Delete { id } => {
                posts::delete_post(&cfg, &id).await?;
                println!("Deleted {}.", id);
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Params { .. } | Commands::Card { .. } | Commands::Process { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
