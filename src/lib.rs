//! # Laptop Press
//!
//! Content assembly for laptop-shopping blog posts.
//!
//! Laptop Press derives product-search parameters from a free-text prompt,
//! fetches product records from a product-search API, asks an LLM for an
//! HTML draft, and turns that draft into a publishable Top10 post: product
//! cards placed in rank order, duplicates removed, one video embed.
//! The same core is exposed through a CLI and a JSON HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ Search params│──▶│ Product fetch│──▶│  Completion   │
//! │  (prompt)    │   │ HTTP source  │   │  (OpenAI)     │
//! └──────────────┘   └──────┬───────┘   └──────┬────────┘
//!                           │ products         │ draft
//!                           ▼                  ▼
//!                    ┌─────────────────────────────────┐
//!                    │ normalize ▶ placeholders ▶      │
//!                    │ dedup ▶ video ▶ validate        │
//!                    └───────────────┬─────────────────┘
//!                                    │
//!                      ┌─────────────┼─────────────┐
//!                      ▼             ▼             ▼
//!                 ┌─────────┐   ┌─────────┐   ┌─────────┐
//!                 │   CLI   │   │  HTTP   │   │ SQLite  │
//!                 │(lpress) │   │ server  │   │  posts  │
//!                 └─────────┘   └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lpress init                                   # create database
//! lpress params "Top 10 best Dell laptops under \$1000"
//! lpress process --content draft.html --products products.json
//! lpress generate "Top 10 gaming laptops" --category Top10 --save
//! lpress serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline and store error types |
//! | [`search_params`] | Prompt → search parameters |
//! | [`specs`] | Spec extraction from titles, product scoring |
//! | [`product_fetch`] | Product-search client and brand filtering |
//! | [`card`] | Product card HTML |
//! | [`normalize`] | LLM HTML repair |
//! | [`placeholder`] | Product card placement strategies |
//! | [`dedup`] | Duplicate card removal |
//! | [`video`] | Video embed |
//! | [`llm`] | Completion client and response parsing |
//! | [`prompts`] | Category prompts |
//! | [`pipeline`] | End-to-end generation |
//! | [`posts`] | Local post store |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod card;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod placeholder;
pub mod posts;
pub mod product_fetch;
pub mod progress;
pub mod prompts;
pub mod search_params;
pub mod server;
pub mod specs;
pub mod traits;
pub mod video;
