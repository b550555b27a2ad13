//! Local blog post store.
//!
//! Posts live in the `blog_posts` table created by `lpress init`. Slugs are
//! unique per category: [`save_post`] checks for an existing
//! `(slug, category)` row before inserting and reports a
//! [`PersistError::Conflict`] instead of relying on the constraint error.
//! Used by the `lpress posts` commands and the `/posts` HTTP endpoints.

use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::PersistError;
use crate::models::{slugify, BlogPost, Category};
use crate::pipeline::GeneratedPost;

/// Message fragments that mark a write rejected by access policy.
const PERMISSION_PATTERNS: &[&str] = &[
    "row-level security",
    "security policy",
    "violates row-level",
    "permission denied",
    "readonly database",
    "read-only",
    "access denied",
];

const DEFAULT_AUTHOR: &str = "Laptop Press";

/// A post to be inserted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub excerpt: String,
    pub category: Category,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published: bool,
}

impl NewPost {
    /// A draft post from a generation result. The first product image, if
    /// any, becomes the post image.
    pub fn from_generated(post: &GeneratedPost) -> Self {
        Self {
            title: post.draft.title.clone(),
            content: post.draft.content.clone(),
            excerpt: post.draft.excerpt.clone(),
            category: post.category,
            slug: None,
            image_url: post.products.iter().find_map(|p| p.image_url.clone()),
            author: None,
            tags: post.draft.tags.clone(),
            published: false,
        }
    }
}

/// Map a database error message to the persistence taxonomy.
pub fn classify_persistence_error(message: &str) -> PersistError {
    let lower = message.to_lowercase();
    if PERMISSION_PATTERNS.iter().any(|p| lower.contains(p)) {
        PersistError::Permission(message.to_string())
    } else {
        PersistError::Database(message.to_string())
    }
}

fn db_error(e: impl std::fmt::Display) -> PersistError {
    classify_persistence_error(&e.to_string())
}

async fn open(config: &Config) -> Result<SqlitePool, PersistError> {
    db::connect(config)
        .await
        .map_err(|e| classify_persistence_error(&format!("{:#}", e)))
}

/// Insert a post. Fails with `Conflict` if the slug is taken in the category.
pub async fn save_post(config: &Config, post: &NewPost) -> Result<BlogPost, PersistError> {
    let slug = match post.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => slugify(s),
        None => slugify(&post.title),
    };
    if slug.is_empty() {
        return Err(PersistError::Database(
            "post title does not produce a usable slug".to_string(),
        ));
    }
    let category = post.category.as_str();

    let pool = open(config).await?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM blog_posts WHERE slug = ? AND category = ?")
            .bind(&slug)
            .bind(category)
            .fetch_optional(&pool)
            .await
            .map_err(db_error)?;
    if existing.is_some() {
        pool.close().await;
        return Err(PersistError::Conflict {
            slug,
            category: category.to_string(),
        });
    }

    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    let tags_json = serde_json::to_string(&post.tags).map_err(db_error)?;
    let author = post
        .author
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(DEFAULT_AUTHOR);

    let inserted = sqlx::query(
        r#"
        INSERT INTO blog_posts
            (id, title, slug, content, excerpt, category, image_url, author, published, tags_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&post.title)
    .bind(&slug)
    .bind(&post.content)
    .bind(&post.excerpt)
    .bind(category)
    .bind(&post.image_url)
    .bind(author)
    .bind(post.published)
    .bind(&tags_json)
    .bind(now)
    .bind(now)
    .execute(&pool)
    .await;

    if let Err(e) = inserted {
        pool.close().await;
        // Lost a race with a concurrent insert of the same slug.
        if e.to_string().contains("UNIQUE constraint failed") {
            return Err(PersistError::Conflict {
                slug,
                category: category.to_string(),
            });
        }
        return Err(db_error(e));
    }

    let saved = fetch_one(&pool, &id).await;
    pool.close().await;
    let saved = saved?;
    info!(id = %saved.id, slug = %saved.slug, category, "post saved");
    Ok(saved)
}

/// Posts newest first, optionally restricted to one category or to
/// published posts.
pub async fn list_posts(
    config: &Config,
    category: Option<Category>,
    published_only: bool,
) -> Result<Vec<BlogPost>, PersistError> {
    let pool = open(config).await?;

    let mut sql = String::from("SELECT * FROM blog_posts WHERE 1 = 1");
    if category.is_some() {
        sql.push_str(" AND category = ?");
    }
    if published_only {
        sql.push_str(" AND published = 1");
    }
    sql.push_str(" ORDER BY created_at DESC, title ASC");

    let mut query = sqlx::query(&sql);
    if let Some(c) = category {
        query = query.bind(c.as_str());
    }
    let rows = query.fetch_all(&pool).await.map_err(db_error);
    pool.close().await;

    rows?.iter().map(row_to_post).collect()
}

/// Look a post up by id, or by slug when no id matches.
pub async fn get_post(config: &Config, id_or_slug: &str) -> Result<BlogPost, PersistError> {
    let pool = open(config).await?;
    let row = sqlx::query("SELECT * FROM blog_posts WHERE id = ? OR slug = ? ORDER BY id = ? DESC LIMIT 1")
        .bind(id_or_slug)
        .bind(id_or_slug)
        .bind(id_or_slug)
        .fetch_optional(&pool)
        .await
        .map_err(db_error);
    pool.close().await;

    match row? {
        Some(row) => row_to_post(&row),
        None => Err(PersistError::NotFound(id_or_slug.to_string())),
    }
}

pub async fn set_published(
    config: &Config,
    id: &str,
    published: bool,
) -> Result<BlogPost, PersistError> {
    let pool = open(config).await?;
    let result = sqlx::query("UPDATE blog_posts SET published = ?, updated_at = ? WHERE id = ?")
        .bind(published)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&pool)
        .await;

    let post = match result {
        Ok(r) if r.rows_affected() == 0 => Err(PersistError::NotFound(id.to_string())),
        Ok(_) => fetch_one(&pool, id).await,
        Err(e) => Err(db_error(e)),
    };
    pool.close().await;
    debug!(id, published, "publish state changed");
    post
}

pub async fn delete_post(config: &Config, id: &str) -> Result<(), PersistError> {
    let pool = open(config).await?;
    let result = sqlx::query("DELETE FROM blog_posts WHERE id = ?")
        .bind(id)
        .execute(&pool)
        .await;
    pool.close().await;

    match result {
        Ok(r) if r.rows_affected() == 0 => Err(PersistError::NotFound(id.to_string())),
        Ok(_) => {
            info!(id, "post deleted");
            Ok(())
        }
        Err(e) => Err(db_error(e)),
    }
}

async fn fetch_one(pool: &SqlitePool, id: &str) -> Result<BlogPost, PersistError> {
    let row = sqlx::query("SELECT * FROM blog_posts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?
        .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
    row_to_post(&row)
}

fn row_to_post(row: &SqliteRow) -> Result<BlogPost, PersistError> {
    let category: String = row.get("category");
    let category: Category = category.parse().map_err(db_error)?;
    let tags_json: String = row.get("tags_json");
    let created_at: i64 = row.get("created_at");
    let updated_at: i64 = row.get("updated_at");

    Ok(BlogPost {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        content: row.get("content"),
        excerpt: row.get("excerpt"),
        category,
        image_url: row.get("image_url"),
        author: row.get("author"),
        published: row.get("published"),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: format_ts_iso(created_at),
        updated_at: format_ts_iso(updated_at),
    })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// CLI entry point for `lpress posts list`.
pub async fn run_list(config: &Config, category: Option<Category>, published_only: bool) -> anyhow::Result<()> {
    let posts = list_posts(config, category, published_only).await?;
    if posts.is_empty() {
        println!("No posts.");
        return Ok(());
    }
    for post in &posts {
        println!(
            "{}  {:<10}  {}  {}{}",
            post.id,
            post.category.as_str(),
            post.created_at,
            post.title,
            if post.published { "" } else { "  (draft)" }
        );
    }
    Ok(())
}

/// CLI entry point for `lpress posts show`.
pub async fn run_show(config: &Config, id_or_slug: &str) -> anyhow::Result<()> {
    let post = get_post(config, id_or_slug).await?;

    println!("--- Post ---");
    println!("id:         {}", post.id);
    println!("title:      {}", post.title);
    println!("slug:       {}", post.slug);
    println!("category:   {}", post.category);
    println!("author:     {}", post.author);
    println!("published:  {}", post.published);
    if !post.tags.is_empty() {
        println!("tags:       {}", post.tags.join(", "));
    }
    println!("created_at: {}", post.created_at);
    println!("updated_at: {}", post.updated_at);
    println!();
    println!("--- Excerpt ---");
    println!("{}", post.excerpt);
    println!();
    println!("--- Content ---");
    println!("{}", post.content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_patterns() {
        assert!(matches!(
            classify_persistence_error(
                "new row violates row-level security policy for table \"blog_posts\""
            ),
            PersistError::Permission(_)
        ));
        assert!(matches!(
            classify_persistence_error("attempt to write a readonly database"),
            PersistError::Permission(_)
        ));
        assert!(matches!(
            classify_persistence_error("disk I/O error"),
            PersistError::Database(_)
        ));
    }
}
