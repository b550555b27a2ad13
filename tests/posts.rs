use tempfile::TempDir;

use laptop_press::config::Config;
use laptop_press::error::PersistError;
use laptop_press::migrate::run_migrations;
use laptop_press::models::Category;
use laptop_press::posts::{delete_post, get_post, list_posts, save_post, set_published, NewPost};

async fn store() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::minimal();
    config.db.path = tmp.path().join("posts.sqlite");
    run_migrations(&config).await.unwrap();
    (tmp, config)
}

fn new_post(title: &str, category: Category) -> NewPost {
    NewPost {
        title: title.to_string(),
        content: format!("<h1>{}</h1><p>Body.</p>", title),
        excerpt: "Body.".to_string(),
        category,
        slug: None,
        image_url: None,
        author: None,
        tags: vec!["laptops".to_string()],
        published: false,
    }
}

#[tokio::test]
async fn save_then_get_by_id_and_slug() {
    let (_tmp, config) = store().await;

    let saved = save_post(&config, &new_post("Best Gaming Laptops 2024", Category::Top10))
        .await
        .unwrap();
    assert_eq!(saved.slug, "best-gaming-laptops-2024");
    assert!(!saved.author.is_empty());
    assert!(!saved.published);

    let by_id = get_post(&config, &saved.id).await.unwrap();
    let by_slug = get_post(&config, "best-gaming-laptops-2024").await.unwrap();
    assert_eq!(by_id.id, saved.id);
    assert_eq!(by_slug.id, saved.id);
    assert_eq!(by_slug.tags, vec!["laptops"]);
}

#[tokio::test]
async fn same_slug_conflicts_only_within_a_category() {
    let (_tmp, config) = store().await;

    save_post(&config, &new_post("Dell XPS 13", Category::Review))
        .await
        .unwrap();
    let err = save_post(&config, &new_post("Dell XPS 13", Category::Review))
        .await
        .unwrap_err();
    assert!(matches!(err, PersistError::Conflict { .. }), "{:?}", err);

    save_post(&config, &new_post("Dell XPS 13", Category::Comparison))
        .await
        .unwrap();
    assert_eq!(list_posts(&config, None, false).await.unwrap().len(), 2);
}

#[tokio::test]
async fn publish_filters_listing() {
    let (_tmp, config) = store().await;

    let a = save_post(&config, &new_post("Alpha", Category::HowTo)).await.unwrap();
    save_post(&config, &new_post("Beta", Category::HowTo)).await.unwrap();

    let published = set_published(&config, &a.id, true).await.unwrap();
    assert!(published.published);

    let live = list_posts(&config, Some(Category::HowTo), true).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].title, "Alpha");
    assert!(list_posts(&config, Some(Category::Top10), false)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_and_missing_posts() {
    let (_tmp, config) = store().await;

    let post = save_post(&config, &new_post("Gone Soon", Category::Top10)).await.unwrap();
    delete_post(&config, &post.id).await.unwrap();

    assert!(matches!(
        get_post(&config, &post.id).await,
        Err(PersistError::NotFound(_))
    ));
    assert!(matches!(
        delete_post(&config, &post.id).await,
        Err(PersistError::NotFound(_))
    ));
    assert!(matches!(
        set_published(&config, "nope", true).await,
        Err(PersistError::NotFound(_))
    ));
}
