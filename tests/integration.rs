use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lpress_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lpress");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/lpress.sqlite"

[affiliate]
tag = "testtag-20"

[pipeline]
min_replacements = 5

[server]
bind = "127.0.0.1:7399"
"#,
        root.display()
    );

    let config_path = config_dir.join("lpress.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lpress(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lpress_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lpress binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_products(dir: &Path, n: usize) -> PathBuf {
    let products: Vec<serde_json::Value> = (1..=n)
        .map(|i| {
            serde_json::json!({
                "asin": format!("A{}", i),
                "title": format!("Dell Laptop {}, Intel Core i7-1360P, 16GB RAM, 512GB SSD", i),
                "price": 700.0 + i as f64,
                "rating": 4.5,
                "ratingsCount": 100 * i,
            })
        })
        .collect();
    let path = dir.join("products.json");
    fs::write(&path, serde_json::to_string(&products).unwrap()).unwrap();
    path
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lpress(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_lpress(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_lpress(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_posts_list_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_lpress(&config_path, &["init"]);
    let (stdout, stderr, success) = run_lpress(&config_path, &["posts", "list"]);
    assert!(success, "posts list failed: {}", stderr);
    assert!(stdout.contains("No posts."));
}

#[test]
fn test_posts_show_missing() {
    let (_tmp, config_path) = setup_test_env();

    run_lpress(&config_path, &["init"]);
    let (_, stderr, success) = run_lpress(&config_path, &["posts", "show", "no-such-post"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_params_extracts_brand_price_and_sort() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lpress(
        &config_path,
        &["params", "Top 10 best Dell laptops under $1000"],
    );
    assert!(success, "params failed: {}", stderr);
    let params: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(params["brand"], "Dell");
    assert_eq!(params["maxPrice"], 1000.0);
    assert_eq!(params["sortBy"], "BEST_SELLERS");
}

#[test]
fn test_params_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (stdout, _, success) = run_lpress(&missing, &["params", "cheap laptop"]);
    assert!(success);
    assert!(stdout.contains("\"query\""));
}

#[test]
fn test_card_uses_configured_affiliate_tag() {
    let (tmp, config_path) = setup_test_env();
    let product = tmp.path().join("p.json");
    fs::write(
        &product,
        r#"{"asin":"B0CARD","title":"HP Envy 16","price":1499.99,"rating":4.2}"#,
    )
    .unwrap();

    let (stdout, stderr, success) = run_lpress(
        &config_path,
        &["card", "--file", product.to_str().unwrap(), "--rank", "4"],
    );
    assert!(success, "card failed: {}", stderr);
    assert!(stdout.contains(r#"data-asin="B0CARD""#));
    assert!(stdout.contains(r#"data-rank="4""#));
    assert!(stdout.contains("tag=testtag-20"));
    assert!(stdout.contains("$1,499.99"));
}

#[test]
fn test_process_end_to_end_offline() {
    let (tmp, config_path) = setup_test_env();
    let products = write_products(tmp.path(), 10);

    let mut draft = String::from(
        r#"{"title":"Top 10 Dell laptops","content":"<h1>Top 10 best Dell laptops under $1000</h1><p>Our picks."#,
    );
    for i in 1..=10 {
        draft.push_str(&format!(
            "<h3>{}. Dell Laptop {}</h3>[PRODUCT_DATA_{}]<p>Why it made the list.</p>",
            i, i, i
        ));
    }
    draft.push_str(r#"<h2>Conclusion</h2><p>Pick one.</p>"}"#);
    let content = tmp.path().join("draft.json");
    fs::write(&content, draft).unwrap();

    let (stdout, stderr, success) = run_lpress(
        &config_path,
        &[
            "process",
            "--content",
            content.to_str().unwrap(),
            "--products",
            products.to_str().unwrap(),
        ],
    );
    assert!(success, "process failed: {}", stderr);
    assert_eq!(stdout.matches("data-asin=").count(), 10);
    assert!(!stdout.contains("[PRODUCT_DATA_"));
    assert_eq!(stdout.matches(r#"data-embed="top10-video""#).count(), 1);
    assert!(stderr.contains("\"strategy\":\"explicit_tokens\""));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[pipeline]\nmax_products = 50\n").unwrap();

    let (_, stderr, success) = run_lpress(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("max_products"), "stderr: {}", stderr);
}

#[test]
fn test_generate_rejects_disabled_llm() {
    let (_tmp, config_path) = setup_test_env();
    let mut cfg = fs::read_to_string(&config_path).unwrap();
    cfg.push_str("\n[products]\nendpoint = \"http://127.0.0.1:9/search\"\n");
    fs::write(&config_path, cfg).unwrap();

    let (_, stderr, success) = run_lpress(
        &config_path,
        &["generate", "Top 10 laptops", "--category", "Top10"],
    );
    assert!(!success);
    assert!(stderr.contains("disabled"), "stderr: {}", stderr);
}
