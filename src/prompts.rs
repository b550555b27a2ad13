//! Category-specific prompts for the completion call.
//!
//! Model name, temperature and token limit are configuration; the prompt
//! strings below are the only per-category logic.

use crate::card::rank_for_index;
use crate::models::{Category, ProductRecord};
use crate::traits::CompletionRequest;
use crate::config::LlmConfig;

const JSON_CONTRACT: &str = "Respond with a single JSON object and nothing else, with the keys \
\"title\" (string), \"content\" (HTML string), \"excerpt\" (one or two sentences) and \"tags\" \
(array of strings). Do not wrap the JSON in markdown code fences.";

const HTML_RULES: &str = "The content must be clean HTML: one <h1> title, <h2> section headings, \
<p> paragraphs and <ul>/<li> lists. Close every tag. Do not include <html>, <head> or <body>.";

/// System prompt for a category.
pub fn system_prompt(category: Category) -> String {
    let role = match category {
        Category::Top10 => {
            "You are an expert laptop reviewer writing a ranked Top 10 buying guide. \
Write one <h3> heading per product, in the exact order the products are listed, \
formatted as \"N. Product name\". Directly after each <h3>, on its own line, write the \
token [PRODUCT_DATA_N] where N is the product's rank (1 for the first product). \
Never write product prices, ratings or specification tables yourself; the token is \
replaced with a product card. After the list, finish with an <h2>Conclusion</h2> section."
        }
        Category::Review => {
            "You are an expert laptop reviewer writing an in-depth review of a single laptop. \
Cover design, display, performance, battery life, and who should buy it, then end with \
a verdict section."
        }
        Category::Comparison => {
            "You are an expert laptop reviewer writing a head-to-head comparison of two \
laptops. Compare them section by section and end with a clear recommendation for \
different kinds of buyers."
        }
        Category::HowTo => {
            "You are a helpful laptop expert writing a step-by-step how-to guide. Use numbered \
steps under <h2> headings and explain each step in plain language."
        }
    };
    format!("{}\n\n{}\n\n{}", role, HTML_RULES, JSON_CONTRACT)
}

/// User message: the prompt, followed by the products in rank order.
pub fn user_message(prompt: &str, products: &[ProductRecord]) -> String {
    let mut out = prompt.trim().to_string();
    if products.is_empty() {
        return out;
    }

    out.push_str("\n\nProducts:\n");
    for (i, p) in products.iter().enumerate() {
        out.push_str(&format!("{}. {} (ASIN {})", rank_for_index(i), p.title, p.asin));
        if let Some(price) = p.price {
            out.push_str(&format!(", ${:.2}", price));
        }
        if let Some(rating) = p.rating {
            out.push_str(&format!(", rated {:.1}/5", rating));
        }
        let specs: Vec<&str> = [&p.processor, &p.ram, &p.graphics, &p.storage, &p.screen_size]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .collect();
        if !specs.is_empty() {
            out.push_str(&format!(", {}", specs.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// Assemble the full completion request for a category.
pub fn build_request(
    config: &LlmConfig,
    category: Category,
    prompt: &str,
    products: &[ProductRecord],
) -> CompletionRequest {
    CompletionRequest {
        system: system_prompt(category),
        user: user_message(prompt, products),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top10_prompt_asks_for_tokens_and_json() {
        let p = system_prompt(Category::Top10);
        assert!(p.contains("[PRODUCT_DATA_N]"));
        assert!(p.contains("<h3>"));
        assert!(p.contains("JSON object"));
    }

    #[test]
    fn user_message_lists_products_in_rank_order() {
        let products = vec![
            ProductRecord {
                asin: "A1".into(),
                title: "Dell XPS 13".into(),
                price: Some(999.0),
                ram: Some("16GB".into()),
                ..Default::default()
            },
            ProductRecord {
                asin: "A2".into(),
                title: "Dell Inspiron 14".into(),
                ..Default::default()
            },
        ];
        let msg = user_message("  Top 10 Dell laptops ", &products);
        assert!(msg.starts_with("Top 10 Dell laptops\n\nProducts:\n"));
        assert!(msg.contains("1. Dell XPS 13 (ASIN A1), $999.00, 16GB\n"));
        assert!(msg.contains("2. Dell Inspiron 14 (ASIN A2)\n"));
    }

    #[test]
    fn how_to_has_no_product_list() {
        assert_eq!(user_message("How to clean a keyboard", &[]), "How to clean a keyboard");
    }
}
