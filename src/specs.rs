//! Laptop specification extraction and scoring.
//!
//! Product-search results often carry the interesting specs only inside the
//! listing title ("ASUS TUF 15.6" FHD, Ryzen 7 7735HS, 16GB DDR5, 1TB SSD,
//! RTX 4060"). [`extract_specs`] runs a single prioritized pattern table over
//! the title; the first pattern that matches a field wins.
//!
//! [`score_product`] is a hand-tuned heuristic in `[0, 100]` used to show a
//! comparable number next to search results.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::ProductRecord;
use crate::search_params::find_brand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecField {
    Processor,
    Ram,
    Storage,
    Graphics,
    ScreenSize,
    BatteryLife,
}

/// How a matched pattern is turned into a display value.
#[derive(Clone, Copy)]
enum Render {
    /// Use the whole match, whitespace-collapsed.
    Whole,
    /// `<group 1> GB`.
    Gigabytes,
    /// `<group 1> <group 2 uppercased>`, e.g. `1TB SSD`.
    Capacity,
    /// `<group 1> inches`.
    Inches,
    /// `Up to <group 1> hours`.
    Hours,
}

/// Ordered `(field, pattern, render)` table. Order is priority within a field.
const SPEC_PATTERNS: &[(SpecField, &str, Render)] = &[
    (SpecField::Processor, r"(?i)\bintel\s+core\s+ultra\s+[579]\s*\w*", Render::Whole),
    (SpecField::Processor, r"(?i)\b(?:intel\s+)?core\s+i[3579][- ]?\d{4,5}[a-z]{0,2}\b", Render::Whole),
    (SpecField::Processor, r"(?i)\b(?:intel\s+)?core\s+i[3579]\b", Render::Whole),
    (SpecField::Processor, r"(?i)\b(?:amd\s+)?ryzen\s+(?:ai\s+)?[3579]\s*(?:pro\s+)?\d{0,4}[a-z]{0,3}\b", Render::Whole),
    (SpecField::Processor, r"(?i)\bapple\s+m[1-4](?:\s+(?:pro|max|ultra))?\b", Render::Whole),
    (SpecField::Processor, r"(?i)\bm[1-4]\s+(?:pro|max|ultra)?\s*chip\b", Render::Whole),
    (SpecField::Processor, r"(?i)\bsnapdragon\s+x\s*\w*(?:\s+elite|\s+plus)?", Render::Whole),
    (SpecField::Processor, r"(?i)\bintel\s+(?:celeron|pentium)\s*\w*", Render::Whole),
    (SpecField::Ram, r"(?i)\b(\d{1,3})\s?gb\s+(?:lp)?ddr\d\w*", Render::Gigabytes),
    (SpecField::Ram, r"(?i)\b(\d{1,3})\s?gb\s+(?:of\s+)?(?:ram|memory|unified\s+memory)\b", Render::Gigabytes),
    (SpecField::Ram, r"(?i)\b(\d{1,3})\s?gb\s+ram\b", Render::Gigabytes),
    (SpecField::Storage, r"(?i)\b(\d(?:\.\d)?\s?tb)\s+(?:pcie\s+|nvme\s+|m\.2\s+)*(ssd|hdd|emmc)\b", Render::Capacity),
    (SpecField::Storage, r"(?i)\b(\d{3,4}\s?gb)\s+(?:pcie\s+|nvme\s+|m\.2\s+)*(ssd|hdd|emmc)\b", Render::Capacity),
    (SpecField::Storage, r"(?i)\b(\d{2,3}\s?gb)\s+(emmc)\b", Render::Capacity),
    (SpecField::Graphics, r"(?i)\b(?:nvidia\s+)?(?:geforce\s+)?rtx\s?[2-5]0[5-9]0(?:\s?ti)?\b", Render::Whole),
    (SpecField::Graphics, r"(?i)\b(?:nvidia\s+)?(?:geforce\s+)?gtx\s?1[0-6][5-8]0(?:\s?ti)?\b", Render::Whole),
    (SpecField::Graphics, r"(?i)\b(?:amd\s+)?radeon\s+(?:rx\s+)?\w+", Render::Whole),
    (SpecField::Graphics, r"(?i)\bintel\s+(?:iris\s+xe|arc|uhd)(?:\s+graphics)?", Render::Whole),
    (SpecField::ScreenSize, r#"(?i)\b(1[0-8](?:\.\d)?)\s*(?:"|''|-?\s?inch(?:es)?\b|in\b)"#, Render::Inches),
    (SpecField::BatteryLife, r"(?i)\b(?:up\s+to\s+)?(\d{1,2})\s*(?:\+\s*)?(?:hours?|hrs?)\b", Render::Hours),
];

static COMPILED: LazyLock<Vec<(SpecField, Regex, Render)>> = LazyLock::new(|| {
    SPEC_PATTERNS
        .iter()
        .map(|(field, pattern, render)| {
            (
                *field,
                Regex::new(pattern).expect("spec pattern should compile"),
                *render,
            )
        })
        .collect()
});

/// Spec values found in a free-text title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSpecs {
    pub processor: Option<String>,
    pub ram: Option<String>,
    pub storage: Option<String>,
    pub graphics: Option<String>,
    pub screen_size: Option<String>,
    pub battery_life: Option<String>,
}

impl ExtractedSpecs {
    fn slot(&mut self, field: SpecField) -> &mut Option<String> {
        match field {
            SpecField::Processor => &mut self.processor,
            SpecField::Ram => &mut self.ram,
            SpecField::Storage => &mut self.storage,
            SpecField::Graphics => &mut self.graphics,
            SpecField::ScreenSize => &mut self.screen_size,
            SpecField::BatteryLife => &mut self.battery_life,
        }
    }
}

/// Run the pattern table over `text`.
pub fn extract_specs(text: &str) -> ExtractedSpecs {
    let mut specs = ExtractedSpecs::default();
    for (field, re, render) in COMPILED.iter() {
        let slot = specs.slot(*field);
        if slot.is_some() {
            continue;
        }
        if let Some(caps) = re.captures(text) {
            *slot = render_capture(&caps, *render);
        }
    }
    specs
}

fn render_capture(caps: &regex::Captures<'_>, render: Render) -> Option<String> {
    let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
    let value = match render {
        Render::Whole => collapse_ws(caps.get(0)?.as_str()),
        Render::Gigabytes => format!("{}GB", group(1)?),
        Render::Capacity => format!(
            "{} {}",
            group(1)?.replace(' ', "").to_uppercase(),
            group(2)?.to_uppercase()
        ),
        Render::Inches => format!("{} inches", group(1)?),
        Render::Hours => format!("Up to {} hours", group(1)?),
    };
    Some(value)
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fill absent spec fields and the brand from the product title.
pub fn enrich_product(product: &mut ProductRecord) {
    let extracted = extract_specs(&product.title);
    fill(&mut product.processor, extracted.processor);
    fill(&mut product.ram, extracted.ram);
    fill(&mut product.storage, extracted.storage);
    fill(&mut product.graphics, extracted.graphics);
    fill(&mut product.screen_size, extracted.screen_size);
    fill(&mut product.battery_life, extracted.battery_life);

    if product.brand.as_deref().map_or(true, |b| b.trim().is_empty()) {
        product.brand = find_brand(&product.title).map(str::to_string);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
        *slot = value;
    }
}

static GB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s?(tb|gb)").expect("GB_RE should compile"));

fn capacity_gb(s: &str) -> Option<f64> {
    let caps = GB_RE.captures(s)?;
    let n: f64 = caps.get(1)?.as_str().parse().ok()?;
    if caps.get(2)?.as_str().eq_ignore_ascii_case("tb") {
        Some(n * 1024.0)
    } else {
        Some(n)
    }
}

fn processor_tier(processor: &str) -> f64 {
    let p = processor.to_lowercase();
    if p.contains("i9") || p.contains("ryzen 9") || p.contains("max") || p.contains("ultra 9") {
        1.0
    } else if p.contains("i7")
        || p.contains("ryzen 7")
        || p.contains(" pro")
        || p.contains("ultra 7")
        || p.contains("elite")
    {
        0.8
    } else if p.contains("i5")
        || p.contains("ryzen 5")
        || p.contains("m1")
        || p.contains("m2")
        || p.contains("m3")
        || p.contains("m4")
        || p.contains("ultra 5")
    {
        0.6
    } else if p.contains("i3") || p.contains("ryzen 3") {
        0.35
    } else if p.contains("celeron") || p.contains("pentium") {
        0.15
    } else {
        0.3
    }
}

/// Hand-tuned product score in `[0, 100]`.
///
/// Weights: rating 30, review volume 15, processor 20, RAM 10, graphics 10,
/// storage 5, price value 10.
pub fn score_product(product: &ProductRecord) -> f64 {
    let rating = product.rating.unwrap_or(0.0).clamp(0.0, 5.0) / 5.0;
    // 10k+ reviews saturates
    let volume = ((product.ratings_count as f64) + 1.0).log10() / 4.0;
    let cpu = product.processor.as_deref().map_or(0.3, processor_tier);
    let ram = product
        .ram
        .as_deref()
        .and_then(capacity_gb)
        .map_or(0.3, |gb| (gb / 32.0).min(1.0));
    let gpu = match product.graphics.as_deref().map(str::to_lowercase) {
        Some(g) if g.contains("rtx 40") || g.contains("rtx 50") || g.contains("rtx40") => 1.0,
        Some(g) if g.contains("rtx") || g.contains("radeon rx") => 0.8,
        Some(g) if g.contains("gtx") => 0.5,
        Some(_) => 0.3,
        None => 0.2,
    };
    let storage = product
        .storage
        .as_deref()
        .and_then(capacity_gb)
        .map_or(0.3, |gb| (gb / 1024.0).min(1.0));
    let value = match product.price {
        Some(p) if p > 0.0 => (1.0 - (p / 3000.0)).clamp(0.0, 1.0),
        _ => 0.5,
    };

    let score = rating * 30.0
        + volume.min(1.0) * 15.0
        + cpu * 20.0
        + ram * 10.0
        + gpu * 10.0
        + storage * 5.0
        + value * 10.0;
    (score * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_gaming_title() {
        let s = extract_specs(
            "ASUS TUF Gaming A15 15.6\" FHD 144Hz, AMD Ryzen 7 7735HS, 16GB DDR5, 1TB PCIe SSD, NVIDIA GeForce RTX 4060",
        );
        assert_eq!(s.processor.as_deref(), Some("AMD Ryzen 7 7735HS"));
        assert_eq!(s.ram.as_deref(), Some("16GB"));
        assert_eq!(s.storage.as_deref(), Some("1TB SSD"));
        assert_eq!(s.graphics.as_deref(), Some("NVIDIA GeForce RTX 4060"));
        assert_eq!(s.screen_size.as_deref(), Some("15.6 inches"));
    }

    #[test]
    fn extracts_apple_title() {
        let s = extract_specs(
            "Apple MacBook Air 13-inch Laptop with M2 chip, 8GB Unified Memory, 256GB SSD, up to 18 hours battery",
        );
        assert_eq!(s.processor.as_deref(), Some("M2 chip"));
        assert_eq!(s.ram.as_deref(), Some("8GB"));
        assert_eq!(s.storage.as_deref(), Some("256GB SSD"));
        assert_eq!(s.screen_size.as_deref(), Some("13 inches"));
        assert_eq!(s.battery_life.as_deref(), Some("Up to 18 hours"));
    }

    #[test]
    fn enrich_keeps_existing_values() {
        let mut p = ProductRecord {
            asin: "B1".into(),
            title: "Dell Inspiron 15, Intel Core i5-1235U, 8GB RAM, 512GB SSD".into(),
            ram: Some("32GB".into()),
            ..Default::default()
        };
        enrich_product(&mut p);
        assert_eq!(p.ram.as_deref(), Some("32GB"));
        assert_eq!(p.processor.as_deref(), Some("Intel Core i5-1235U"));
        assert_eq!(p.brand.as_deref(), Some("Dell"));
        assert!(p.graphics.is_none());
    }

    #[test]
    fn score_prefers_stronger_machine() {
        let strong = ProductRecord {
            rating: Some(4.7),
            ratings_count: 3_200,
            processor: Some("Intel Core i7-13700H".into()),
            ram: Some("32GB".into()),
            graphics: Some("RTX 4070".into()),
            storage: Some("1TB SSD".into()),
            price: Some(1499.0),
            ..Default::default()
        };
        let weak = ProductRecord {
            rating: Some(3.9),
            ratings_count: 40,
            processor: Some("Intel Celeron N4020".into()),
            ram: Some("4GB".into()),
            storage: Some("64GB eMMC".into()),
            price: Some(199.0),
            ..Default::default()
        };
        let (a, b) = (score_product(&strong), score_product(&weak));
        assert!(a > b, "{} should beat {}", a, b);
        assert!((0.0..=100.0).contains(&a));
        assert!((0.0..=100.0).contains(&b));
    }
}
