use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::brand::ProductInfo;

static SUBSCRIPTION_BOX: Lazy<Regex> = Lazy::new(|| compile(r"subscription[\s-]*box(es)?"));

static EXCLUDED: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"gift[\s-]*cards?",
        r"\be-?gifts?",
        r"vouchers?",
        r"gift[\s-]*certificates?",
        r"memberships?",
        r"subscriptions?",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("invalid built-in product pattern {pattern:?}: {err}"),
    }
}

/// True for catalog entries that can't be photographed: gift cards, vouchers,
/// memberships, plain subscriptions. Subscription *boxes* are physical and stay.
pub fn should_exclude_product(product: &ProductInfo) -> bool {
    let haystack = format!("{} {}", product.name, product.category).to_lowercase();
    let haystack = SUBSCRIPTION_BOX.replace_all(&haystack, " ");
    EXCLUDED.iter().any(|pattern| pattern.is_match(&haystack))
}

pub fn eligible_products(products: &[ProductInfo]) -> Vec<ProductInfo> {
    products
        .iter()
        .filter(|product| !should_exclude_product(product))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SelectionScores {
    #[serde(default, alias = "visualPotential")]
    pub visual_potential: Option<f64>,
    #[serde(default, alias = "brandAlignment")]
    pub brand_alignment: Option<f64>,
    #[serde(default, alias = "audienceAppeal")]
    pub audience_appeal: Option<f64>,
    #[serde(default, alias = "socialShareability")]
    pub social_shareability: Option<f64>,
}

impl SelectionScores {
    /// Clamps every present score into the 0–10 range the prompt asks for.
    pub fn clamped(self) -> Self {
        let clamp = |score: Option<f64>| score.filter(|value| value.is_finite()).map(|value| value.clamp(0.0, 10.0));
        Self {
            visual_potential: clamp(self.visual_potential),
            brand_alignment: clamp(self.brand_alignment),
            audience_appeal: clamp(self.audience_appeal),
            social_shareability: clamp(self.social_shareability),
        }
    }
}

/// How the featured product was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    OnlyCandidate,
    Model,
    RandomFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSelection {
    pub product: ProductInfo,
    pub reasoning: String,
    #[serde(default)]
    pub scores: Option<SelectionScores>,
    pub method: SelectionMethod,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, category: &str) -> ProductInfo {
        ProductInfo {
            name: name.to_string(),
            category: category.to_string(),
            description: String::new(),
            url: None,
        }
    }

    #[test]
    fn excludes_non_visual_catalog_entries() {
        assert!(should_exclude_product(&product("$50 Gift Card", "Gift Cards")));
        assert!(should_exclude_product(&product("Premium Membership", "Services")));
        assert!(should_exclude_product(&product("Holiday eGift", "Digital")));
        assert!(should_exclude_product(&product("E-Gift for Dad", "")));
        assert!(should_exclude_product(&product("Spa Voucher", "Experiences")));
        assert!(should_exclude_product(&product("Gift Certificate", "")));
        assert!(should_exclude_product(&product("Coffee Club", "Subscriptions")));
        assert!(should_exclude_product(&product("Annual plan", "GIFTCARDS")));
    }

    #[test]
    fn keeps_physical_products_and_subscription_boxes() {
        assert!(!should_exclude_product(&product("Monthly Subscription Box", "Bundles")));
        assert!(!should_exclude_product(&product("Snack subscription-boxes", "Food")));
        assert!(!should_exclude_product(&product("Trail Runner 2", "Shoes")));
        assert!(!should_exclude_product(&product("Gift Box Set", "Bundles")));
        assert!(!should_exclude_product(&product("Free gift with purchase tote", "Bags")));
    }

    #[test]
    fn subscription_box_exemption_does_not_hide_other_matches() {
        assert!(should_exclude_product(&product(
            "Subscription Box Gift Card",
            "Gifts"
        )));
    }

    #[test]
    fn eligible_products_preserves_order() {
        let catalog = vec![
            product("Mug", "Kitchen"),
            product("$25 Gift Card", "Gift Cards"),
            product("Tote", "Bags"),
        ];
        let names: Vec<String> = eligible_products(&catalog)
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, vec!["Mug", "Tote"]);
    }

    #[test]
    fn scores_are_clamped_into_range() {
        let scores = SelectionScores {
            visual_potential: Some(12.0),
            brand_alignment: Some(-1.0),
            audience_appeal: Some(f64::NAN),
            social_shareability: Some(7.5),
        }
        .clamped();
        assert_eq!(scores.visual_potential, Some(10.0));
        assert_eq!(scores.brand_alignment, Some(0.0));
        assert_eq!(scores.audience_appeal, None);
        assert_eq!(scores.social_shareability, Some(7.5));
    }
}
