use super::{joined, non_blank};
use crate::brand::{BrandResearch, ProductInfo};

const CRITERIA: &str = "You are choosing which product to feature in a lifestyle photograph.

Score every candidate from 0 to 10 on each criterion and pick the best overall:
- visual_potential: photographs well, has a clear physical form and reads at a glance
- brand_alignment: fits the brand's personality, values and identity
- audience_appeal: speaks to the people the brand is trying to reach
- social_shareability: would make an engaging, shareable social post

Prefer tangible products that can sit naturally in an everyday scene. If a brief is given, favor products that fit it.

";

const EXAMPLES: &str = "## Examples

Candidates: \"Insulated Camp Mug\" (Drinkware), \"Extended Warranty\" (Services), \"Trail Pack 30L\" (Bags)
Reply: {\"selected_product_name\": \"Trail Pack 30L\", \"reasoning\": \"A backpack reads instantly in an outdoor scene and carries the brand's adventurous identity.\", \"scores\": {\"visual_potential\": 9, \"brand_alignment\": 9, \"audience_appeal\": 8, \"social_shareability\": 8}}

Candidates: \"Linen Duvet Set\" (Bedding), \"Fabric Care Guide\" (Accessories)
Reply: {\"selected_product_name\": \"Linen Duvet Set\", \"reasoning\": \"Bedding anchors a slow-morning scene; a printed guide has little visual presence.\", \"scores\": {\"visual_potential\": 8, \"brand_alignment\": 9, \"audience_appeal\": 7, \"social_shareability\": 7}}

";

/// Renders the evaluation prompt for choosing one product out of `products`.
///
/// The reply is expected to be a single JSON object whose `selected_product_name`
/// repeats one of the listed names verbatim.
pub fn build_product_selection_prompt(
    products: &[ProductInfo],
    brand_research: Option<&BrandResearch>,
    brief: Option<&str>,
) -> String {
    let mut prompt = String::from(CRITERIA);

    if let Some(brand) = brand_research.and_then(|research| research.brand.as_ref()) {
        prompt.push_str("## Brand Context\n");
        prompt.push_str(&format!(
            "- Brand: {}\n",
            non_blank(brand.name.as_deref()).unwrap_or("N/A")
        ));
        prompt.push_str(&format!(
            "- Industry: {}\n",
            non_blank(brand.industry.as_deref()).unwrap_or("N/A")
        ));
        if let Some(values) = joined(&brand.values, usize::MAX) {
            prompt.push_str(&format!("- Core Values: {values}\n"));
        }
        if let Some(voice) = non_blank(brand.voice.as_deref()) {
            prompt.push_str(&format!("- Brand Voice: {voice}\n"));
        }
        if let Some(mission) = non_blank(brand.mission.as_deref()) {
            prompt.push_str(&format!("- Mission: {mission}\n"));
        }
        prompt.push('\n');
    }

    if let Some(brief) = non_blank(brief) {
        prompt.push_str(&format!("## Brief\n{brief}\n\n"));
    }

    prompt.push_str(EXAMPLES);

    prompt.push_str("## Candidates\n\n");
    for (index, product) in products.iter().enumerate() {
        let record = serde_json::json!({
            "name": product.name,
            "category": product.category,
            "description": product.description,
            "url": product.url,
        });
        prompt.push_str(&format!("{}. {record}\n", index + 1));
    }

    prompt.push_str(
        "\nReply with ONLY a JSON object of the form {\"selected_product_name\": string, \"reasoning\": string, \"scores\": {\"visual_potential\": number, \"brand_alignment\": number, \"audience_appeal\": number, \"social_shareability\": number}}. ",
    );
    prompt.push_str(
        "selected_product_name must be copied exactly from a candidate's \"name\" field, without the list number or category.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn product(name: &str) -> ProductInfo {
        ProductInfo {
            name: name.to_string(),
            category: "Gear".to_string(),
            description: format!("{name} description"),
            url: None,
        }
    }

    #[test]
    fn lists_every_candidate_as_a_record() {
        let prompt = build_product_selection_prompt(&[product("Mug"), product("Tote")], None, None);
        let first = prompt
            .lines()
            .find(|line| line.starts_with("1. {"))
            .unwrap_or_default();
        assert!(first.contains(r#""name":"Mug""#));
        assert!(first.contains(r#""description":"Mug description""#));
        assert!(prompt.lines().any(|line| line.starts_with("2. {") && line.contains(r#""name":"Tote""#)));
        assert!(prompt.contains("selected_product_name"));
        assert!(!prompt.contains("## Brand Context"));
        assert!(!prompt.contains("## Brief"));
    }

    #[test]
    fn includes_brand_context_and_brief() -> anyhow::Result<()> {
        let research: BrandResearch = serde_json::from_value(json!({
            "brand": {"name": "Acme", "values": ["craft", "care"], "voice": "dry"}
        }))?;
        let prompt = build_product_selection_prompt(&[product("Mug")], Some(&research), Some(" winter "));
        assert!(prompt.contains("- Brand: Acme\n"));
        assert!(prompt.contains("- Industry: N/A\n"));
        assert!(prompt.contains("- Core Values: craft, care\n"));
        assert!(prompt.contains("## Brief\nwinter\n"));
        Ok(())
    }
}
