use super::{joined, non_blank, ProductEmphasis, PromptContext};
use crate::brand::{AudienceInsights, BrandResearch, InsightCitations, Persona, ProductDetails, ProductList};

const MAX_PERSONAS: usize = 3;
const MAX_MOTIVATIONS: usize = 4;
const MAX_TRIGGERS: usize = 4;
const MAX_BARRIERS: usize = 3;
const MAX_TRAITS: usize = 3;
const MAX_TONE_DESCRIPTORS: usize = 3;
const MAX_KEY_PHRASES: usize = 3;
const MAX_FEATURES: usize = 5;
const MAX_CATALOG_ITEMS: usize = 8;
const MAX_CITATIONS: usize = 3;
const CITATION_EXCERPT_CHARS: usize = 150;

const SECONDARY_APPROACH: &str = "<approach>
Lead with the moment, not the merchandise. Order of importance: scene and mood, then the people and what they are doing, then setting and light, and only then the product.

Aim for documentary lifestyle photography:
- One person or a small group, whichever suits the moment
- Caught mid-action with real emotion, never posing for the camera
- Lived-in spaces with everyday clutter and imperfections
- Natural light that casts real shadows, no flat studio lighting
- Off-center framing, elements allowed to run out of frame
- The product stays small (roughly 10-25% of the frame) in the background or mid-ground

The result should read like an editorial about real life, not a catalog shoot.
</approach>
";

const FOCAL_POINT_APPROACH: &str = "<approach>
The product is the subject. Build the scene around it: it must be clearly visible, sharply rendered and the first thing the eye lands on.

Keep the photograph candid rather than staged:
- People interact with the product naturally, mid-action, never posing for the camera
- A real, lived-in setting that explains why the product is there
- Natural light with real shadows, no flat studio lighting
- The product occupies a prominent share of the frame near a rule-of-thirds point

The result should read like an editorial about someone using the product, not a white-background packshot.
</approach>
";

const TECHNICAL: &str = "<technical>
Square 1:1 frame, rule-of-thirds composition. Avoid recognizable faces, copyrighted characters or logos, rendered text, and centered symmetrical staging.
</technical>
";

const SECONDARY_REFERENCE: &str = "<reference_image>Reproduce the exact product shown in the reference image. Keep it small and off to the side in the background or mid-ground, used casually or resting nearby. Stay faithful to its shape and colors, but the scene must still work if the viewer never notices it.</reference_image>";

const FOCAL_POINT_REFERENCE: &str = "<reference_image>Reproduce the exact product shown in the reference image as the focal point of the frame. Stay faithful to its shape, materials and colors.</reference_image>";

/// Renders the instruction that asks the text model for a final image description.
///
/// Sections for absent or empty stage results are omitted entirely. The output
/// depends only on `context` and `emphasis`.
pub fn build_image_generation_prompt(context: &PromptContext, emphasis: ProductEmphasis) -> String {
    let mut prompt = String::from(
        "Write a detailed visual description for a lifestyle photograph: a candid moment in which the brand's product is naturally present.\n\n",
    );
    prompt.push_str(match emphasis {
        ProductEmphasis::Secondary => SECONDARY_APPROACH,
        ProductEmphasis::FocalPoint => FOCAL_POINT_APPROACH,
    });
    prompt.push('\n');
    prompt.push_str(TECHNICAL);

    match non_blank(Some(context.brand_url.as_str())) {
        Some(url) => prompt.push_str(&format!("\nBrand URL: {url}\n")),
        None => prompt.push_str(
            "\nNo brand URL was given. Work from the additional instructions and whatever context follows.\n",
        ),
    }
    if let Some(instructions) = non_blank(context.additional_instructions.as_deref()) {
        prompt.push_str(&format!("\nAdditional Instructions: {instructions}\n"));
    }

    if let Some(insights) = context.audience_insights.as_ref() {
        push_audience(&mut prompt, insights);
    }
    if let Some(research) = context.brand_research.as_ref() {
        push_brand(&mut prompt, research);
    }
    if let Some(details) = context.product_details.as_ref() {
        push_product(&mut prompt, details, emphasis);
    }
    if let Some(list) = context.products.as_ref() {
        push_catalog(&mut prompt, list);
    }
    if let Some(citations) = context.audience_insights_citations.as_ref() {
        push_citations(&mut prompt, citations);
    }

    prompt.push_str("\n<output>\n");
    prompt.push_str(match emphasis {
        ProductEmphasis::Secondary => {
            "Describe the picture in prose. Open with the scene, the person and the action, move on to the environment and lighting, and finish with where the product sits.\n\n"
        }
        ProductEmphasis::FocalPoint => {
            "Describe the picture in prose. Open with the product and how it is being used, then the person and the action, then the environment and lighting.\n\n"
        }
    });
    prompt.push_str(
        "Solo example: \"A ceramicist trims a bowl on a spinning wheel, sleeves pushed up and clay streaked across one wrist. Low window light rakes across the studio shelves. A water bottle leans against the stool, half in shadow.\"\n\n",
    );
    prompt.push_str(
        "Group example: \"Three friends crowd around a picnic blanket at dusk, one mid-laugh while another reaches for the last peach. Warm backlight haloes their hair. A speaker sits in the grass at the blanket's corner.\"\n\n",
    );
    prompt.push_str(
        "Be concrete about light, framing and mood. Keep the candid, imperfect quality, and pick solo or group depending on what feels true to the brand.\n</output>\n",
    );
    prompt
}

fn push_audience(prompt: &mut String, insights: &AudienceInsights) {
    prompt.push_str("\n<audience>\n");
    if let Some(summary) = non_blank(insights.rollup_summary.as_deref()) {
        prompt.push_str(&format!("<summary>{summary}</summary>\n"));
    }
    if !insights.personas.is_empty() {
        prompt.push_str("\n<personas>\n");
        for persona in insights.personas.iter().take(MAX_PERSONAS) {
            push_persona(prompt, persona);
        }
        prompt.push_str("</personas>\n\n");
        prompt.push_str(
            "<synthesis_task>Turn psychology into visuals: choose settings from motivations, mood from triggers, styling from traits.</synthesis_task>\n",
        );
    }
    prompt.push_str("</audience>\n");
}

fn push_persona(prompt: &mut String, persona: &Persona) {
    prompt.push_str("<persona>\n");
    prompt.push_str(&format!("<label>{}</label>\n", persona.label.trim()));
    prompt.push_str(&format!("<description>{}</description>\n", persona.description.trim()));

    if let Some(psychology) = persona.psychology.as_ref() {
        prompt.push_str("<psychology>\n");
        if let Some(motivations) = joined(&psychology.motivations, MAX_MOTIVATIONS) {
            prompt.push_str(&format!("<motivations>{motivations}</motivations>\n"));
        }
        if let Some(triggers) = joined(&psychology.triggers, MAX_TRIGGERS) {
            prompt.push_str(&format!("<triggers>{triggers}</triggers>\n"));
        }
        if let Some(barriers) = joined(&psychology.barriers, MAX_BARRIERS) {
            prompt.push_str(&format!("<barriers>{barriers}</barriers>\n"));
        }
        prompt.push_str("</psychology>\n");
    }

    let traits: Vec<String> = persona
        .personality_traits
        .iter()
        .map(|entry| entry.name.clone())
        .collect();
    if let Some(traits) = joined(&traits, MAX_TRAITS) {
        prompt.push_str(&format!("<traits>{traits}</traits>\n"));
    }
    if let Some(tone) = persona
        .language_patterns
        .as_ref()
        .and_then(|patterns| joined(&patterns.tone_descriptors, MAX_TONE_DESCRIPTORS))
    {
        prompt.push_str(&format!("<tone>{tone}</tone>\n"));
    }
    prompt.push_str("</persona>\n");
}

fn push_brand(prompt: &mut String, research: &BrandResearch) {
    prompt.push_str("\n<brand>\n");
    if let Some(brand) = research.brand.as_ref() {
        let language = brand
            .identity
            .as_ref()
            .and_then(|identity| identity.language.as_ref());
        let fields = [
            ("name", non_blank(brand.name.as_deref())),
            ("industry", non_blank(brand.industry.as_deref())),
            ("mission", non_blank(brand.mission.as_deref())),
            ("tagline", non_blank(brand.tagline.as_deref())),
        ];
        for (tag, value) in fields {
            if let Some(value) = value {
                prompt.push_str(&format!("<{tag}>{value}</{tag}>\n"));
            }
        }
        if let Some(values) = joined(&brand.values, usize::MAX) {
            prompt.push_str(&format!("<values>{values}</values>\n"));
        }
        if let Some(voice) = non_blank(brand.voice.as_deref()) {
            prompt.push_str(&format!("<voice>{voice}</voice>\n"));
        }
        if let Some(tone) = language.and_then(|language| non_blank(language.tone.as_deref())) {
            prompt.push_str(&format!("<tone>{tone}</tone>\n"));
        }
        if let Some(phrases) = language.and_then(|language| joined(&language.key_phrases, MAX_KEY_PHRASES)) {
            prompt.push_str(&format!("<key_themes>{phrases}</key_themes>\n"));
        }
        if let Some(audience) =
            non_blank(brand.target_audience.as_deref()).or_else(|| research.audience_description())
        {
            prompt.push_str(&format!("<target_audience>{}</target_audience>\n", audience.trim()));
        }
    }
    prompt.push_str("</brand>\n");
}

fn push_product(prompt: &mut String, details: &ProductDetails, emphasis: ProductEmphasis) {
    prompt.push_str("\n<product>\n");
    prompt.push_str(&format!("<name>{}</name>\n", details.name.trim()));
    prompt.push_str(&format!("<description>{}</description>\n", details.description.trim()));
    if let Some(features) = joined(&details.features, MAX_FEATURES) {
        prompt.push_str(&format!("<features>{features}</features>\n"));
    }
    if let Some(price) = details.display_price() {
        prompt.push_str(&format!("<price>{price}</price>\n"));
    }
    if details.first_image().is_some() {
        prompt.push('\n');
        prompt.push_str(match emphasis {
            ProductEmphasis::Secondary => SECONDARY_REFERENCE,
            ProductEmphasis::FocalPoint => FOCAL_POINT_REFERENCE,
        });
        prompt.push('\n');
    }
    prompt.push_str("</product>\n");
}

fn push_catalog(prompt: &mut String, list: &ProductList) {
    if list.products.is_empty() {
        return;
    }
    prompt.push_str("\n<brand_catalog>\n");
    for product in list.products.iter().take(MAX_CATALOG_ITEMS) {
        prompt.push_str(&format!(
            "<item>{} ({})</item>\n",
            product.name.trim(),
            product.category.trim()
        ));
    }
    prompt.push_str("</brand_catalog>\n");
}

fn push_citations(prompt: &mut String, citations: &InsightCitations) {
    if citations.citations.is_empty() {
        return;
    }
    prompt.push_str("\n<citations>\nReal audience conversations. Mine them for authentic settings and situations:\n");
    for citation in citations.citations.iter().take(MAX_CITATIONS) {
        prompt.push_str(&format!(
            "\"{}\" ({})\n",
            excerpt(&citation.text, CITATION_EXCERPT_CHARS),
            citation.source.trim()
        ));
    }
    prompt.push_str("</citations>\n");
}

fn excerpt(text: &str, limit: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
