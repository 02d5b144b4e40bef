use std::io::Cursor;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use brandframe_contracts::brand::{ImageGenerationRequest, ImageResult};
use brandframe_contracts::credentials::Credentials;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::GenerativeAi;
use crate::error::ProviderError;

const PROVIDER: &str = "dryrun";
const IMAGE_SIDE: u32 = 256;
const CANDIDATES_HEADING: &str = "## Candidates";

/// Offline generator: deterministic text and a solid-color PNG derived from the prompt.
///
/// Needs no credentials. Selection prompts get a well-formed JSON reply naming
/// one of the listed candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunGenerativeAi;

#[async_trait]
impl GenerativeAi for DryrunGenerativeAi {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate_text(
        &self,
        _credentials: &Credentials,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let candidates = candidate_names(prompt);
        if !candidates.is_empty() {
            let digest = digest(prompt, 0);
            let pick = &candidates[usize::from(digest[0]) % candidates.len()];
            return Ok(json!({
                "selected_product_name": pick,
                "reasoning": "Dryrun pick derived from the prompt hash.",
                "scores": {
                    "visual_potential": 5,
                    "brand_alignment": 5,
                    "audience_appeal": 5,
                    "social_shareability": 5
                }
            })
            .to_string());
        }
        Ok(format!(
            "Dryrun lifestyle scene {}: natural light, product in use, candid composition.",
            short_id(prompt)
        ))
    }

    async fn generate_image(
        &self,
        _credentials: &Credentials,
        request: &ImageGenerationRequest,
    ) -> Result<ImageResult, ProviderError> {
        let (r, g, b) = color_from_prompt(&request.prompt, request.reference_image_urls.len() as u64);
        let mut image = RgbImage::new(IMAGE_SIDE, IMAGE_SIDE);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageFormat::Png)
            .map_err(|err| ProviderError::invalid(PROVIDER, format!("png encode failed: {err}")))?;
        let mime_type = "image/png".to_string();
        Ok(ImageResult {
            data_url: format!("data:{mime_type};base64,{}", BASE64.encode(bytes.into_inner())),
            mime_type,
        })
    }
}

/// Names from the numbered JSON records under the candidates heading.
fn candidate_names(prompt: &str) -> Vec<String> {
    let Some((_, listing)) = prompt.split_once(CANDIDATES_HEADING) else {
        return Vec::new();
    };
    listing
        .lines()
        .filter_map(|line| {
            let (number, record) = line.trim().split_once(". ")?;
            number.parse::<usize>().ok()?;
            let record: Value = serde_json::from_str(record).ok()?;
            record.get("name")?.as_str().map(str::to_string)
        })
        .collect()
}

fn digest(prompt: &str, seed: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    hasher.finalize().into()
}

fn color_from_prompt(prompt: &str, seed: u64) -> (u8, u8, u8) {
    let digest = digest(prompt, seed);
    (digest[0], digest[1], digest[2])
}

fn short_id(prompt: &str) -> String {
    digest(prompt, 0)[..4]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
