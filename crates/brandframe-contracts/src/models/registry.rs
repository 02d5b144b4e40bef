use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Image,
    /// Accepts reference images alongside the text prompt.
    Reference,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Reference => "reference",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        self.get(name)
            .filter(|model| model.supports(capability))
            .cloned()
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::*;

    let mut map = IndexMap::new();
    let mut insert =
        |name: &str, provider: &str, capabilities: &[Capability], context_window: Option<u64>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities.to_vec(),
                    context_window,
                },
            );
        };

    insert("gemini-3-flash-preview", "gemini", &[Text], Some(1_048_576));
    insert("gemini-3-pro-preview", "gemini", &[Text], Some(1_048_576));
    insert("gemini-2.5-flash", "gemini", &[Text], Some(1_048_576));
    insert("gemini-3-pro-image-preview", "gemini", &[Image, Reference], None);
    insert("gemini-2.5-flash-image", "gemini", &[Image, Reference], None);
    insert("dryrun-text-1", "dryrun", &[Text], Some(8192));
    insert("dryrun-image-1", "dryrun", &[Image, Reference], None);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_orders_gemini_first() {
        let registry = ModelRegistry::default();
        let text = registry.by_capability(Capability::Text);
        assert_eq!(text[0].name, "gemini-3-flash-preview");
        let image = registry.by_capability(Capability::Image);
        assert_eq!(image[0].name, "gemini-3-pro-image-preview");
        assert!(image.iter().all(|model| model.supports(Capability::Reference)));
    }

    #[test]
    fn ensure_checks_capability() {
        let registry = ModelRegistry::default();
        assert!(registry.ensure("dryrun-image-1", Capability::Image).is_some());
        assert!(registry.ensure("dryrun-image-1", Capability::Text).is_none());
        assert!(registry.ensure("unknown", Capability::Text).is_none());
    }
}
