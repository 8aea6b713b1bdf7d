//! Configuration structures for extraction and document conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FapiaoError;
use crate::invoice::rules::DEFAULT_COMPANY_SUFFIXES;

/// Environment variable that overrides the API key of the selected model profile.
pub const API_KEY_ENV: &str = "FAPIAO_API_KEY";

/// Main configuration for the fapiao pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FapiaoConfig {
    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Document conversion configuration.
    pub conversion: ConversionConfig,

    /// Model registry.
    pub models: ModelRegistry,
}

/// How fields are extracted from a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Regular expressions over the PDF text layer.
    #[default]
    Regex,
    /// Language model over the PDF text layer.
    Llm,
    /// Vision model over rendered pages, or text pages when rendering fails.
    Vlm,
}

impl ExtractionMode {
    /// Whether this mode calls a model service.
    pub fn uses_model(self) -> bool {
        !matches!(self, Self::Regex)
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Regex => "regex",
            Self::Llm => "llm",
            Self::Vlm => "vlm",
        })
    }
}

impl FromStr for ExtractionMode {
    type Err = FapiaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "regex" | "pattern" => Ok(Self::Regex),
            "llm" | "text" => Ok(Self::Llm),
            "vlm" | "vision" => Ok(Self::Vlm),
            other => Err(FapiaoError::Config(format!(
                "unknown extraction mode: {other} (expected regex, llm or vlm)"
            ))),
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Default extraction mode.
    pub mode: ExtractionMode,

    /// Legal-entity suffixes that terminate buyer/seller names.
    pub company_suffixes: Vec<String>,

    /// Characters of source text kept on each record.
    pub raw_text_preview_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Regex,
            company_suffixes: DEFAULT_COMPANY_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            raw_text_preview_chars: 500,
        }
    }
}

/// Document conversion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// DPI of the primary rasterizer.
    pub primary_dpi: u32,

    /// DPI of the secondary rasterizer.
    pub secondary_dpi: u32,

    /// Page cap for rendering and text fallback.
    pub max_pages: usize,

    /// Page cap of the secondary rasterizer, further limited by `max_pages`.
    pub secondary_max_pages: usize,

    /// Decoder allocation limit per rendered page, in bytes.
    pub max_image_bytes: u64,

    /// Primary rasterizer executable (MuPDF).
    pub primary_command: String,

    /// Secondary rasterizer executable (poppler).
    pub secondary_command: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            primary_dpi: 300,
            secondary_dpi: 200,
            max_pages: 3,
            secondary_max_pages: 3,
            max_image_bytes: 256 * 1024 * 1024,
            primary_command: "mutool".to_string(),
            secondary_command: "pdftoppm".to_string(),
        }
    }
}

impl ConversionConfig {
    /// Effective page cap of the secondary rasterizer.
    pub fn secondary_cap(&self) -> usize {
        self.secondary_max_pages.min(self.max_pages)
    }
}

/// Wire protocol spoken by a model service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelApi {
    /// Ollama `/api/generate`.
    #[default]
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions` (vLLM and others).
    OpenAi,
}

/// One entry of the model registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelProfile {
    /// Protocol of the service.
    pub api: ModelApi,

    /// Service base URL.
    pub base_url: String,

    /// Bearer token, if the service needs one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for text input.
    pub text_model: String,

    /// Model used for page images.
    pub vision_model: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            api: ModelApi::Ollama,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            text_model: "qwen2.5:7b".to_string(),
            vision_model: "qwen2.5vl:7b".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ModelProfile {
    fn vllm() -> Self {
        Self {
            api: ModelApi::OpenAi,
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            text_model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            vision_model: "Qwen/Qwen2.5-VL-7B-Instruct".to_string(),
            timeout_secs: 60,
        }
    }

    /// Model name for the given input kind.
    pub fn model_for(&self, vision: bool) -> &str {
        if vision {
            &self.vision_model
        } else {
            &self.text_model
        }
    }
}

/// Named model profiles plus the one used by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRegistry {
    /// Name of the default profile.
    pub active: String,

    /// Profiles by name.
    pub profiles: BTreeMap<String, ModelProfile>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert("ollama".to_string(), ModelProfile::default());
        profiles.insert("vllm".to_string(), ModelProfile::vllm());
        Self {
            active: "ollama".to_string(),
            profiles,
        }
    }
}

impl ModelRegistry {
    /// Look up a profile by name, or the active one.
    pub fn profile(&self, name: Option<&str>) -> Result<&ModelProfile, FapiaoError> {
        let name = name.unwrap_or(&self.active);
        self.profiles.get(name).ok_or_else(|| {
            let known = self.profiles.keys().cloned().collect::<Vec<_>>().join(", ");
            FapiaoError::Config(format!("unknown model profile: {name} (known: {known})"))
        })
    }

    /// Resolve a profile and apply the [`API_KEY_ENV`] override.
    pub fn resolve(&self, name: Option<&str>) -> Result<ModelProfile, FapiaoError> {
        let mut profile = self.profile(name)?.clone();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                profile.api_key = Some(key);
            }
        }
        Ok(profile)
    }
}

impl FapiaoConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = FapiaoConfig::default();
        assert_eq!(config.extraction.mode, ExtractionMode::Regex);
        assert_eq!(config.extraction.raw_text_preview_chars, 500);
        assert_eq!(config.conversion.primary_dpi, 300);
        assert_eq!(config.conversion.secondary_dpi, 200);
        assert_eq!(config.conversion.secondary_cap(), 3);
        assert_eq!(config.models.active, "ollama");
    }

    #[test]
    fn test_secondary_cap_follows_max_pages() {
        let conversion = ConversionConfig {
            max_pages: 1,
            ..ConversionConfig::default()
        };
        assert_eq!(conversion.secondary_cap(), 1);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: FapiaoConfig =
            serde_json::from_str(r#"{"extraction": {"mode": "vlm"}, "conversion": {"max_pages": 5}}"#)
                .unwrap();
        assert_eq!(config.extraction.mode, ExtractionMode::Vlm);
        assert_eq!(config.extraction.company_suffixes.len(), 7);
        assert_eq!(config.conversion.max_pages, 5);
        assert_eq!(config.conversion.primary_command, "mutool");
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("VLM".parse::<ExtractionMode>().unwrap(), ExtractionMode::Vlm);
        assert_eq!("regex".parse::<ExtractionMode>().unwrap(), ExtractionMode::Regex);
        assert!("ocr".parse::<ExtractionMode>().is_err());
        assert!(ExtractionMode::Llm.uses_model());
        assert!(!ExtractionMode::Regex.uses_model());
    }

    #[test]
    fn test_profile_lookup() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.profile(None).unwrap().api, ModelApi::Ollama);
        assert_eq!(registry.profile(Some("vllm")).unwrap().api, ModelApi::OpenAi);
        assert!(registry.profile(Some("missing")).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = FapiaoConfig::default();
        config.extraction.mode = ExtractionMode::Llm;
        config.save(&path).unwrap();
        assert_eq!(FapiaoConfig::from_file(&path).unwrap(), config);
    }
}
