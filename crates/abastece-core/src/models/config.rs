//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::segment::{RegionSpec, SegmentStrategy};

/// Main configuration for the abastece pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbasteceConfig {
    /// OCR engine configuration.
    pub ocr: OcrConfig,

    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Page segmentation configuration.
    pub segmentation: SegmentationConfig,

    /// Vision model configuration.
    pub vision: VisionConfig,

    /// Manual review configuration.
    pub review: ReviewConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Path or command name of the tesseract binary.
    pub engine_path: PathBuf,

    /// Primary language hint.
    pub language: String,

    /// Language used when the primary one is unavailable.
    pub fallback_language: String,

    /// Tesseract page segmentation mode.
    pub page_segmentation_mode: u8,

    /// Below this many characters a region is enhanced and recognized again.
    pub min_text_length: usize,

    /// Always run the enhanced second pass.
    pub always_preprocess: bool,

    /// Enhancement applied on the second pass.
    pub preprocess_mode: PreprocessMode,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("tesseract"),
            language: "por".to_string(),
            fallback_language: "eng".to_string(),
            page_segmentation_mode: 6,
            min_text_length: 50,
            always_preprocess: false,
            preprocess_mode: PreprocessMode::Otsu,
        }
    }
}

/// Binarization used before a second OCR pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMode {
    /// Gaussian blur then global Otsu threshold.
    Otsu,
    /// Local mean threshold.
    Adaptive,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages to process per document (0 = unlimited).
    pub max_pages: usize,

    /// Output pixels per PDF point when rendering a page (0 = embedded size).
    pub render_scale: f32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            max_pages: 0,
            render_scale: 2.0,
        }
    }
}

/// Page segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Strategy used to cut each page into regions.
    pub strategy: SegmentStrategy,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            strategy: SegmentStrategy::Fixed {
                regions: RegionSpec::receipt_layout(),
            },
        }
    }
}

/// Vision model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Chat-completions endpoint.
    pub base_url: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Models tried in order until one answers with a JSON object.
    pub models: Vec<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Completion token limit.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f32,

    /// Send all regions of a page in a single request.
    pub batch_regions: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            models: vec![
                "meta-llama/llama-3.2-90b-vision-instruct".to_string(),
                "mistralai/mistral-small-3.2-24b-instruct:free".to_string(),
            ],
            timeout_secs: 90,
            max_tokens: 1500,
            temperature: 0.1,
            batch_regions: false,
        }
    }
}

/// Manual review configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Records whose confidence is below this value are flagged.
    pub confidence_threshold: f64,

    /// Allowed gap between `quantity * unit_price` and the total.
    pub total_tolerance: String,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            total_tolerance: "0.05".to_string(),
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV file written by the batch command.
    pub csv_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("dados_extraidos.csv"),
        }
    }
}

impl AbasteceConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{ "ocr": { "engine_path": "/opt/tesseract/bin/tesseract" } }"#;
        let config: AbasteceConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.ocr.engine_path,
            PathBuf::from("/opt/tesseract/bin/tesseract")
        );
        assert_eq!(config.ocr.language, "por");
        assert_eq!(config.review.confidence_threshold, 0.8);
        assert_eq!(config.vision.timeout_secs, 90);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("abastece-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let mut config = AbasteceConfig::default();
        config.vision.models = vec!["only/model".to_string()];
        config.save(&path).unwrap();

        let loaded = AbasteceConfig::from_file(&path).unwrap();
        assert_eq!(loaded.vision.models, vec!["only/model".to_string()]);
        assert!(matches!(
            loaded.segmentation.strategy,
            SegmentStrategy::Fixed { ref regions } if regions.len() == 4
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
