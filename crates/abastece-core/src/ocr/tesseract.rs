//! Tesseract command-line engine.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

use super::OcrEngine;
use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Runs `tesseract <image> stdout --psm <mode> -l <lang>`.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    engine_path: PathBuf,
    language: String,
    fallback_language: Option<String>,
    page_segmentation_mode: u8,
}

impl TesseractEngine {
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            language: "por".to_string(),
            fallback_language: Some("eng".to_string()),
            page_segmentation_mode: 6,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        let fallback = config.fallback_language.trim();
        Self {
            engine_path: config.engine_path.clone(),
            language: config.language.clone(),
            fallback_language: (!fallback.is_empty() && fallback != config.language)
                .then(|| fallback.to_string()),
            page_segmentation_mode: config.page_segmentation_mode,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_fallback_language(mut self, language: Option<String>) -> Self {
        self.fallback_language = language;
        self
    }

    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }

    /// Arguments passed after the input path.
    fn arguments(&self, language: &str) -> Vec<String> {
        vec![
            "stdout".to_string(),
            "--psm".to_string(),
            self.page_segmentation_mode.to_string(),
            "-l".to_string(),
            language.to_string(),
        ]
    }

    fn run(&self, input: &Path, language: &str) -> Result<String, OcrError> {
        let output = Command::new(&self.engine_path)
            .arg(input)
            .args(self.arguments(language))
            .output()
            .map_err(|e| OcrError::EngineUnavailable {
                path: self.engine_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition {
                language: language.to_string(),
                reason: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let dir = tempfile::TempDir::with_prefix("abastece-ocr")
            .map_err(|e| OcrError::Preprocessing(e.to_string()))?;
        let input = dir.path().join("region.png");
        image
            .save_with_format(&input, ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        match self.run(&input, &self.language) {
            Ok(text) => {
                debug!("tesseract ({}) read {} chars", self.language, text.trim().len());
                Ok(text)
            }
            Err(OcrError::Recognition { reason, .. }) if self.fallback_language.is_some() => {
                let fallback = self.fallback_language.as_deref().unwrap_or_default();
                warn!(
                    "tesseract failed with '{}' ({}), retrying with '{}'",
                    self.language, reason, fallback
                );
                self.run(&input, fallback)
            }
            Err(e) => Err(e),
        }
    }
}
