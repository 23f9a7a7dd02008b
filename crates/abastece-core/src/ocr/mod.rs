//! OCR of page regions.
//!
//! The engine itself is an external collaborator behind [`OcrEngine`].
//! [`OcrReader`] adds the low-yield retry: when a region reads too little
//! text, it is enhanced and read again, and the longer reading is kept.

mod preprocessing;
#[cfg(feature = "native")]
mod tesseract;

pub use preprocessing::ImagePreprocessor;
#[cfg(feature = "native")]
pub use tesseract::TesseractEngine;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::OcrError;
use crate::models::config::OcrConfig;

/// Recognizes the text of one image.
pub trait OcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Text read from one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionText {
    pub text: String,
    /// Whether the enhanced reading was kept.
    pub enhanced: bool,
}

/// Reads regions with an engine, retrying low-yield ones on an enhanced image.
#[derive(Debug, Clone)]
pub struct OcrReader {
    preprocessor: ImagePreprocessor,
    min_text_length: usize,
    always_preprocess: bool,
}

impl OcrReader {
    pub fn new() -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(),
            min_text_length: 50,
            always_preprocess: false,
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new().with_mode(config.preprocess_mode),
            min_text_length: config.min_text_length,
            always_preprocess: config.always_preprocess,
        }
    }

    pub fn with_min_text_length(mut self, length: usize) -> Self {
        self.min_text_length = length;
        self
    }

    pub fn with_always_preprocess(mut self, always: bool) -> Self {
        self.always_preprocess = always;
        self
    }

    /// Read one region.
    ///
    /// A failure of the first pass is returned. A failure of the enhanced
    /// pass keeps the first reading.
    pub fn read(&self, engine: &dyn OcrEngine, image: &DynamicImage) -> Result<RegionText, OcrError> {
        let first = engine.recognize(image)?;
        let first_len = first.trim().chars().count();

        if !self.always_preprocess && first_len >= self.min_text_length {
            return Ok(RegionText {
                text: first,
                enhanced: false,
            });
        }

        debug!(
            "Read {} chars (minimum {}), enhancing region",
            first_len, self.min_text_length
        );

        let enhanced = self.preprocessor.enhance(image);
        match engine.recognize(&enhanced) {
            Ok(second) if second.trim().chars().count() > first_len => Ok(RegionText {
                text: second,
                enhanced: true,
            }),
            Ok(_) => Ok(RegionText {
                text: first,
                enhanced: false,
            }),
            Err(e) => {
                warn!("Enhanced OCR pass failed: {}", e);
                Ok(RegionText {
                    text: first,
                    enhanced: false,
                })
            }
        }
    }
}

impl Default for OcrReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use std::cell::RefCell;

    /// Returns scripted readings, one per call, and records image sizes.
    struct ScriptedEngine {
        readings: RefCell<Vec<Result<String, OcrError>>>,
        sizes: RefCell<Vec<(u32, u32)>>,
    }

    impl ScriptedEngine {
        fn new(readings: Vec<Result<String, OcrError>>) -> Self {
            Self {
                readings: RefCell::new(readings.into_iter().rev().collect()),
                sizes: RefCell::new(Vec::new()),
            }
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            self.sizes.borrow_mut().push(image.dimensions());
            self.readings
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn long_text() -> String {
        "VALOR TOTAL R$ 134,58 PLACA FEI6365 KM 120345 MOTORISTA".to_string()
    }

    #[test]
    fn test_enough_text_skips_enhancement() {
        let engine = ScriptedEngine::new(vec![Ok(long_text())]);
        let result = OcrReader::new().read(&engine, &DynamicImage::new_rgb8(10, 10)).unwrap();

        assert!(!result.enhanced);
        assert_eq!(engine.sizes.borrow().len(), 1);
    }

    #[test]
    fn test_low_yield_is_retried_on_enhanced_image() {
        let engine = ScriptedEngine::new(vec![Ok("PLACA".to_string()), Ok(long_text())]);
        let result = OcrReader::new().read(&engine, &DynamicImage::new_rgb8(10, 10)).unwrap();

        assert!(result.enhanced);
        assert_eq!(result.text, long_text());
        let sizes = engine.sizes.borrow();
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[1], (1500, 1500));
    }

    #[test]
    fn test_shorter_enhanced_reading_is_discarded() {
        let engine = ScriptedEngine::new(vec![Ok("PLACA FEI6365".to_string()), Ok("P".to_string())]);
        let result = OcrReader::new().read(&engine, &DynamicImage::new_rgb8(10, 10)).unwrap();

        assert!(!result.enhanced);
        assert_eq!(result.text, "PLACA FEI6365");
    }

    #[test]
    fn test_enhanced_failure_keeps_first_reading() {
        let engine = ScriptedEngine::new(vec![
            Ok("KM".to_string()),
            Err(OcrError::Preprocessing("boom".to_string())),
        ]);
        let result = OcrReader::new().read(&engine, &DynamicImage::new_rgb8(10, 10)).unwrap();
        assert_eq!(result.text, "KM");
    }

    #[test]
    fn test_first_failure_is_returned() {
        let engine = ScriptedEngine::new(vec![Err(OcrError::InvalidImage("empty".to_string()))]);
        assert!(OcrReader::new().read(&engine, &DynamicImage::new_rgb8(10, 10)).is_err());
    }

    #[test]
    fn test_always_preprocess() {
        let engine = ScriptedEngine::new(vec![Ok(long_text()), Ok(long_text())]);
        let reader = OcrReader::new().with_always_preprocess(true);
        reader.read(&engine, &DynamicImage::new_rgb8(10, 10)).unwrap();
        assert_eq!(engine.sizes.borrow().len(), 2);
    }
}
