//! Core library for fuel-receipt extraction.
//!
//! This crate provides:
//! - Page sources for scanned PDFs and image files
//! - Region segmentation of receipt pages
//! - Regex field rules over OCR text and a vision-model extraction path
//! - Brazilian number normalization and first-writer-wins record merging
//! - Confidence-based review flags and CSV-ready records

pub mod error;
pub mod extract;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod review;
pub mod segment;
pub mod vision;

pub use error::{AbasteceError, Result};
pub use extract::{FieldExtractor, PatternTable, RegexExtractor};
pub use merge::{MergeOutcome, MergeSummary, RecordMerger};
pub use models::config::AbasteceConfig;
pub use models::record::{csv_header, Checklist, ExtractedRecord, Field, FieldCandidates, RawValue};
pub use normalize::{normalize, normalize_field};
pub use ocr::{OcrEngine, OcrReader};
pub use pdf::{PageSource, PdfExtractor};
pub use pipeline::{DocumentOutcome, ExtractionMode, ReceiptPipeline};
pub use review::{ReviewPolicy, ReviewVerdict};
pub use segment::{Region, RegionImage, SegmentStrategy};
pub use vision::{ModelChain, VisionClient, VisionRequest};

#[cfg(feature = "native")]
pub use ocr::TesseractEngine;
#[cfg(feature = "native")]
pub use vision::OpenRouterClient;
