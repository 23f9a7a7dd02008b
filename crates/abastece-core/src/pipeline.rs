//! Document pipeline: render, segment, extract, merge and review.
//!
//! Documents are processed one at a time. Every document yields exactly one
//! [`DocumentOutcome`]; a document that cannot be opened or rendered gets an
//! empty placeholder record carrying the error instead of aborting the run.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AbasteceError, Result, VisionError};
use crate::extract::RegexExtractor;
use crate::merge::RecordMerger;
use crate::models::config::AbasteceConfig;
use crate::models::record::{ExtractedRecord, FieldCandidates};
use crate::ocr::{OcrEngine, OcrReader};
use crate::pdf;
use crate::review::{ReviewPolicy, ReviewVerdict};
use crate::segment::{RegionImage, SegmentStrategy};
use crate::vision::{ModelChain, VisionClient, VisionImage, VisionRequest};

/// Which extraction paths run on each region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// OCR text through the regex rules.
    Ocr,
    /// Hosted vision model.
    #[default]
    Vision,
    /// OCR first, then the vision model fills what is still missing.
    Hybrid,
}

impl ExtractionMode {
    pub fn uses_ocr(&self) -> bool {
        matches!(self, ExtractionMode::Ocr | ExtractionMode::Hybrid)
    }

    pub fn uses_vision(&self) -> bool {
        matches!(self, ExtractionMode::Vision | ExtractionMode::Hybrid)
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionMode::Ocr => "ocr",
            ExtractionMode::Vision => "vision",
            ExtractionMode::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

impl FromStr for ExtractionMode {
    type Err = AbasteceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocr" => Ok(ExtractionMode::Ocr),
            "vision" => Ok(ExtractionMode::Vision),
            "hybrid" => Ok(ExtractionMode::Hybrid),
            other => Err(AbasteceError::Config(format!("unknown extraction mode '{other}'"))),
        }
    }
}

/// Result of processing one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub record: ExtractedRecord,
    pub review: ReviewVerdict,
    /// Regions examined across all pages.
    pub regions: usize,
    /// Why the document could not be read, for placeholder records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Receipt extraction pipeline.
pub struct ReceiptPipeline {
    mode: ExtractionMode,
    strategy: SegmentStrategy,
    max_pages: usize,
    render_scale: f32,
    batch_regions: bool,
    reader: OcrReader,
    extractor: RegexExtractor<'static>,
    ocr: Option<Box<dyn OcrEngine>>,
    vision: Option<Box<dyn VisionClient>>,
    chain: ModelChain,
    policy: ReviewPolicy,
}

impl ReceiptPipeline {
    /// Build a pipeline from configuration. Engines are attached separately.
    pub fn new(config: &AbasteceConfig) -> Result<Self> {
        Ok(Self {
            mode: ExtractionMode::default(),
            strategy: config.segmentation.strategy.clone(),
            max_pages: config.pdf.max_pages,
            render_scale: config.pdf.render_scale,
            batch_regions: config.vision.batch_regions,
            reader: OcrReader::from_config(&config.ocr),
            extractor: RegexExtractor::receipt(),
            ocr: None,
            vision: None,
            chain: ModelChain::from_config(&config.vision),
            policy: ReviewPolicy::from_config(&config.review)?,
        })
    }

    pub fn with_mode(mut self, mode: ExtractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strategy(mut self, strategy: SegmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_ocr_engine(mut self, engine: Box<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    pub fn with_vision_client(mut self, client: Box<dyn VisionClient>) -> Self {
        self.vision = Some(client);
        self
    }

    pub fn with_chain(mut self, chain: ModelChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Check that every collaborator the mode needs is attached.
    pub fn ensure_ready(&self) -> Result<()> {
        if self.mode.uses_ocr() && self.ocr.is_none() {
            return Err(AbasteceError::Config(format!(
                "mode '{}' needs an OCR engine",
                self.mode
            )));
        }
        if self.mode.uses_vision() {
            if self.vision.is_none() {
                return Err(AbasteceError::Config(format!(
                    "mode '{}' needs a vision client",
                    self.mode
                )));
            }
            if self.chain.models().is_empty() {
                return Err(VisionError::NoModels.into());
            }
        }
        Ok(())
    }

    /// Process one document file.
    pub fn process_file(&self, path: &Path) -> DocumentOutcome {
        let start = Instant::now();
        let name = display_name(path);
        info!("Processing {} ({} mode)", name, self.mode);

        let source = match pdf::open(path, self.render_scale) {
            Ok(source) => source,
            Err(e) => {
                let message = format!("Não foi possível abrir '{name}': {e}");
                warn!("{}", message);
                return self.placeholder(name, message, start);
            }
        };

        let page_count = match self.max_pages {
            0 => source.page_count(),
            limit => source.page_count().min(limit as u32),
        };

        let mut merger = RecordMerger::new(&name);
        let mut regions = 0;
        let mut rendered = 0;
        let mut render_error = None;

        for page in 1..=page_count {
            let image = match source.render_page(page) {
                Ok(image) => image,
                Err(e) => {
                    let message = format!("Página {page} de '{name}' não renderizada: {e}");
                    warn!("{}", message);
                    render_error.get_or_insert_with(|| message.clone());
                    merger.warn(message);
                    continue;
                }
            };
            rendered += 1;
            regions += self.process_page(&image, page, &mut merger);
        }

        if rendered == 0 {
            let message = render_error
                .unwrap_or_else(|| format!("'{name}' não tem páginas para processar"));
            return self.placeholder(name, message, start);
        }

        for note in self.policy.advisories(merger.record()) {
            warn!("{}: {}", name, note);
            merger.warn(note);
        }

        let record = merger.finish();
        let review = self.policy.assess(&record);
        let checklist = record.checklist();
        info!("{}: {} fields found", name, checklist.summary());

        DocumentOutcome {
            record,
            review,
            regions,
            error: None,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Run the regex path over already recognized text.
    pub fn process_text(&self, name: &str, text: &str) -> DocumentOutcome {
        let start = Instant::now();
        let mut merger = RecordMerger::new(name);
        merger.merge(&self.extractor.extract(text));

        for note in self.policy.advisories(merger.record()) {
            merger.warn(note);
        }

        let record = merger.finish();
        let review = self.policy.assess(&record);
        DocumentOutcome {
            record,
            review,
            regions: 1,
            error: None,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Extract every region of one page into the merger; returns the region count.
    fn process_page(&self, image: &DynamicImage, page: u32, merger: &mut RecordMerger) -> usize {
        let parts = self.strategy.segment(image);
        debug!(
            "Page {} ({}x{}) cut into {} regions",
            page,
            image.width(),
            image.height(),
            parts.len()
        );

        for part in parts.iter().filter(|part| part.image.is_none()) {
            debug!("Region '{}' is empty on page {}", part.region.label, page);
            merger.warn(format!("Região '{}' sem dados", part.region.label));
        }

        if self.mode.uses_ocr() {
            if let Some(engine) = &self.ocr {
                for part in &parts {
                    self.read_region(engine.as_ref(), part, merger);
                }
            }
        }

        if self.mode.uses_vision() {
            if let Some(client) = &self.vision {
                if self.batch_regions {
                    self.ask_batched(client.as_ref(), &parts, merger);
                } else {
                    for part in &parts {
                        self.ask_region(client.as_ref(), part, merger);
                    }
                }
            }
        }

        parts.len()
    }

    fn read_region(&self, engine: &dyn OcrEngine, part: &RegionImage, merger: &mut RecordMerger) {
        let Some(image) = &part.image else {
            return;
        };
        let label = &part.region.label;

        match self.reader.read(engine, image) {
            Ok(text) => {
                let summary = merger.merge(&self.extractor.extract(&text.text));
                debug!(
                    "OCR region '{}': {} accepted, {} duplicate, {} skipped",
                    label, summary.accepted, summary.duplicates, summary.skipped
                );
            }
            Err(e) => {
                warn!("OCR failed for region '{}': {}", label, e);
                merger.warn(format!("Região '{label}': OCR falhou ({e})"));
            }
        }
    }

    fn ask_region(&self, client: &dyn VisionClient, part: &RegionImage, merger: &mut RecordMerger) {
        let Some(image) = &part.image else {
            return;
        };
        let label = &part.region.label;

        let request = match VisionImage::from_image(label, image) {
            Ok(encoded) => VisionRequest::receipt(encoded),
            Err(e) => {
                merger.warn(format!("Região '{label}': {e}"));
                return;
            }
        };
        self.ask(client, &request, label, merger);
    }

    fn ask_batched(&self, client: &dyn VisionClient, parts: &[RegionImage], merger: &mut RecordMerger) {
        let request = match VisionRequest::for_regions(parts) {
            Ok(request) => request,
            Err(e) => {
                merger.warn(format!("Regiões da página: {e}"));
                return;
            }
        };
        if request.images.is_empty() {
            return;
        }
        self.ask(client, &request, "página", merger);
    }

    fn ask(
        &self,
        client: &dyn VisionClient,
        request: &VisionRequest,
        label: &str,
        merger: &mut RecordMerger,
    ) {
        match self.chain.run(client, request) {
            Ok(response) => {
                if !response.failures.is_empty() {
                    debug!(
                        "'{}' answered by {} after {} failed model(s)",
                        label,
                        response.model,
                        response.failures.len()
                    );
                }
                let summary = merger.merge(&FieldCandidates::from_json_object(&response.fields));
                debug!(
                    "Vision region '{}': {} accepted, {} duplicate, {} skipped",
                    label, summary.accepted, summary.duplicates, summary.skipped
                );
            }
            Err(VisionError::AllModelsFailed(attempts)) => {
                let detail = attempts
                    .iter()
                    .map(|a| format!("{}: {}", a.model, a.reason))
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!("No model could read region '{}'", label);
                merger.warn(format!("Região '{label}': nenhum modelo respondeu ({detail})"));
            }
            Err(e) => {
                warn!("Vision failed for region '{}': {}", label, e);
                merger.warn(format!("Região '{label}': {e}"));
            }
        }
    }

    fn placeholder(&self, name: String, message: String, start: Instant) -> DocumentOutcome {
        let mut record = ExtractedRecord::new(name);
        record.warnings.push(message.clone());
        let review = self.policy.assess(&record);

        DocumentOutcome {
            record,
            review,
            regions: 0,
            error: Some(message),
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// File name shown in records and the CSV `arquivo` column.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
