//! Page sources: scanned PDFs and plain image files.

mod extractor;
mod image_file;

pub use extractor::PdfExtractor;
pub use image_file::ImageFile;

use std::path::Path;

use image::DynamicImage;
use tracing::debug;

use crate::error::{AbasteceError, ExtractionError, PdfError};

/// Result type for page source operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Image file extensions accepted as single-page documents.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// A document whose pages can be turned into images.
pub trait PageSource {
    /// Load a document from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Number of pages in the loaded document.
    fn page_count(&self) -> u32;

    /// Render a page (1-indexed) as an image.
    fn render_page(&self, page: u32) -> Result<DynamicImage>;
}

/// Kind of input document, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if extension == "pdf" {
            Some(InputKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(InputKind::Image)
        } else {
            None
        }
    }
}

/// Whether a path has a supported document extension.
pub fn is_supported(path: &Path) -> bool {
    InputKind::from_path(path).is_some()
}

/// Open a document and return a loaded page source for it.
pub fn open(path: &Path, render_scale: f32) -> crate::error::Result<Box<dyn PageSource>> {
    let kind = InputKind::from_path(path)
        .ok_or_else(|| ExtractionError::UnsupportedFormat(path.display().to_string()))?;

    let data = std::fs::read(path).map_err(AbasteceError::Io)?;
    debug!("Read {} bytes from {}", data.len(), path.display());

    let mut source: Box<dyn PageSource> = match kind {
        InputKind::Pdf => Box::new(PdfExtractor::new().with_render_scale(render_scale)),
        InputKind::Image => Box::new(ImageFile::new()),
    };
    source.load(&data)?;
    Ok(source)
}
