//! Plain image files as single-page documents.

use image::DynamicImage;
use tracing::debug;

use super::{PageSource, Result};
use crate::error::PdfError;

/// A scanned receipt saved as PNG, JPEG, TIFF or BMP.
#[derive(Debug, Clone, Default)]
pub struct ImageFile {
    image: Option<DynamicImage>,
}

impl ImageFile {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageSource for ImageFile {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let image = image::load_from_memory(data)
            .map_err(|e| PdfError::ImageExtraction(format!("cannot decode image: {e}")))?;
        debug!("Loaded image {}x{}", image.width(), image.height());
        self.image = Some(image);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        u32::from(self.image.is_some())
    }

    fn render_page(&self, page: u32) -> Result<DynamicImage> {
        match &self.image {
            None => Err(PdfError::NoPages),
            Some(image) if page == 1 => Ok(image.clone()),
            Some(_) => Err(PdfError::InvalidPage(page)),
        }
    }
}
