//! Page segmentation into receipt regions.
//!
//! Two layouts are supported: equal horizontal bands of the page, and a list
//! of fixed rectangles tuned to the receipt print layout. Every rectangle is
//! clamped to the page so smaller pages never produce out-of-bounds crops;
//! a rectangle lying entirely outside the page becomes an empty region.

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Clamp to an image of the given size.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> Rect {
        let x0 = self.x.min(image_width);
        let y0 = self.y.min(image_height);
        let x1 = self.x.saturating_add(self.width).min(image_width);
        let y1 = self.y.saturating_add(self.height).min(image_height);

        Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
}

/// A labeled fixed rectangle in page coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub label: String,
    pub rect: Rect,
}

impl RegionSpec {
    pub fn new(label: impl Into<String>, x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            label: label.into(),
            rect: Rect::new(x, y, width, height),
        }
    }

    /// Receipt layout for pages rendered at twice the PDF resolution.
    pub fn receipt_layout() -> Vec<RegionSpec> {
        vec![
            RegionSpec::new("numero_documento", 470, 0, 375, 330),
            RegionSpec::new("data_hora", 980, 325, 220, 220),
            RegionSpec::new("corpo_documento", 0, 800, 1200, 1800),
            RegionSpec::new("placa_km_modelo", 0, 1275, 425, 330),
        ]
    }
}

/// How a page is cut into regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentStrategy {
    /// `bands` equal horizontal bands, keeping the `selected` (0-based) ones.
    Proportional { bands: u32, selected: Vec<u32> },
    /// Fixed rectangles, clamped to the page.
    Fixed { regions: Vec<RegionSpec> },
    /// The whole page as a single region.
    FullPage,
}

impl SegmentStrategy {
    /// Lower half of the page in quarters, where the receipt data sits.
    pub fn lower_quarters() -> Self {
        SegmentStrategy::Proportional {
            bands: 4,
            selected: vec![2, 3],
        }
    }

    /// Compute the regions for a page of the given size.
    pub fn regions(&self, width: u32, height: u32) -> Vec<Region> {
        match self {
            SegmentStrategy::Proportional { bands, selected } => {
                proportional_bands(width, height, *bands, selected)
            }
            SegmentStrategy::Fixed { regions } => fixed_regions(width, height, regions),
            SegmentStrategy::FullPage => vec![Region {
                label: "pagina".to_string(),
                rect: Rect::new(0, 0, width, height),
            }],
        }
    }

    /// Cut an image into its regions.
    pub fn segment(&self, image: &DynamicImage) -> Vec<RegionImage> {
        let (width, height) = image.dimensions();
        self.regions(width, height)
            .into_iter()
            .map(|region| {
                let image = crop(image, &region);
                RegionImage { region, image }
            })
            .collect()
    }
}

impl Default for SegmentStrategy {
    fn default() -> Self {
        SegmentStrategy::Fixed {
            regions: RegionSpec::receipt_layout(),
        }
    }
}

/// A labeled rectangle already clamped to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub label: String,
    pub rect: Rect,
}

impl Region {
    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }
}

/// A region with its cropped pixels, `None` when the region is empty.
#[derive(Debug, Clone)]
pub struct RegionImage {
    pub region: Region,
    pub image: Option<DynamicImage>,
}

/// Split a page into `bands` equal horizontal bands and keep `selected`.
///
/// The bottom band of the page extends to the last pixel row, so integer
/// division never drops rows.
pub fn proportional_bands(width: u32, height: u32, bands: u32, selected: &[u32]) -> Vec<Region> {
    if bands == 0 {
        return Vec::new();
    }

    let band_height = height / bands;
    let mut regions = Vec::with_capacity(selected.len());

    for &index in selected {
        if index >= bands {
            debug!("Skipping band {} of {}", index, bands);
            continue;
        }

        let y_start = index * band_height;
        let y_end = if index == bands - 1 {
            height
        } else {
            (index + 1) * band_height
        };

        regions.push(Region {
            label: format!("faixa_{}", index + 1),
            rect: Rect::new(0, y_start, width, y_end - y_start),
        });
    }

    regions
}

/// Clamp fixed rectangles to a page.
pub fn fixed_regions(width: u32, height: u32, specs: &[RegionSpec]) -> Vec<Region> {
    specs
        .iter()
        .map(|spec| {
            let rect = spec.rect.clamp_to(width, height);
            if rect != spec.rect {
                debug!(
                    "Region '{}' clamped to {}x{} at ({}, {})",
                    spec.label, rect.width, rect.height, rect.x, rect.y
                );
            }
            Region {
                label: spec.label.clone(),
                rect,
            }
        })
        .collect()
}

/// Crop a region from an image. Empty regions yield `None`.
pub fn crop(image: &DynamicImage, region: &Region) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    let rect = region.rect.clamp_to(width, height);
    if rect.is_empty() {
        return None;
    }
    Some(image.crop_imm(rect.x, rect.y, rect.width, rect.height))
}
