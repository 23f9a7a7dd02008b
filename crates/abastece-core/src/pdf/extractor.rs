//! Page images of scanned PDFs using lopdf.
//!
//! Scanned receipts carry each page as one embedded image XObject, so a page
//! is "rendered" by decoding that image and scaling it to the page's media
//! box at the configured scale. JPEG (`DCTDecode`) and uncompressed or
//! Flate-compressed 8-bit gray, RGB and CMYK images are decoded.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Document, Object, ObjectId, Stream};
use tracing::{debug, trace};

use super::{PageSource, Result};
use crate::error::PdfError;

/// Page tree nodes followed upwards before giving up on an inherited key.
const MAX_TREE_DEPTH: usize = 32;

/// Scanned PDF page source.
pub struct PdfExtractor {
    document: Option<Document>,
    /// Output pixels per PDF point; `0` keeps the embedded image size.
    render_scale: f32,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self {
            document: None,
            render_scale: 2.0,
        }
    }

    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    fn document(&self) -> Result<&Document> {
        self.document
            .as_ref()
            .ok_or_else(|| PdfError::Parse("no document loaded".to_string()))
    }

    /// Decodable images referenced by a page's resources.
    fn page_images(doc: &Document, page_id: ObjectId) -> Vec<DynamicImage> {
        let Some(resources) = inherited(doc, page_id, b"Resources").and_then(|o| o.as_dict().ok())
        else {
            return Vec::new();
        };
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| doc.dereference(o).ok())
            .and_then(|(_, o)| o.as_dict().ok())
        else {
            return Vec::new();
        };

        xobjects
            .iter()
            .filter_map(|(name, reference)| {
                let (_, object) = doc.dereference(reference).ok()?;
                let image = decode_image(doc, object.as_stream().ok()?);
                if image.is_none() {
                    trace!("XObject {} is not a decodable image", String::from_utf8_lossy(name));
                }
                image
            })
            .collect()
    }

    /// Every decodable image in the document, in object order.
    fn document_images(doc: &Document) -> Vec<DynamicImage> {
        doc.objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .filter_map(|stream| decode_image(doc, stream))
            .collect()
    }

    /// Scale a page image to the media box at `render_scale`.
    fn fit_to_page(&self, image: DynamicImage, media_box: Option<(f32, f32)>) -> DynamicImage {
        let Some((width, height)) = media_box else {
            return image;
        };
        if self.render_scale <= 0.0 {
            return image;
        }

        let target_width = (width * self.render_scale).round() as u32;
        let target_height = (height * self.render_scale).round() as u32;
        if target_width == 0 || target_height == 0 {
            return image;
        }
        if (target_width, target_height) == (image.width(), image.height()) {
            return image;
        }

        debug!(
            "Scaling page image {}x{} -> {}x{}",
            image.width(),
            image.height(),
            target_width,
            target_height
        );
        image.resize_exact(target_width, target_height, FilterType::Triangle)
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for PdfExtractor {
    fn load(&mut self, data: &[u8]) -> Result<()> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");
        }

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        self.document = Some(doc);
        Ok(())
    }

    fn page_count(&self) -> u32 {
        self.document
            .as_ref()
            .map(|doc| doc.get_pages().len() as u32)
            .unwrap_or(0)
    }

    fn render_page(&self, page: u32) -> Result<DynamicImage> {
        let doc = self.document()?;
        let page_id = *doc.get_pages().get(&page).ok_or(PdfError::InvalidPage(page))?;

        // The scan is the largest image on the page; logos and stamps are smaller.
        let on_page = Self::page_images(doc, page_id)
            .into_iter()
            .max_by_key(|image| u64::from(image.width()) * u64::from(image.height()));

        let image = match on_page {
            Some(image) => image,
            None => {
                debug!("No image XObjects on page {}, scanning document", page);
                let mut all = Self::document_images(doc);
                let index = (page - 1) as usize;
                if index < all.len() {
                    all.swap_remove(index)
                } else if !all.is_empty() {
                    all.swap_remove(0)
                } else {
                    return Err(PdfError::ImageExtraction(format!(
                        "no decodable image for page {page}"
                    )));
                }
            }
        };

        Ok(self.fit_to_page(image, media_box(doc, page_id)))
    }
}

/// Look up a page attribute, following `Parent` links for inherited keys.
fn inherited<'a>(doc: &'a Document, node_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = node_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(current).ok()?;
        if let Ok(value) = node.get(key) {
            return doc.dereference(value).ok().map(|(_, object)| object);
        }
        current = node.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Width and height of the page's media box in points.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let corners = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    if corners.len() != 4 {
        return None;
    }
    let values: Vec<f32> = corners.iter().filter_map(number).collect();
    if values.len() != 4 {
        return None;
    }
    let width = (values[2] - values[0]).abs();
    let height = (values[3] - values[1]).abs();
    (width > 0.0 && height > 0.0).then_some((width, height))
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Some(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            _ => None,
        }
    }

    fn from_components(components: i64) -> Option<Self> {
        match components {
            1 => Some(ColorSpace::Gray),
            3 => Some(ColorSpace::Rgb),
            4 => Some(ColorSpace::Cmyk),
            _ => None,
        }
    }

    fn resolve(doc: &Document, object: &Object) -> Option<Self> {
        let (_, object) = doc.dereference(object).ok()?;
        match object {
            Object::Name(name) => Self::from_name(name),
            Object::Array(items) => {
                let family = items.first()?.as_name().ok()?;
                if family == b"ICCBased" {
                    let (_, profile) = doc.dereference(items.get(1)?).ok()?;
                    let components = profile.as_stream().ok()?.dict.get(b"N").ok()?.as_i64().ok()?;
                    Self::from_components(components)
                } else {
                    Self::from_name(family)
                }
            }
            _ => None,
        }
    }
}

/// Decode an image XObject stream.
fn decode_image(doc: &Document, stream: &Stream) -> Option<DynamicImage> {
    let dict = &stream.dict;
    if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
        return None;
    }

    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    trace!("Image XObject {}x{}", width, height);

    let filter = dict.get(b"Filter").ok().and_then(|filter| match filter {
        Object::Name(name) => Some(name.as_slice()),
        Object::Array(filters) => filters.last().and_then(|o| o.as_name().ok()),
        _ => None,
    });

    match filter {
        Some(b"DCTDecode") => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg).ok();
        }
        Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
            trace!("Unsupported image filter");
            return None;
        }
        _ => {}
    }

    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 {
        trace!("Unsupported bits per component: {}", bits);
        return None;
    }

    let color_space = match dict.get(b"ColorSpace") {
        Ok(object) => ColorSpace::resolve(doc, object)?,
        Err(_) => ColorSpace::Rgb,
    };

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    raw_image(&data, width, height, color_space)
}

/// Build an image from 8-bit samples.
fn raw_image(data: &[u8], width: u32, height: u32, color_space: ColorSpace) -> Option<DynamicImage> {
    let pixels = width as usize * height as usize;
    match color_space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, data.get(..pixels)?.to_vec())
            .map(DynamicImage::ImageLuma8),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, data.get(..pixels * 3)?.to_vec())
            .map(DynamicImage::ImageRgb8),
        ColorSpace::Cmyk => {
            let rgb: Vec<u8> = data
                .get(..pixels * 4)?
                .chunks_exact(4)
                .flat_map(|cmyk| {
                    let k = 255 - u16::from(cmyk[3]);
                    [cmyk[0], cmyk[1], cmyk[2]].map(|c| ((255 - u16::from(c)) * k / 255) as u8)
                })
                .collect();
            RgbImage::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use std::io::Cursor;

    fn gray_xobject(width: i64, height: i64, shade: u8) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8i64,
            },
            vec![shade; (width * height) as usize],
        )
    }

    /// One page per entry; `Some` pages carry the given image XObject.
    fn build_pdf(pages: Vec<Option<Stream>>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();

        for image in pages {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0i64.into(), 0i64.into(), 10i64.into(), 5i64.into()],
            };
            if let Some(image) = image {
                let image_id = doc.add_object(image);
                let content_id = doc.add_object(Stream::new(
                    dictionary! {},
                    b"q 10 0 0 5 0 0 cm /Im0 Do Q".to_vec(),
                ));
                page.set("Contents", content_id);
                page.set(
                    "Resources",
                    dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
                );
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_unloaded_extractor() {
        let extractor = PdfExtractor::new();
        assert_eq!(extractor.page_count(), 0);
        assert!(matches!(extractor.render_page(1), Err(PdfError::Parse(_))));
    }

    #[test]
    fn test_render_scales_to_media_box() {
        let mut extractor = PdfExtractor::new();
        extractor.load(&build_pdf(vec![Some(gray_xobject(4, 2, 90))])).unwrap();

        assert_eq!(extractor.page_count(), 1);
        let page = extractor.render_page(1).unwrap();
        assert_eq!((page.width(), page.height()), (20, 10));
    }

    #[test]
    fn test_zero_scale_keeps_embedded_size() {
        let mut extractor = PdfExtractor::new().with_render_scale(0.0);
        extractor.load(&build_pdf(vec![Some(gray_xobject(4, 2, 90))])).unwrap();

        let page = extractor.render_page(1).unwrap();
        assert_eq!((page.width(), page.height()), (4, 2));
        assert_eq!(page.to_luma8().get_pixel(0, 0)[0], 90);
    }

    #[test]
    fn test_page_without_images_falls_back_to_document() {
        let mut extractor = PdfExtractor::new().with_render_scale(0.0);
        extractor
            .load(&build_pdf(vec![Some(gray_xobject(3, 3, 10)), None]))
            .unwrap();

        assert_eq!(extractor.page_count(), 2);
        let page = extractor.render_page(2).unwrap();
        assert_eq!((page.width(), page.height()), (3, 3));
        assert!(matches!(extractor.render_page(3), Err(PdfError::InvalidPage(3))));
    }

    #[test]
    fn test_jpeg_xobject() {
        let mut jpeg = Vec::new();
        DynamicImage::new_rgb8(8, 6)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 8i64,
                "Height" => 6i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );

        let mut extractor = PdfExtractor::new().with_render_scale(0.0);
        extractor.load(&build_pdf(vec![Some(stream)])).unwrap();
        let page = extractor.render_page(1).unwrap();
        assert_eq!((page.width(), page.height()), (8, 6));
    }

    #[test]
    fn test_raw_cmyk_black_and_white() {
        let data = [0, 0, 0, 255, 0, 0, 0, 0];
        let image = raw_image(&data, 2, 1, ColorSpace::Cmyk).unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_short_raw_data_is_rejected() {
        assert!(raw_image(&[1, 2, 3], 2, 2, ColorSpace::Gray).is_none());
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let mut extractor = PdfExtractor::new();
        assert!(matches!(extractor.load(b"%PDF-nope"), Err(PdfError::Parse(_))));
    }
}
