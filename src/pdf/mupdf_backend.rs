//! MuPDF-backed page decoder
//!
//! MuPDF documents are not thread-safe, so nothing here keeps one alive
//! across calls. Loading opens the file once to collect page bounds and
//! metadata; every render opens a fresh document on the calling worker.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use fast_image_resize as fr;
use log::debug;
use mupdf::{Colorspace, Document, Matrix, MetadataName, Pixmap};

use super::backend::{DecodeError, DocumentBackend, PageSource};
use super::geometry::Size;
use super::parsing::pdf_date::normalize_pdf_date;
use super::types::{Bitmap, MetadataField, PageSize};

/// Opens documents with MuPDF
#[derive(Clone, Debug)]
pub struct MupdfBackend {
    render_annotations: bool,
}

impl MupdfBackend {
    #[must_use]
    pub fn new(render_annotations: bool) -> Self {
        Self { render_annotations }
    }
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self::new(true)
    }
}

impl DocumentBackend for MupdfBackend {
    fn load(&self, path: &Path) -> Result<Box<dyn PageSource>, DecodeError> {
        let doc = open_document(path)?;
        let page_count = usize::try_from(doc.page_count()?)
            .map_err(|_| DecodeError::generic("negative page count"))?;

        let mut page_sizes = Vec::with_capacity(page_count);
        for page_num in 0..page_count {
            let page = doc.load_page(page_index(page_num)?)?;
            let bounds = page.bounds()?;
            page_sizes.push(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0));
        }

        let metadata = MetadataField::ALL
            .iter()
            .map(|&field| {
                let value = doc.metadata(metadata_name(field)).unwrap_or_default();
                if field.is_date() && !value.is_empty() {
                    normalize_pdf_date(&value)
                } else {
                    value
                }
            })
            .collect();

        let bytes_count = std::fs::metadata(path)?.len();

        debug!(
            "Parsed {} ({page_count} pages, {bytes_count} bytes)",
            path.display()
        );

        Ok(Box::new(MupdfSource {
            path: path.to_path_buf(),
            page_sizes,
            metadata,
            bytes_count,
            render_annotations: self.render_annotations,
        }))
    }
}

struct MupdfSource {
    path: PathBuf,
    page_sizes: Vec<PageSize>,
    /// Values in `MetadataField::ALL` order
    metadata: Vec<String>,
    bytes_count: u64,
    render_annotations: bool,
}

impl PageSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_sizes.len()
    }

    fn page_size(&self, page: usize) -> Option<PageSize> {
        self.page_sizes.get(page).copied()
    }

    fn bytes_count(&self) -> u64 {
        self.bytes_count
    }

    fn metadata_field(&self, field: MetadataField) -> String {
        MetadataField::ALL
            .iter()
            .position(|&f| f == field)
            .and_then(|i| self.metadata.get(i))
            .cloned()
            .unwrap_or_default()
    }

    fn render(&self, page_num: usize, size: Size) -> Result<Bitmap, DecodeError> {
        let doc = open_document(&self.path)?;
        let page = doc.load_page(page_index(page_num)?)?;

        let bounds = page.bounds()?;
        let (page_width, page_height) = (bounds.x1 - bounds.x0, bounds.y1 - bounds.y0);
        if page_width <= 0.0 || page_height <= 0.0 {
            return Err(DecodeError::generic(format!(
                "page {page_num} has empty bounds"
            )));
        }

        // Each axis is scaled on its own: the target size is authoritative.
        let transform = Matrix::new_scale(
            size.width as f32 / page_width,
            size.height as f32 / page_height,
        );
        let rgb = Colorspace::device_rgb();
        let pixmap = page.to_pixmap(&transform, &rgb, false, self.render_annotations)?;

        let raster = pixmap_to_rgba(&pixmap)?;
        if raster.dimensions() == (size.width, size.height) {
            Ok(raster)
        } else {
            debug!(
                "Snapping page {page_num} raster {}x{} to {size}",
                raster.width(),
                raster.height()
            );
            resize_exact(raster, size)
        }
    }
}

fn open_document(path: &Path) -> Result<Document, DecodeError> {
    Ok(Document::open(path.to_string_lossy().as_ref())?)
}

fn page_index(page_num: usize) -> Result<i32, DecodeError> {
    i32::try_from(page_num)
        .map_err(|_| DecodeError::generic(format!("page index {page_num} out of range")))
}

fn metadata_name(field: MetadataField) -> MetadataName {
    match field {
        MetadataField::Title => MetadataName::Title,
        MetadataField::Subject => MetadataName::Subject,
        MetadataField::Author => MetadataName::Author,
        MetadataField::Keywords => MetadataName::Keywords,
        MetadataField::Producer => MetadataName::Producer,
        MetadataField::Creator => MetadataName::Creator,
        MetadataField::CreationDate => MetadataName::CreationDate,
        MetadataField::ModificationDate => MetadataName::ModDate,
    }
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Result<Bitmap, DecodeError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(DecodeError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    let expected_min = stride.saturating_mul(height);
    if samples.len() < expected_min || row_bytes > stride {
        return Err(DecodeError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        let row_start = y * stride;
        let row = &samples[row_start..row_start + row_bytes];
        for px in row.chunks_exact(n) {
            let alpha = if n > 3 { px[3] } else { u8::MAX };
            out.extend_from_slice(&[px[0], px[1], px[2], alpha]);
        }
    }

    Bitmap::from_raw(pixmap.width(), pixmap.height(), out)
        .ok_or_else(|| DecodeError::generic("Pixmap dimensions do not match its samples"))
}

fn resize_exact(raster: Bitmap, size: Size) -> Result<Bitmap, DecodeError> {
    let (src_width, src_height) = raster.dimensions();
    let src = fr::Image::from_vec_u8(
        non_zero(src_width)?,
        non_zero(src_height)?,
        raster.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| DecodeError::generic(e.to_string()))?;

    let mut dst = fr::Image::new(non_zero(size.width)?, non_zero(size.height)?, fr::PixelType::U8x4);
    let mut resizer = fr::Resizer::new(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));
    resizer
        .resize(&src.view(), &mut dst.view_mut())
        .map_err(|e| DecodeError::generic(e.to_string()))?;

    Bitmap::from_raw(size.width, size.height, dst.into_vec())
        .ok_or_else(|| DecodeError::generic("Resized buffer does not match target size"))
}

fn non_zero(value: u32) -> Result<NonZeroU32, DecodeError> {
    NonZeroU32::new(value).ok_or_else(|| DecodeError::generic("zero-sized raster"))
}
