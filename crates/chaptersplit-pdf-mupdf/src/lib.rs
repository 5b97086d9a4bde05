use std::path::{Path, PathBuf};

use image::DynamicImage;
use mupdf::pdf::PdfDocument;
use mupdf::{Colorspace, Document as MuDocument, ImageFormat, Matrix, TextPageFlags};

use chaptersplit_core::{BackendError, ClipRect, Document, DocumentBackend, PageRef};

/// Resolution pages are rendered at for optical recognition.
const DEFAULT_RENDER_DPI: f32 = 200.0;

/// MuPDF-based implementation of [`DocumentBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the segmentation engine does not
/// transitively depend on it.
pub struct MupdfBackend {
    render_dpi: f32,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            render_dpi: DEFAULT_RENDER_DPI,
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterization resolution used for OCR. Values below 72 are
    /// raised to 72.
    pub fn with_render_dpi(mut self, dpi: f32) -> Self {
        self.render_dpi = dpi.max(72.0);
        self
    }
}

impl DocumentBackend for MupdfBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;

        let document =
            MuDocument::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;
        let page_count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;

        tracing::debug!(path = %path.display(), page_count, "opened document");

        Ok(Box::new(MupdfDocument {
            document,
            path: path.to_path_buf(),
            page_count: usize::try_from(page_count).unwrap_or(0),
            scale: self.render_dpi / 72.0,
        }))
    }
}

/// An open MuPDF document.
pub struct MupdfDocument {
    document: MuDocument,
    path: PathBuf,
    page_count: usize,
    scale: f32,
}

impl MupdfDocument {
    fn load(&self, index: usize) -> Result<mupdf::Page, BackendError> {
        if index >= self.page_count {
            return Err(BackendError::PageOutOfRange(index));
        }
        self.document
            .load_page(index as i32)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

impl Document for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page(&self, index: usize) -> Result<PageRef, BackendError> {
        let page = self.load(index)?;
        let bounds = page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        Ok(PageRef {
            index,
            width: bounds.x1 - bounds.x0,
            height: bounds.y1 - bounds.y0,
        })
    }

    fn extract_text(&self, page: &PageRef, clip: Option<ClipRect>) -> Result<String, BackendError> {
        let mu_page = self.load(page.index)?;
        let text_page = mu_page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let page_bounds = mu_page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        // Clip coordinates are page-relative; MuPDF bounds need not start at 0.
        let region = clip.map(|c| ClipRect {
            x0: page_bounds.x0 + c.x0,
            y0: page_bounds.y0 + c.y0,
            x1: page_bounds.x0 + c.x1,
            y1: page_bounds.y0 + c.y1,
        });

        // Block and line order, one line per text line
        let mut page_text = String::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();

            if let Some(region) = region {
                // Skip blocks starting below the clip (footer band) or lying outside it
                if block_bounds.y0 >= region.y1 || block_bounds.y1 <= region.y0 {
                    continue;
                }
                if block_bounds.x0 >= region.x1 || block_bounds.x1 <= region.x0 {
                    continue;
                }
            }

            for line in block.lines() {
                let line_text: String = line
                    .chars()
                    .map(|c| c.char().unwrap_or('\u{FFFD}'))
                    .collect();
                page_text.push_str(&line_text);
                page_text.push('\n');
            }
        }

        Ok(page_text)
    }

    fn rasterize(&self, page: &PageRef) -> Result<DynamicImage, BackendError> {
        let mu_page = self.load(page.index)?;
        let matrix = Matrix::new_scale(self.scale, self.scale);
        let pixmap = mu_page
            .to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)
            .map_err(|e| BackendError::RasterError(e.to_string()))?;

        let mut png = Vec::new();
        pixmap
            .write_to(&mut png, ImageFormat::PNG)
            .map_err(|e| BackendError::RasterError(e.to_string()))?;

        image::load_from_memory(&png).map_err(|e| BackendError::RasterError(e.to_string()))
    }

    fn export_range(&self, from: usize, to: usize, dest: &Path) -> Result<(), BackendError> {
        if from > to || to >= self.page_count {
            return Err(BackendError::PageOutOfRange(to));
        }
        let src_path = self
            .path
            .to_str()
            .ok_or_else(|| BackendError::ExportError("invalid path encoding".into()))?;
        let dest_path = dest
            .to_str()
            .ok_or_else(|| BackendError::ExportError("invalid path encoding".into()))?;

        let source =
            PdfDocument::open(src_path).map_err(|e| BackendError::ExportError(e.to_string()))?;
        let mut output = PdfDocument::new();
        for (slot, index) in (from..=to).enumerate() {
            output
                .graft_page(slot as i32, &source, index as i32)
                .map_err(|e| BackendError::ExportError(e.to_string()))?;
        }
        output
            .save(dest_path)
            .map_err(|e| BackendError::ExportError(e.to_string()))?;

        tracing::debug!(from, to, dest = %dest.display(), "exported page range");
        Ok(())
    }
}
