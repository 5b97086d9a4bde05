use std::path::Path;
use std::time::Duration;

use image::{DynamicImage, GrayImage};
use thiserror::Error;

use crate::{ClipRect, PageRef};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open document: {0}")]
    OpenError(String),
    #[error("page {0} out of range")]
    PageOutOfRange(usize),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("failed to rasterize page: {0}")]
    RasterError(String),
    #[error("failed to export pages: {0}")]
    ExportError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Opens paged documents.
///
/// Implementors own the document-access library; the segmentation engine
/// (linearization, boundary matching, partitioning) lives in
/// `chaptersplit_segment`.
pub trait DocumentBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Document>, BackendError>;
}

/// An open document. Dropping it closes the underlying handle.
pub trait Document {
    fn page_count(&self) -> usize;

    /// Look up a page by its 0-based ordinal.
    fn page(&self, index: usize) -> Result<PageRef, BackendError>;

    /// Native text of a page. With `clip`, only text inside the rectangle
    /// is returned.
    fn extract_text(&self, page: &PageRef, clip: Option<ClipRect>) -> Result<String, BackendError>;

    /// Render a page to an image for optical recognition.
    fn rasterize(&self, page: &PageRef) -> Result<DynamicImage, BackendError>;

    /// Write pages `from..=to` as a standalone document at `dest`.
    fn export_range(&self, from: usize, to: usize, dest: &Path) -> Result<(), BackendError>;
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("failed to initialize recognizer: {0}")]
    Init(String),
    #[error("recognition failed: {0}")]
    Failed(String),
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),
}

/// Image-to-text recognition engine used when a page has no text layer.
pub trait Recognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String, RecognitionError>;
}
