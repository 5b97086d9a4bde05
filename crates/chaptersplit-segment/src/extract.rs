use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use image::{DynamicImage, GrayImage};

use chaptersplit_core::{Degradation, Document, PageRef, RecognitionError, Recognizer};

/// Gray level above which a pixel is treated as background.
pub const OCR_THRESHOLD: u8 = 150;

/// Default bound on a single page's recognition.
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Native,
    Recognized,
    Empty,
}

/// Text of one page plus how it was obtained.
#[derive(Debug, Clone)]
pub struct PageText {
    pub text: String,
    pub source: TextSource,
    pub degradation: Option<Degradation>,
}

impl PageText {
    fn empty(page: usize, reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            source: TextSource::Empty,
            degradation: Some(Degradation::PageExtraction {
                page,
                reason: reason.into(),
            }),
        }
    }
}

/// Per-page text extraction with an optical recognition fallback.
///
/// Never fails: a page that cannot be read in any way contributes an empty
/// string and a [`Degradation`].
pub struct PageTextExtractor {
    footer_margin: f32,
    recognizer: Option<Arc<dyn Recognizer>>,
    ocr_timeout: Duration,
}

impl PageTextExtractor {
    pub fn new(footer_margin: f32) -> Self {
        Self {
            footer_margin,
            recognizer: None,
            ocr_timeout: DEFAULT_OCR_TIMEOUT,
        }
    }

    /// Enable the recognition fallback for pages without a text layer.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_ocr_timeout(mut self, timeout: Duration) -> Self {
        self.ocr_timeout = timeout;
        self
    }

    /// Text of page `index`.
    pub fn extract_page(&self, doc: &dyn Document, index: usize) -> PageText {
        match doc.page(index) {
            Ok(page) => self.extract(doc, &page),
            Err(e) => {
                tracing::warn!(page = index, error = %e, "cannot load page");
                PageText::empty(index, format!("page load failed: {e}"))
            }
        }
    }

    pub fn extract(&self, doc: &dyn Document, page: &PageRef) -> PageText {
        let clip = page.footer_clip(self.footer_margin);
        match doc.extract_text(page, clip) {
            Ok(text) if !text.trim().is_empty() => {
                return PageText {
                    text: expand_ligatures(&text),
                    source: TextSource::Native,
                    degradation: None,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(page = page.index, error = %e, "native text extraction failed");
            }
        }

        let Some(recognizer) = &self.recognizer else {
            tracing::warn!(page = page.index, "no text layer and recognition disabled");
            return PageText::empty(page.index, "no text layer; recognition disabled");
        };

        match self.recognize_page(doc, page, Arc::clone(recognizer)) {
            Ok(text) if !text.is_empty() => {
                tracing::info!(page = page.index, chars = text.len(), "page recovered by OCR");
                PageText {
                    text,
                    source: TextSource::Recognized,
                    degradation: Some(Degradation::PageExtraction {
                        page: page.index,
                        reason: "text recovered by optical recognition".into(),
                    }),
                }
            }
            Ok(_) => {
                tracing::warn!(page = page.index, "OCR found no text");
                PageText::empty(page.index, "no text layer; recognition found no text")
            }
            Err(e) => {
                tracing::warn!(page = page.index, error = %e, "OCR failed");
                PageText::empty(page.index, format!("recognition failed: {e}"))
            }
        }
    }

    fn recognize_page(
        &self,
        doc: &dyn Document,
        page: &PageRef,
        recognizer: Arc<dyn Recognizer>,
    ) -> Result<String, RecognitionError> {
        let raster = doc
            .rasterize(page)
            .map_err(|e| RecognitionError::Failed(e.to_string()))?;
        let image = binarize(&raster, OCR_THRESHOLD);
        let text = recognize_with_timeout(recognizer, image, self.ocr_timeout)?;
        Ok(text.trim().to_string())
    }
}

/// Grayscale then fixed binary threshold: pixels brighter than `threshold`
/// become white, all others black.
pub fn binarize(image: &DynamicImage, threshold: u8) -> GrayImage {
    let mut gray = image.to_luma8();
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 255 } else { 0 };
    }
    gray
}

/// Run recognition on a helper thread and give up after `timeout`.
///
/// A timed-out recognizer keeps running detached; its result is discarded.
fn recognize_with_timeout(
    recognizer: Arc<dyn Recognizer>,
    image: GrayImage,
    timeout: Duration,
) -> Result<String, RecognitionError> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("ocr-page".into())
        .spawn(move || {
            let _ = tx.send(recognizer.recognize(&image));
        })
        .map_err(|e| RecognitionError::Failed(format!("cannot spawn OCR thread: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(RecognitionError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(RecognitionError::Failed("recognizer panicked".into()))
        }
    }
}

/// Expand common typographic ligatures found in PDFs.
pub fn expand_ligatures(text: &str) -> String {
    text.replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .replace(['\u{FB05}', '\u{FB06}'], "st")
}
