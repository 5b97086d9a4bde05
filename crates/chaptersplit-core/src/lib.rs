use std::ops::Range;

pub mod backend;
pub mod config_file;

pub use backend::{BackendError, Document, DocumentBackend, RecognitionError, Recognizer};

/// A page within an open document.
///
/// Produced by a [`Document`]; the engine only reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRef {
    /// 0-based ordinal within the document.
    pub index: usize,
    pub width: f32,
    pub height: f32,
}

impl PageRef {
    /// Region of the page left after excluding a band of `margin` units at
    /// the bottom. Returns `None` when no margin applies.
    pub fn footer_clip(&self, margin: f32) -> Option<ClipRect> {
        if margin <= 0.0 {
            return None;
        }
        Some(ClipRect {
            x0: 0.0,
            y0: 0.0,
            x1: self.width,
            y1: (self.height - margin).max(0.0),
        })
    }
}

/// Axis-aligned rectangle in page coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// A detected section start inside a text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Byte offset of the heading within the stream.
    pub offset: usize,
    /// Heading text used for titling, if the rule captured any.
    pub heading: Option<String>,
}

impl Boundary {
    pub fn new(offset: usize, heading: impl Into<String>) -> Self {
        Self {
            offset,
            heading: Some(heading.into()),
        }
    }

    pub fn at(offset: usize) -> Self {
        Self {
            offset,
            heading: None,
        }
    }
}

/// Half-open byte interval `[start, end)` of a text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// 1-based position among the spans of one level.
    pub seq: usize,
    /// Heading of the boundary that opened this span. `None` for a
    /// leading preamble or a level without boundaries.
    pub heading: Option<String>,
}

impl Span {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Output unit of segmentation: a labelled section and its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    pub label: String,
    pub text: String,
    /// Inclusive page range the section's text was drawn from.
    pub pages: Option<(usize, usize)>,
    pub children: Vec<SectionNode>,
}

impl SectionNode {
    pub fn leaf(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            pages: None,
            children: Vec::new(),
        }
    }
}

/// A recoverable problem met during segmentation. Never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// A page fell back to recognition, or produced no text at all.
    PageExtraction { page: usize, reason: String },
    /// A chapter's subchapters could not be derived; it was emitted as a
    /// single subchapter.
    Subchapter { chapter: usize, reason: String },
}

/// Counters collected over one segmentation run.
#[derive(Debug, Clone, Default)]
pub struct SegmentStats {
    pub pages_linearized: usize,
    pub ocr_pages: usize,
    pub empty_pages: usize,
    pub chapters: usize,
    pub subchapters: usize,
    pub short_chapters_dropped: usize,
    pub degradations: Vec<Degradation>,
}

/// Progress events emitted while segmenting a document.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    PageExtracted {
        index: usize,
        total: usize,
        ocr: bool,
    },
    ChaptersFound {
        count: usize,
    },
    ChapterSegmented {
        index: usize,
        total: usize,
        subchapters: usize,
    },
}
