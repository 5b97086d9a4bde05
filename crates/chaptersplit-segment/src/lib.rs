use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod boundary;
pub mod extract;
pub mod linear;
pub mod orchestrator;
pub mod partition;
pub mod profile;
pub mod title;

pub use boundary::{BoundaryError, BoundaryRule, HeadingPattern, match_boundaries};
pub use extract::{PageText, PageTextExtractor, TextSource};
pub use linear::{LinearText, linearize};
pub use orchestrator::{SegmentOptions, SegmentedDocument, Segmenter};
pub use partition::partition;
pub use profile::{DEFAULT_PROFILE, DocumentProfile, ProfileBuilder, ProfileError, ProfileRegistry};
pub use title::{TitleMode, normalize_title, resolve_label};
// Re-export domain types from core (canonical definitions live there)
pub use chaptersplit_core::{
    BackendError, Boundary, Degradation, Document, DocumentBackend, ProgressEvent, Recognizer,
    SectionNode, SegmentStats, Span,
};

/// Conditions that end a run. Everything recoverable is reported through
/// [`Degradation`] instead.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("unknown profile '{key}' (known profiles: {known})")]
    ProfileNotFound { key: String, known: String },
    #[error("cannot open document {}: {source}", path.display())]
    DocumentOpen {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("profile '{profile}' found no chapter headings in {}", path.display())]
    NoChapterBoundaries { profile: String, path: PathBuf },
    #[error("chapter matching failed: {0}")]
    Boundary(#[from] BoundaryError),
    #[error("invalid profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Open `path` through `backend`, mapping failure to
/// [`SplitError::DocumentOpen`].
pub fn open_document(
    backend: &dyn DocumentBackend,
    path: &Path,
) -> Result<Box<dyn Document>, SplitError> {
    backend.open(path).map_err(|source| SplitError::DocumentOpen {
        path: path.to_path_buf(),
        source,
    })
}

/// Open and segment a document with `profile`.
///
/// Pipeline:
/// 1. Open the document via `backend`
/// 2. Linearize pages from `profile.skip_pages()` on, with OCR fallback
///    when `recognizer` is given
/// 3. Locate chapter headings (none at all is fatal)
/// 4. Partition into chapters, then each chapter into subchapters
/// 5. Resolve labels
pub fn split_document(
    path: &Path,
    backend: &dyn DocumentBackend,
    profile: &DocumentProfile,
    recognizer: Option<std::sync::Arc<dyn Recognizer>>,
    options: SegmentOptions,
) -> Result<SegmentedDocument, SplitError> {
    let doc = open_document(backend, path)?;
    let mut segmenter = Segmenter::new(profile, options);
    if let Some(recognizer) = recognizer {
        segmenter = segmenter.with_recognizer(recognizer);
    }
    segmenter.segment(doc.as_ref(), path, |_| {})
}
