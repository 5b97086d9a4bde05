use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chaptersplit_core::{
    Degradation, Document, ProgressEvent, Recognizer, SectionNode, SegmentStats, Span,
};

use crate::SplitError;
use crate::boundary::match_boundaries;
use crate::extract::{DEFAULT_OCR_TIMEOUT, PageTextExtractor};
use crate::linear::{LinearText, linearize};
use crate::partition::partition;
use crate::profile::DocumentProfile;
use crate::title::{TitleMode, resolve_label};

/// Engine knobs that are not part of a document profile.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    /// Upper bound on recognition time for a single page.
    pub ocr_timeout: Duration,
    /// Normalization applied to subchapter labels. Chapter labels are
    /// always condensed keys.
    pub title_mode: TitleMode,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            ocr_timeout: DEFAULT_OCR_TIMEOUT,
            title_mode: TitleMode::Filename,
        }
    }
}

/// Chapters of one document, in document order, plus run counters.
#[derive(Debug, Clone)]
pub struct SegmentedDocument {
    pub chapters: Vec<SectionNode>,
    pub stats: SegmentStats,
}

/// Drives one document through linearization, chapter matching and
/// per-chapter subchapter matching.
///
/// A document without a single chapter heading is a hard failure. Problems
/// below that level (unreadable pages, chapters without subchapter
/// headings) degrade the affected section only and are reported in
/// [`SegmentStats::degradations`].
pub struct Segmenter<'a> {
    profile: &'a DocumentProfile,
    extractor: PageTextExtractor,
    options: SegmentOptions,
}

impl<'a> Segmenter<'a> {
    pub fn new(profile: &'a DocumentProfile, options: SegmentOptions) -> Self {
        let extractor =
            PageTextExtractor::new(profile.footer_margin()).with_ocr_timeout(options.ocr_timeout);
        Self {
            profile,
            extractor,
            options,
        }
    }

    /// Enable the OCR fallback for pages without a usable text layer.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.extractor = self.extractor.with_recognizer(recognizer);
        self
    }

    /// Segment every page of `doc` from the profile's first content page.
    ///
    /// `source` only labels errors and log lines.
    pub fn segment(
        &self,
        doc: &dyn Document,
        source: &Path,
        progress: impl Fn(ProgressEvent),
    ) -> Result<SegmentedDocument, SplitError> {
        let mut stats = SegmentStats::default();
        let last_page = doc.page_count().saturating_sub(1);
        let text = linearize(
            doc,
            &self.extractor,
            self.profile.skip_pages(),
            0,
            last_page,
            &mut stats,
            &progress,
        );
        tracing::info!(
            path = %source.display(),
            pages = stats.pages_linearized,
            chars = text.len(),
            ocr_pages = stats.ocr_pages,
            "document linearized"
        );
        self.segment_linear(&text, source, stats, &progress)
    }

    /// Segment an already linearized stream.
    pub fn segment_linear(
        &self,
        text: &LinearText,
        source: &Path,
        mut stats: SegmentStats,
        progress: &dyn Fn(ProgressEvent),
    ) -> Result<SegmentedDocument, SplitError> {
        let boundaries = match_boundaries(text.as_str(), self.profile.chapter_rule())?;
        if boundaries.is_empty() {
            return Err(SplitError::NoChapterBoundaries {
                profile: self.profile.name().to_string(),
                path: source.to_path_buf(),
            });
        }
        tracing::info!(
            profile = self.profile.name(),
            count = boundaries.len(),
            "chapter boundaries found"
        );

        let spans = partition(&boundaries, text.len());
        let spans = self.drop_short_chapters(text, spans, &mut stats);
        progress(ProgressEvent::ChaptersFound { count: spans.len() });

        let total = spans.len();
        let mut chapters = Vec::with_capacity(total);
        for (i, span) in spans.iter().enumerate() {
            let number = i + 1;
            let chapter_text = text.slice(span);
            let children = self.segment_chapter(number, &chapter_text, &mut stats);
            let label = resolve_label(
                span.heading.as_deref(),
                chapter_text.as_str(),
                number,
                TitleMode::Condensed,
                "chapter",
            );
            tracing::debug!(chapter = number, label = %label, subchapters = children.len(), "chapter segmented");
            progress(ProgressEvent::ChapterSegmented {
                index: number,
                total,
                subchapters: children.len(),
            });

            stats.subchapters += children.len();
            chapters.push(SectionNode {
                label,
                pages: chapter_text.pages(),
                text: chapter_text.as_str().to_string(),
                children,
            });
        }
        stats.chapters = chapters.len();

        Ok(SegmentedDocument { chapters, stats })
    }

    /// Subchapters of one chapter, matched against the chapter's own
    /// stream. Any failure here falls back to a single subchapter covering
    /// the whole chapter.
    fn segment_chapter(
        &self,
        number: usize,
        chapter: &LinearText,
        stats: &mut SegmentStats,
    ) -> Vec<SectionNode> {
        let spans = match self.profile.subchapter_rule() {
            None => partition(&[], chapter.len()),
            Some(rule) => {
                let matched = panic::catch_unwind(AssertUnwindSafe(|| {
                    match_boundaries(chapter.as_str(), rule)
                }));
                match matched {
                    Ok(Ok(boundaries)) if !boundaries.is_empty() => {
                        partition(&boundaries, chapter.len())
                    }
                    Ok(Ok(_)) => {
                        tracing::info!(chapter = number, "no subchapter headings, keeping chapter whole");
                        stats.degradations.push(Degradation::Subchapter {
                            chapter: number,
                            reason: "no subchapter headings found".into(),
                        });
                        partition(&[], chapter.len())
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(chapter = number, error = %e, "subchapter matching failed, keeping chapter whole");
                        stats.degradations.push(Degradation::Subchapter {
                            chapter: number,
                            reason: e.to_string(),
                        });
                        partition(&[], chapter.len())
                    }
                    Err(payload) => {
                        let reason = panic_message(payload.as_ref());
                        tracing::warn!(chapter = number, reason = %reason, "subchapter rule panicked, keeping chapter whole");
                        stats.degradations.push(Degradation::Subchapter {
                            chapter: number,
                            reason: format!("subchapter rule panicked: {reason}"),
                        });
                        partition(&[], chapter.len())
                    }
                }
            }
        };

        spans
            .iter()
            .map(|span| {
                let body = chapter.span_text(span);
                SectionNode {
                    label: resolve_label(
                        span.heading.as_deref(),
                        body,
                        span.seq,
                        self.options.title_mode,
                        "subchapter",
                    ),
                    text: body.to_string(),
                    pages: chapter.page_range(span.range()),
                    children: Vec::new(),
                }
            })
            .collect()
    }

    fn drop_short_chapters(
        &self,
        text: &LinearText,
        spans: Vec<Span>,
        stats: &mut SegmentStats,
    ) -> Vec<Span> {
        let Some(min_pages) = self.profile.min_chapter_pages() else {
            return spans;
        };

        spans
            .into_iter()
            .filter(|span| {
                let pages = text
                    .page_range(span.range())
                    .map_or(0, |(first, last)| last - first + 1);
                let keep = pages >= min_pages;
                if !keep {
                    tracing::info!(seq = span.seq, pages, min_pages, "dropping short chapter");
                    stats.short_chapters_dropped += 1;
                }
                keep
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
