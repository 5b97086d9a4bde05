use std::ops::Range;

use chaptersplit_core::{Document, ProgressEvent, SegmentStats, Span};

use crate::extract::{PageTextExtractor, TextSource};

/// Delimiter placed between consecutive pages. Heading patterns anchor on
/// line starts, so a page must never run into the next page's first line.
pub const PAGE_DELIMITER: char = '\n';

/// Page-concatenated text of a document range.
///
/// Keeps the byte offset at which each page's text begins so any offset
/// can be mapped back to the page it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearText {
    text: String,
    first_page: usize,
    page_starts: Vec<usize>,
}

impl LinearText {
    /// Join page texts, the first of which is page `first_page`.
    pub fn from_pages<I, S>(first_page: usize, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        let mut page_starts = Vec::new();
        for (i, page) in pages.into_iter().enumerate() {
            if i > 0 {
                text.push(PAGE_DELIMITER);
            }
            page_starts.push(text.len());
            text.push_str(page.as_ref());
        }
        Self {
            text,
            first_page,
            page_starts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of pages that contributed to the stream.
    pub fn page_count(&self) -> usize {
        self.page_starts.len()
    }

    pub fn first_page(&self) -> usize {
        self.first_page
    }

    /// Inclusive page range covered, or `None` for a stream built from no
    /// pages.
    pub fn pages(&self) -> Option<(usize, usize)> {
        let count = self.page_count();
        (count > 0).then(|| (self.first_page, self.first_page + count - 1))
    }

    /// Page index (document ordinal) containing byte `offset`.
    pub fn page_at(&self, offset: usize) -> Option<usize> {
        if self.page_starts.is_empty() || offset > self.text.len() {
            return None;
        }
        let idx = self
            .page_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Some(self.first_page + idx)
    }

    /// Inclusive page range a byte range draws its text from.
    pub fn page_range(&self, range: Range<usize>) -> Option<(usize, usize)> {
        let first = self.page_at(range.start)?;
        let last = if range.end > range.start {
            self.page_at(range.end - 1)?
        } else {
            first
        };
        Some((first, last))
    }

    pub fn span_text(&self, span: &Span) -> &str {
        &self.text[span.range()]
    }

    /// A new stream holding only `span`'s text, with offsets rebased to 0
    /// and the page map restricted to the pages the span touches.
    pub fn slice(&self, span: &Span) -> LinearText {
        let text = self.text[span.range()].to_string();
        let Some((first, last)) = self.page_range(span.range()) else {
            return LinearText {
                text,
                first_page: self.first_page,
                page_starts: Vec::new(),
            };
        };

        let page_starts = (first..=last)
            .map(|page| {
                let start = self.page_starts[page - self.first_page];
                start.max(span.start) - span.start
            })
            .collect();

        LinearText {
            text,
            first_page: first,
            page_starts,
        }
    }
}

/// Extract and join the text of pages `from..=to`, never including pages
/// before `skip_pages`.
///
/// Page-level failures are absorbed by the extractor and recorded in
/// `stats`; a page that yields nothing still occupies its slot so offsets
/// keep mapping to the right pages.
pub fn linearize(
    doc: &dyn Document,
    extractor: &PageTextExtractor,
    skip_pages: usize,
    from: usize,
    to: usize,
    stats: &mut SegmentStats,
    progress: &dyn Fn(ProgressEvent),
) -> LinearText {
    let page_count = doc.page_count();
    let start = from.max(skip_pages);
    let end = to.min(page_count.saturating_sub(1));

    if page_count == 0 || start > end {
        tracing::warn!(start, end, page_count, "empty page range, nothing to linearize");
        return LinearText::from_pages(start, std::iter::empty::<&str>());
    }

    let total = end - start + 1;
    let mut pages = Vec::with_capacity(total);

    for index in start..=end {
        let page_text = extractor.extract_page(doc, index);
        match page_text.source {
            TextSource::Native => {}
            TextSource::Recognized => stats.ocr_pages += 1,
            TextSource::Empty => stats.empty_pages += 1,
        }
        let ocr = page_text.source == TextSource::Recognized;
        if let Some(d) = page_text.degradation {
            stats.degradations.push(d);
        }
        pages.push(page_text.text);
        progress(ProgressEvent::PageExtracted { index, total, ocr });
    }

    stats.pages_linearized += total;
    tracing::debug!(first = start, last = end, "linearized page range");
    LinearText::from_pages(start, pages)
}
