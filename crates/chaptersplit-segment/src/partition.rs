use chaptersplit_core::{Boundary, Span};

use crate::boundary::normalize;

/// Split a stream of `len` bytes into contiguous spans at `boundaries`.
///
/// Boundaries may arrive unsorted or duplicated; they are normalized
/// first, and offsets at or past `len` are ignored. Text before the first
/// boundary becomes its own leading span. With no usable boundaries the
/// result is a single span covering `[0, len)`, which is also the result
/// for an empty stream.
///
/// The returned spans are gapless and non-overlapping, so concatenating
/// their slices reproduces the stream exactly.
pub fn partition(boundaries: &[Boundary], len: usize) -> Vec<Span> {
    let mut cuts: Vec<Boundary> = boundaries
        .iter()
        .filter(|b| b.offset < len)
        .cloned()
        .collect();
    normalize(&mut cuts);

    let mut spans = Vec::with_capacity(cuts.len() + 1);

    let first = cuts.first().map_or(len, |b| b.offset);
    if first > 0 || cuts.is_empty() {
        spans.push(Span {
            start: 0,
            end: first,
            seq: 1,
            heading: None,
        });
    }

    for (i, cut) in cuts.iter().enumerate() {
        let end = cuts.get(i + 1).map_or(len, |next| next.offset);
        let seq = spans.len() + 1;
        spans.push(Span {
            start: cut.offset,
            end,
            seq,
            heading: cut.heading.clone(),
        });
    }

    spans
}
