use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chaptersplit_core::{Degradation, Document, SectionNode, SegmentStats};
use owo_colors::OwoColorize;

/// Name of the whole-chapter text file inside each chapter directory.
const CHAPTER_FILE: &str = "chapter";

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Files produced by [`write_sections`].
#[derive(Debug, Default)]
pub struct WriteSummary {
    pub text_files: usize,
    pub pdf_files: usize,
    pub export_failures: usize,
}

/// Directory for chapter `index` (1-based): `{root}/{base_name}/chapter_{index}`.
pub fn chapter_dir(root: &Path, base_name: &str, index: usize) -> PathBuf {
    root.join(base_name).join(format!("chapter_{index}"))
}

/// Write every chapter and subchapter under `root`.
///
/// Each chapter directory gets `chapter.txt` with the whole chapter and one
/// `.txt` per subchapter named after its label. A label already used in the
/// same directory, ignoring case, falls back to `subchapter_{n}`. With `export` set, the
/// chapter's page range is also saved as `{label}.pdf`; export failures are
/// logged and counted, not fatal.
pub fn write_sections(
    root: &Path,
    base_name: &str,
    chapters: &[SectionNode],
    export: Option<&dyn Document>,
) -> std::io::Result<WriteSummary> {
    let mut summary = WriteSummary::default();

    for (i, chapter) in chapters.iter().enumerate() {
        let dir = chapter_dir(root, base_name, i + 1);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(
            dir.join(format!("{CHAPTER_FILE}.txt")),
            chapter.text.trim(),
        )?;
        summary.text_files += 1;

        let mut used: HashSet<String> = HashSet::from([CHAPTER_FILE.to_string()]);
        for (j, sub) in chapter.children.iter().enumerate() {
            // Case-insensitive filesystems treat "Intro" and "INTRO" as one file.
            let name = if used.contains(&sub.label.to_lowercase()) {
                format!("subchapter_{}", j + 1)
            } else {
                sub.label.clone()
            };
            used.insert(name.to_lowercase());
            std::fs::write(dir.join(format!("{name}.txt")), sub.text.trim())?;
            summary.text_files += 1;
        }

        if let (Some(doc), Some((from, to))) = (export, chapter.pages) {
            let dest = dir.join(format!("{}.pdf", chapter.label));
            match doc.export_range(from, to, &dest) {
                Ok(()) => summary.pdf_files += 1,
                Err(e) => {
                    tracing::warn!(chapter = i + 1, error = %e, "chapter PDF export failed");
                    summary.export_failures += 1;
                }
            }
        }

        tracing::debug!(chapter = i + 1, dir = %dir.display(), "chapter written");
    }

    Ok(summary)
}

/// Print the section tree (used by `--dry-run`).
pub fn print_tree(
    w: &mut dyn Write,
    chapters: &[SectionNode],
    color: ColorMode,
) -> std::io::Result<()> {
    for (i, chapter) in chapters.iter().enumerate() {
        let pages = match chapter.pages {
            Some((from, to)) if from == to => format!("p. {}", from + 1),
            Some((from, to)) => format!("pp. {}-{}", from + 1, to + 1),
            None => "no pages".to_string(),
        };
        let heading = format!("chapter_{} {}", i + 1, chapter.label);
        if color.enabled() {
            writeln!(w, "{} {}", heading.bold(), format!("({pages})").dimmed())?;
        } else {
            writeln!(w, "{heading} ({pages})")?;
        }
        for sub in &chapter.children {
            writeln!(w, "    {} [{} chars]", sub.label, sub.text.trim().len())?;
        }
    }
    Ok(())
}

/// Print the end-of-run summary.
pub fn print_summary(
    w: &mut dyn Write,
    stats: &SegmentStats,
    written: Option<&WriteSummary>,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w)?;
    writeln!(
        w,
        "{} chapters, {} subchapters from {} pages",
        stats.chapters, stats.subchapters, stats.pages_linearized
    )?;
    if stats.ocr_pages > 0 || stats.empty_pages > 0 {
        let line = format!(
            "({} pages recovered by OCR, {} pages without text)",
            stats.ocr_pages, stats.empty_pages
        );
        if color.enabled() {
            writeln!(w, "{}", line.dimmed())?;
        } else {
            writeln!(w, "{line}")?;
        }
    }
    if stats.short_chapters_dropped > 0 {
        writeln!(
            w,
            "Dropped {} chapters below the minimum page count",
            stats.short_chapters_dropped
        )?;
    }

    for degradation in &stats.degradations {
        let Degradation::Subchapter { chapter, reason } = degradation else {
            continue;
        };
        let line = format!("Chapter {chapter} kept whole: {reason}");
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{line}")?;
        }
    }

    if let Some(written) = written {
        let line = format!(
            "Wrote {} text files and {} PDFs",
            written.text_files, written.pdf_files
        );
        if color.enabled() {
            writeln!(w, "{}", line.green())?;
        } else {
            writeln!(w, "{line}")?;
        }
        if written.export_failures > 0 {
            writeln!(w, "{} chapter PDF exports failed", written.export_failures)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use chaptersplit_core::{BackendError, ClipRect, PageRef};

    fn chapter(label: &str, text: &str, pages: (usize, usize), subs: &[(&str, &str)]) -> SectionNode {
        SectionNode {
            label: label.into(),
            text: text.into(),
            pages: Some(pages),
            children: subs
                .iter()
                .map(|(l, t)| SectionNode::leaf(*l, *t))
                .collect(),
        }
    }

    /// Document stub that only records export requests.
    #[derive(Default)]
    struct Exported {
        ranges: RefCell<Vec<(usize, usize, PathBuf)>>,
        fail: bool,
    }

    impl Document for Exported {
        fn page_count(&self) -> usize {
            10
        }

        fn page(&self, index: usize) -> Result<PageRef, BackendError> {
            Ok(PageRef {
                index,
                width: 1.0,
                height: 1.0,
            })
        }

        fn extract_text(
            &self,
            _page: &PageRef,
            _clip: Option<ClipRect>,
        ) -> Result<String, BackendError> {
            Ok(String::new())
        }

        fn rasterize(&self, _page: &PageRef) -> Result<image::DynamicImage, BackendError> {
            Err(BackendError::RasterError("not supported".into()))
        }

        fn export_range(&self, from: usize, to: usize, dest: &Path) -> Result<(), BackendError> {
            if self.fail {
                return Err(BackendError::ExportError("disk full".into()));
            }
            self.ranges.borrow_mut().push((from, to, dest.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn test_layout_and_trimmed_contents() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![
            chapter(
                "Domain_1_Intro",
                "Domain 1: Intro\nhello\n",
                (0, 0),
                &[("Domain 1 Intro", "Domain 1: Intro\nhello\n")],
            ),
            chapter(
                "Domain_2_Setup",
                "Domain 2: Setup\nworld",
                (1, 2),
                &[("Setup", "  Domain 2: Setup\n"), ("Details", "world\n\n")],
            ),
        ];

        let summary = write_sections(dir.path(), "guide", &chapters, None).unwrap();
        assert_eq!(summary.text_files, 5);
        assert_eq!(summary.pdf_files, 0);

        let first = chapter_dir(dir.path(), "guide", 1);
        assert_eq!(
            std::fs::read_to_string(first.join("chapter.txt")).unwrap(),
            "Domain 1: Intro\nhello"
        );
        assert_eq!(
            std::fs::read_to_string(first.join("Domain 1 Intro.txt")).unwrap(),
            "Domain 1: Intro\nhello"
        );

        let second = chapter_dir(dir.path(), "guide", 2);
        assert_eq!(
            std::fs::read_to_string(second.join("Setup.txt")).unwrap(),
            "Domain 2: Setup"
        );
        assert_eq!(
            std::fs::read_to_string(second.join("Details.txt")).unwrap(),
            "world"
        );
    }

    #[test]
    fn test_duplicate_labels_fall_back_to_position() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![chapter(
            "Part_1",
            "x",
            (0, 0),
            &[("Overview", "a"), ("Overview", "b"), ("chapter", "c")],
        )];
        write_sections(dir.path(), "book", &chapters, None).unwrap();

        let d = chapter_dir(dir.path(), "book", 1);
        assert_eq!(std::fs::read_to_string(d.join("Overview.txt")).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(d.join("subchapter_2.txt")).unwrap(), "b");
        assert_eq!(std::fs::read_to_string(d.join("subchapter_3.txt")).unwrap(), "c");
        assert_eq!(std::fs::read_to_string(d.join("chapter.txt")).unwrap(), "x");
    }

    #[test]
    fn test_pdf_export_uses_chapter_pages() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![
            chapter("Domain_1", "a", (3, 5), &[("s", "a")]),
            chapter("Domain_2", "b", (6, 9), &[("s", "b")]),
        ];
        let doc = Exported::default();
        let summary = write_sections(dir.path(), "g", &chapters, Some(&doc as &dyn Document)).unwrap();
        assert_eq!(summary.pdf_files, 2);

        let ranges = doc.ranges.borrow();
        assert_eq!(ranges[0].0, 3);
        assert_eq!(ranges[0].1, 5);
        assert!(ranges[1].2.ends_with("chapter_2/Domain_2.pdf"));
    }

    #[test]
    fn test_pdf_export_failure_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![chapter("Domain_1", "a", (0, 1), &[("s", "a")])];
        let doc = Exported {
            fail: true,
            ..Default::default()
        };
        let summary = write_sections(dir.path(), "g", &chapters, Some(&doc as &dyn Document)).unwrap();
        assert_eq!(summary.export_failures, 1);
        assert_eq!(summary.text_files, 2);
    }

    #[test]
    fn test_print_tree_plain() {
        let chapters = vec![chapter("Domain_1", "abc", (0, 2), &[("Intro", " abc ")])];
        let mut out = Vec::new();
        print_tree(&mut out, &chapters, ColorMode(false)).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out, "chapter_1 Domain_1 (pp. 1-3)\n    Intro [3 chars]\n");
    }

    #[test]
    fn test_duplicate_labels_ignore_case() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = vec![chapter(
            "Part_1",
            "x",
            (0, 0),
            &[("Intro", "a"), ("INTRO", "b"), ("Chapter", "c")],
        )];
        write_sections(dir.path(), "book", &chapters, None).unwrap();

        let d = chapter_dir(dir.path(), "book", 1);
        assert_eq!(std::fs::read_to_string(d.join("Intro.txt")).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(d.join("subchapter_2.txt")).unwrap(), "b");
        assert_eq!(std::fs::read_to_string(d.join("subchapter_3.txt")).unwrap(), "c");
        assert_eq!(std::fs::read_to_string(d.join("chapter.txt")).unwrap(), "x");
    }

    #[test]
    fn test_summary_names_degradation_reason() {
        let stats = SegmentStats {
            chapters: 2,
            subchapters: 3,
            pages_linearized: 4,
            degradations: vec![
                Degradation::Subchapter {
                    chapter: 1,
                    reason: "no subchapter headings found".into(),
                },
                Degradation::Subchapter {
                    chapter: 2,
                    reason: "subchapter rule panicked: boom".into(),
                },
            ],
            ..Default::default()
        };
        let mut out = Vec::new();
        print_summary(&mut out, &stats, None, ColorMode(false)).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Chapter 1 kept whole: no subchapter headings found\n"));
        assert!(out.contains("Chapter 2 kept whole: subchapter rule panicked: boom\n"));
        assert!(!out.contains("no subchapters found"));
    }
}
