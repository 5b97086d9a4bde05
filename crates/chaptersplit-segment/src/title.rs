use once_cell::sync::Lazy;
use regex::Regex;

/// Longest label produced, in characters.
pub const MAX_LABEL_CHARS: usize = 120;

/// How a heading is turned into a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleMode {
    /// Machine-safe key: runs of non-word characters become one `_`.
    Condensed,
    /// Human-legible file name: only characters illegal in file names are
    /// removed; spacing is kept.
    #[default]
    Filename,
}

impl std::str::FromStr for TitleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "condensed" => Ok(Self::Condensed),
            "filename" => Ok(Self::Filename),
            other => Err(format!(
                "unknown title mode '{other}' (expected 'condensed' or 'filename')"
            )),
        }
    }
}

/// Normalize a raw heading. The result may be empty.
pub fn normalize_title(raw: &str, mode: TitleMode) -> String {
    match mode {
        TitleMode::Condensed => condense(raw),
        TitleMode::Filename => filename_safe(raw),
    }
}

fn condense(raw: &str) -> String {
    static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").unwrap());

    let replaced = NON_WORD.replace_all(raw.trim(), "_");
    let trimmed = replaced.trim_matches('_');
    truncate(trimmed).trim_end_matches('_').to_string()
}

fn filename_safe(raw: &str) -> String {
    let stripped: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    let is_edge = |c: char| c.is_whitespace() || c == '.';
    let trimmed = stripped.trim_matches(is_edge);
    truncate(trimmed).trim_end_matches(is_edge).to_string()
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(MAX_LABEL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Label for a span: its heading if it has one, else the first non-blank
/// line of its text, normalized per `mode`. Falls back to `{prefix}_{seq}`
/// when nothing usable remains.
pub fn resolve_label(
    heading: Option<&str>,
    text: &str,
    seq: usize,
    mode: TitleMode,
    prefix: &str,
) -> String {
    let source = heading
        .filter(|h| !h.trim().is_empty())
        .or_else(|| text.lines().find(|line| !line.trim().is_empty()))
        .unwrap_or("");

    let label = normalize_title(source, mode);
    if label.is_empty() {
        format!("{prefix}_{seq}")
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condensed_domain_heading() {
        assert_eq!(
            normalize_title("Domain 1: Cloud Computing, Concepts", TitleMode::Condensed),
            "Domain_1_Cloud_Computing_Concepts"
        );
    }

    #[test]
    fn test_condensed_trims_edges() {
        assert_eq!(
            normalize_title("  --Intro!!  ", TitleMode::Condensed),
            "Intro"
        );
    }

    #[test]
    fn test_condensed_idempotent() {
        let long = "long heading ".repeat(30);
        let samples = [
            "Domain 1: Cloud Computing, Concepts",
            "a_ b",
            "__x__",
            "Ünïcode — naïve: café",
            "   ",
            "1.2.3 (Appendix) / notes?",
            long.as_str(),
        ];
        for s in samples {
            let once = normalize_title(s, TitleMode::Condensed);
            let twice = normalize_title(&once, TitleMode::Condensed);
            assert_eq!(once, twice, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_filename_keeps_spacing() {
        assert_eq!(
            normalize_title("Domain 2: Governance & Risk / Audit?", TitleMode::Filename),
            "Domain 2 Governance & Risk  Audit"
        );
    }

    #[test]
    fn test_filename_strips_dots_and_controls() {
        assert_eq!(normalize_title("..\t", TitleMode::Filename), "");
        assert_eq!(normalize_title("Part\u{7}1.", TitleMode::Filename), "Part1");
    }

    #[test]
    fn test_filename_idempotent() {
        let long = "word ".repeat(40);
        for s in ["a: b", " .hidden. ", "x|y|z", long.as_str()] {
            let once = normalize_title(s, TitleMode::Filename);
            assert_eq!(normalize_title(&once, TitleMode::Filename), once);
        }
    }

    #[test]
    fn test_labels_capped() {
        let long = "x".repeat(500);
        assert_eq!(
            normalize_title(&long, TitleMode::Condensed).chars().count(),
            MAX_LABEL_CHARS
        );
        assert_eq!(
            normalize_title(&long, TitleMode::Filename).chars().count(),
            MAX_LABEL_CHARS
        );
    }

    #[test]
    fn test_resolve_prefers_heading() {
        let label = resolve_label(
            Some("Domain 3: Security"),
            "Domain 3: Security\nbody",
            3,
            TitleMode::Condensed,
            "chapter",
        );
        assert_eq!(label, "Domain_3_Security");
    }

    #[test]
    fn test_resolve_first_non_blank_line() {
        let label = resolve_label(
            None,
            "\n   \npreamble text\nmore",
            1,
            TitleMode::Filename,
            "subchapter",
        );
        assert_eq!(label, "preamble text");
    }

    #[test]
    fn test_resolve_positional_fallback() {
        assert_eq!(
            resolve_label(Some("???"), "", 4, TitleMode::Condensed, "subchapter"),
            "subchapter_4"
        );
        assert_eq!(
            resolve_label(None, "  \n", 2, TitleMode::Filename, "subchapter"),
            "subchapter_2"
        );
    }

    #[test]
    fn test_title_mode_from_str() {
        assert_eq!("Condensed".parse::<TitleMode>(), Ok(TitleMode::Condensed));
        assert_eq!("filename".parse::<TitleMode>(), Ok(TitleMode::Filename));
        assert!("other".parse::<TitleMode>().is_err());
    }
}
