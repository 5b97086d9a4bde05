use std::fmt;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use chaptersplit_core::Boundary;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("boundary rule {rule} failed: {message}")]
    Rule { rule: String, message: String },
}

/// A profile-supplied predicate that locates section headings in a stream.
///
/// Heading heuristics are document-family policy; the engine only relies on
/// the offsets a rule reports. Results need not be sorted or unique.
pub trait BoundaryRule: Send + Sync + fmt::Debug {
    fn find_boundaries(&self, text: &str) -> Result<Vec<Boundary>, BoundaryError>;
}

/// Regex heading rule. `^` and `$` always anchor on line boundaries.
///
/// The heading recorded for titling is the `title` capture group when the
/// pattern has one, otherwise capture group 1, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct HeadingPattern {
    regex: Regex,
    case_insensitive: bool,
}

impl HeadingPattern {
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern)
            .multi_line(true)
            .case_insensitive(case_insensitive)
            .build()?;
        Ok(Self {
            regex,
            case_insensitive,
        })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn heading_group(&self) -> Option<usize> {
        self.regex
            .capture_names()
            .position(|name| name == Some("title"))
            .or_else(|| (self.regex.captures_len() > 1).then_some(1))
    }
}

impl BoundaryRule for HeadingPattern {
    fn find_boundaries(&self, text: &str) -> Result<Vec<Boundary>, BoundaryError> {
        let group = self.heading_group();
        let mut boundaries = Vec::new();

        for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let heading = group
                .and_then(|g| caps.get(g))
                .unwrap_or(whole)
                .as_str();
            boundaries.push(Boundary::new(whole.start(), heading));
        }

        Ok(boundaries)
    }
}

/// Run `rule` over `text` and return its boundaries sorted by offset with
/// duplicate offsets collapsed (the first reported heading wins).
///
/// Offsets at or past the end of `text` or inside a UTF-8 sequence are
/// dropped; a heading there would start an empty span.
pub fn match_boundaries(
    text: &str,
    rule: &dyn BoundaryRule,
) -> Result<Vec<Boundary>, BoundaryError> {
    let mut boundaries = rule.find_boundaries(text)?;
    boundaries.retain(|b| {
        let valid = b.offset < text.len() && text.is_char_boundary(b.offset);
        if !valid {
            tracing::debug!(offset = b.offset, rule = ?rule, "dropping out-of-range boundary");
        }
        valid
    });
    normalize(&mut boundaries);
    Ok(boundaries)
}

/// Sort by offset and collapse duplicate offsets.
pub(crate) fn normalize(boundaries: &mut Vec<Boundary>) {
    boundaries.sort_by_key(|b| b.offset);
    boundaries.dedup_by_key(|b| b.offset);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Fixed(Vec<usize>);

    impl BoundaryRule for Fixed {
        fn find_boundaries(&self, _text: &str) -> Result<Vec<Boundary>, BoundaryError> {
            Ok(self.0.iter().map(|&o| Boundary::at(o)).collect())
        }
    }

    #[test]
    fn test_domain_headings_multiline() {
        let rule = HeadingPattern::new(r"^Domain \d+:.*", false).unwrap();
        let text = "Domain 1: Intro\nhello\nDomain 2: Setup\nworld";
        let found = match_boundaries(text, &rule).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].offset, 0);
        assert_eq!(found[0].heading.as_deref(), Some("Domain 1: Intro"));
        assert_eq!(found[1].offset, 22);
        assert_eq!(found[1].heading.as_deref(), Some("Domain 2: Setup"));
    }

    #[test]
    fn test_anchor_requires_line_start() {
        let rule = HeadingPattern::new(r"^Domain \d+:.*", false).unwrap();
        let text = "see Domain 3: later\nDomain 4: Real";
        let found = match_boundaries(text, &rule).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].heading.as_deref(), Some("Domain 4: Real"));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let text = "DOMAIN 1: Loud\nbody";
        let strict = HeadingPattern::new(r"^Domain \d+:.*", false).unwrap();
        let relaxed = HeadingPattern::new(r"^Domain \d+:.*", true).unwrap();
        assert!(match_boundaries(text, &strict).unwrap().is_empty());
        assert_eq!(match_boundaries(text, &relaxed).unwrap().len(), 1);
        assert!(relaxed.is_case_insensitive());
    }

    #[test]
    fn test_named_title_group_preferred() {
        let rule = HeadingPattern::new(r"^(\d+)\.\s+(?P<title>.+)", false).unwrap();
        let found = match_boundaries("1. Scope\ntext\n2. Terms\n", &rule).unwrap();
        assert_eq!(found[0].heading.as_deref(), Some("Scope"));
        assert_eq!(found[1].heading.as_deref(), Some("Terms"));
    }

    #[test]
    fn test_first_group_used_without_named_group() {
        let rule = HeadingPattern::new(r"^Chapter \d+: (.+)", false).unwrap();
        let found = match_boundaries("Chapter 1: Basics\n", &rule).unwrap();
        assert_eq!(found[0].heading.as_deref(), Some("Basics"));
    }

    #[test]
    fn test_no_matches_is_empty_not_error() {
        let rule = HeadingPattern::new(r"^Appendix", false).unwrap();
        assert!(match_boundaries("nothing here", &rule).unwrap().is_empty());
    }

    #[test]
    fn test_duplicates_collapse_and_sort() {
        let rule = Fixed(vec![9, 3, 9, 0, 3]);
        let found = match_boundaries("0123456789abc", &rule).unwrap();
        let offsets: Vec<_> = found.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![0, 3, 9]);
    }

    #[test]
    fn test_invalid_offsets_dropped() {
        // 'é' occupies bytes 1..3, so offset 2 is inside a code point.
        let rule = Fixed(vec![2, 4, 50]);
        let found = match_boundaries("héllo", &rule).unwrap();
        let offsets: Vec<_> = found.iter().map(|b| b.offset).collect();
        assert_eq!(offsets, vec![4]);
    }

    #[test]
    fn test_empty_match_at_end_of_text_dropped() {
        let rule = HeadingPattern::new(r"^(?:Domain \d+:.*)?\z", false).unwrap();
        let found = match_boundaries("no headings at all\njust prose\n", &rule).unwrap();
        assert!(found.is_empty());

        let at_end = Fixed(vec![0, 5]);
        let offsets: Vec<_> = match_boundaries("hello", &at_end)
            .unwrap()
            .iter()
            .map(|b| b.offset)
            .collect();
        assert_eq!(offsets, vec![0]);
    }
}
