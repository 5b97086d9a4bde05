use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use chaptersplit_core::config_file::{ConfigFile, PatternConfig, ProfileConfig};

use crate::SplitError;
use crate::boundary::{BoundaryRule, HeadingPattern};

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("profile '{profile}': missing required field '{field}'")]
    MissingField {
        profile: String,
        field: &'static str,
    },
    #[error("profile '{profile}': invalid {level} pattern: {source}")]
    InvalidPattern {
        profile: String,
        level: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("profile '{profile}': footer margin must be a finite non-negative number, got {margin}")]
    InvalidMargin { profile: String, margin: f32 },
}

/// Segmentation rules for one document family. Immutable once built.
#[derive(Debug, Clone)]
pub struct DocumentProfile {
    name: String,
    skip_pages: usize,
    chapter_rule: Arc<dyn BoundaryRule>,
    subchapter_rule: Option<Arc<dyn BoundaryRule>>,
    footer_margin: f32,
    min_chapter_pages: Option<usize>,
}

impl DocumentProfile {
    pub fn builder(name: &str) -> ProfileBuilder {
        ProfileBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leading pages (cover, table of contents) excluded from segmentation.
    pub fn skip_pages(&self) -> usize {
        self.skip_pages
    }

    pub fn chapter_rule(&self) -> &dyn BoundaryRule {
        self.chapter_rule.as_ref()
    }

    /// `None` means the profile has no subchapter level.
    pub fn subchapter_rule(&self) -> Option<&dyn BoundaryRule> {
        self.subchapter_rule.as_deref()
    }

    /// Height of the band at the bottom of each page excluded from text
    /// extraction, in page units.
    pub fn footer_margin(&self) -> f32 {
        self.footer_margin
    }

    /// Chapters spanning fewer pages than this are dropped. `None` keeps
    /// every chapter.
    pub fn min_chapter_pages(&self) -> Option<usize> {
        self.min_chapter_pages
    }
}

/// Builder for [`DocumentProfile`].
///
/// Accepts string patterns that are compiled in [`build()`](Self::build),
/// or ready-made [`BoundaryRule`]s. Fails fast if a pattern is invalid.
#[derive(Debug, Clone)]
pub struct ProfileBuilder {
    name: String,
    skip_pages: usize,
    chapter: Option<RuleSpec>,
    subchapter: Option<RuleSpec>,
    footer_margin: f32,
    min_chapter_pages: Option<usize>,
}

#[derive(Debug, Clone)]
enum RuleSpec {
    Pattern { pattern: String, case_insensitive: bool },
    Rule(Arc<dyn BoundaryRule>),
}

impl RuleSpec {
    fn compile(
        self,
        profile: &str,
        level: &'static str,
    ) -> Result<Arc<dyn BoundaryRule>, ProfileError> {
        match self {
            RuleSpec::Pattern {
                pattern,
                case_insensitive,
            } => HeadingPattern::new(&pattern, case_insensitive)
                .map(|p| Arc::new(p) as Arc<dyn BoundaryRule>)
                .map_err(|source| ProfileError::InvalidPattern {
                    profile: profile.to_string(),
                    level,
                    source,
                }),
            RuleSpec::Rule(rule) => Ok(rule),
        }
    }
}

impl ProfileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skip_pages: 0,
            chapter: None,
            subchapter: None,
            footer_margin: 0.0,
            min_chapter_pages: None,
        }
    }

    pub fn skip_pages(mut self, pages: usize) -> Self {
        self.skip_pages = pages;
        self
    }

    pub fn chapter_regex(mut self, pattern: &str, case_insensitive: bool) -> Self {
        self.chapter = Some(RuleSpec::Pattern {
            pattern: pattern.to_string(),
            case_insensitive,
        });
        self
    }

    pub fn subchapter_regex(mut self, pattern: &str, case_insensitive: bool) -> Self {
        self.subchapter = Some(RuleSpec::Pattern {
            pattern: pattern.to_string(),
            case_insensitive,
        });
        self
    }

    pub fn chapter_rule(mut self, rule: Arc<dyn BoundaryRule>) -> Self {
        self.chapter = Some(RuleSpec::Rule(rule));
        self
    }

    pub fn subchapter_rule(mut self, rule: Arc<dyn BoundaryRule>) -> Self {
        self.subchapter = Some(RuleSpec::Rule(rule));
        self
    }

    pub fn footer_margin(mut self, margin: f32) -> Self {
        self.footer_margin = margin;
        self
    }

    pub fn min_chapter_pages(mut self, pages: usize) -> Self {
        self.min_chapter_pages = Some(pages);
        self
    }

    pub fn build(self) -> Result<DocumentProfile, ProfileError> {
        if !self.footer_margin.is_finite() || self.footer_margin < 0.0 {
            return Err(ProfileError::InvalidMargin {
                profile: self.name,
                margin: self.footer_margin,
            });
        }

        let chapter = self.chapter.ok_or_else(|| ProfileError::MissingField {
            profile: self.name.clone(),
            field: "chapter_pattern",
        })?;
        let chapter_rule = chapter.compile(&self.name, "chapter")?;
        let subchapter_rule = self
            .subchapter
            .map(|s| s.compile(&self.name, "subchapter"))
            .transpose()?;

        Ok(DocumentProfile {
            name: self.name,
            skip_pages: self.skip_pages,
            chapter_rule,
            subchapter_rule,
            footer_margin: self.footer_margin,
            min_chapter_pages: self.min_chapter_pages,
        })
    }

    /// Builder pre-filled from a config-file profile entry.
    pub fn from_config(name: &str, config: &ProfileConfig) -> Result<Self, ProfileError> {
        let skip_pages = config.skip_pages.ok_or_else(|| ProfileError::MissingField {
            profile: name.to_string(),
            field: "skip_pages",
        })?;
        let chapter: &PatternConfig =
            config
                .chapter_pattern
                .as_ref()
                .ok_or_else(|| ProfileError::MissingField {
                    profile: name.to_string(),
                    field: "chapter_pattern",
                })?;

        let mut builder = Self::new(name)
            .skip_pages(skip_pages)
            .chapter_regex(&chapter.pattern, chapter.case_insensitive)
            .footer_margin(config.footer_margin.unwrap_or(0.0));
        if let Some(sub) = &config.subchapter_pattern {
            builder = builder.subchapter_regex(&sub.pattern, sub.case_insensitive);
        }
        if let Some(min) = config.min_chapter_pages {
            builder = builder.min_chapter_pages(min);
        }
        Ok(builder)
    }
}

/// Key of the profile used when the caller names none.
pub const DEFAULT_PROFILE: &str = "ccsk";

/// Profiles shipped with the tool.
fn builtin_profiles() -> Vec<ProfileBuilder> {
    vec![
        // Study guides whose parts open with "Domain N: Title".
        ProfileBuilder::new("ccsk").chapter_regex(r"^[ \t]*Domain[ \t]+\d+:.*", true),
        // Books with "Chapter N" headings and "N.M Title" sections.
        ProfileBuilder::new("book")
            .chapter_regex(r"^[ \t]*Chapter[ \t]+\d+\b.*", true)
            .subchapter_regex(r"^[ \t]*\d+\.\d+[ \t]+(?P<title>\S.*)", false),
    ]
}

/// Read-only table of document profiles, built once at startup.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Arc<DocumentProfile>>,
}

impl ProfileRegistry {
    /// Registry holding only the built-in profiles.
    pub fn builtin() -> Result<Self, ProfileError> {
        let profiles = builtin_profiles()
            .into_iter()
            .map(ProfileBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_profiles(profiles))
    }

    /// Built-in profiles overlaid with those from `config`. A config
    /// profile replaces a built-in one with the same key.
    pub fn from_config(config: &ConfigFile) -> Result<Self, ProfileError> {
        let mut registry = Self::builtin()?;
        if let Some(entries) = &config.profiles {
            for (name, entry) in entries {
                let profile = ProfileBuilder::from_config(name, entry)?.build()?;
                tracing::debug!(profile = name, "loaded profile from config");
                registry
                    .profiles
                    .insert(name.clone(), Arc::new(profile));
            }
        }
        Ok(registry)
    }

    /// Registry of exactly `profiles`, keyed by name.
    pub fn from_profiles(profiles: impl IntoIterator<Item = DocumentProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.name().to_string(), Arc::new(p)))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DocumentProfile> {
        self.profiles.get(key).map(|p| p.as_ref())
    }

    /// Look up `key`, failing with [`SplitError::ProfileNotFound`].
    pub fn resolve(&self, key: &str) -> Result<&DocumentProfile, SplitError> {
        self.get(key).ok_or_else(|| SplitError::ProfileNotFound {
            key: key.to_string(),
            known: self.keys().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::match_boundaries;

    #[test]
    fn test_builtin_ccsk_matches_domains() {
        let registry = ProfileRegistry::builtin().unwrap();
        let profile = registry.resolve("ccsk").unwrap();
        let text = "Contents\n  DOMAIN 1: Cloud Concepts\nx\nDomain 2: Governance\ny";
        let found = match_boundaries(text, profile.chapter_rule()).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].offset, 9);
        assert!(profile.subchapter_rule().is_none());
        assert_eq!(profile.footer_margin(), 0.0);
        assert_eq!(profile.min_chapter_pages(), None);
    }

    #[test]
    fn test_builtin_book_subchapter_title_group() {
        let registry = ProfileRegistry::builtin().unwrap();
        let profile = registry.get("book").unwrap();
        let rule = profile.subchapter_rule().unwrap();
        let found = match_boundaries("1.1 Getting Started\nabc\n1.2 Next\n", rule).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].heading.as_deref(), Some("Getting Started"));
    }

    #[test]
    fn test_unknown_profile_lists_known() {
        let registry = ProfileRegistry::builtin().unwrap();
        let err = registry.resolve("nope").unwrap_err();
        match err {
            SplitError::ProfileNotFound { key, known } => {
                assert_eq!(key, "nope");
                assert!(known.contains("ccsk"));
                assert!(known.contains("book"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = ProfileBuilder::new("bad")
            .chapter_regex(r"^(unclosed", false)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ProfileError::InvalidPattern {
                level: "chapter",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_chapter_pattern() {
        let err = ProfileBuilder::new("empty").build().unwrap_err();
        assert!(matches!(
            err,
            ProfileError::MissingField {
                field: "chapter_pattern",
                ..
            }
        ));
    }

    #[test]
    fn test_negative_margin_rejected() {
        let err = ProfileBuilder::new("m")
            .chapter_regex("^A", false)
            .footer_margin(-5.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ProfileError::InvalidMargin { .. }));
    }

    #[test]
    fn test_config_profile_requires_skip_pages() {
        let entry = ProfileConfig {
            chapter_pattern: Some(PatternConfig {
                pattern: "^Part".into(),
                case_insensitive: false,
            }),
            ..Default::default()
        };
        let err = ProfileBuilder::from_config("parts", &entry).unwrap_err();
        assert!(matches!(
            err,
            ProfileError::MissingField {
                field: "skip_pages",
                ..
            }
        ));
    }

    #[test]
    fn test_config_profiles_overlay_builtins() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "ccsk".to_string(),
            ProfileConfig {
                skip_pages: Some(4),
                chapter_pattern: Some(PatternConfig {
                    pattern: r"^Module \d+".into(),
                    case_insensitive: false,
                }),
                subchapter_pattern: Some(PatternConfig {
                    pattern: r"^\d+\.\d+ .*".into(),
                    case_insensitive: false,
                }),
                footer_margin: Some(36.0),
                min_chapter_pages: Some(2),
            },
        );
        let config = ConfigFile {
            profiles: Some(entries),
            ..Default::default()
        };

        let registry = ProfileRegistry::from_config(&config).unwrap();
        let profile = registry.resolve("ccsk").unwrap();
        assert_eq!(profile.skip_pages(), 4);
        assert_eq!(profile.footer_margin(), 36.0);
        assert_eq!(profile.min_chapter_pages(), Some(2));
        assert!(profile.subchapter_rule().is_some());
        assert!(registry.get("book").is_some());
    }
}
