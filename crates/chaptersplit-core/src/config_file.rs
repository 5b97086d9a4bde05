use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
///
/// ```toml
/// [profiles.ccsk]
/// skip_pages = 4
/// footer_margin = 36.0
/// chapter_pattern = { pattern = '^\s*Domain\s+\d+:.*', case_insensitive = true }
/// subchapter_pattern = { pattern = '^\d+\.\d+\s+\S.*' }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub profiles: Option<BTreeMap<String, ProfileConfig>>,
    pub ocr: Option<OcrConfig>,
    pub output: Option<OutputConfig>,
}

/// One document family as written in a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub skip_pages: Option<usize>,
    pub chapter_pattern: Option<PatternConfig>,
    pub subchapter_pattern: Option<PatternConfig>,
    pub footer_margin: Option<f32>,
    pub min_chapter_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    pub pattern: String,
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    pub enabled: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub language: Option<String>,
    /// Rasterization resolution for pages sent to recognition.
    pub render_dpi: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: Option<String>,
    pub export_pdf: Option<bool>,
    /// `"filename"` or `"condensed"`.
    pub title_mode: Option<String>,
}

/// Platform config directory path: `<config_dir>/chaptersplit/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("chaptersplit").join("config.toml"))
}

/// Load config by cascading CWD `.chaptersplit.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".chaptersplit.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
///
/// Profiles merge by key; a profile present in both is taken whole from
/// `overlay`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let profiles = match (base.profiles, overlay.profiles) {
        (None, None) => None,
        (Some(b), None) => Some(b),
        (None, Some(o)) => Some(o),
        (Some(mut b), Some(o)) => {
            b.extend(o);
            Some(b)
        }
    };

    ConfigFile {
        profiles,
        ocr: Some(OcrConfig {
            enabled: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.enabled)
                .or_else(|| base.ocr.as_ref().and_then(|o| o.enabled)),
            timeout_secs: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.timeout_secs)
                .or_else(|| base.ocr.as_ref().and_then(|o| o.timeout_secs)),
            language: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.language.clone())
                .or_else(|| base.ocr.as_ref().and_then(|o| o.language.clone())),
            render_dpi: overlay
                .ocr
                .as_ref()
                .and_then(|o| o.render_dpi)
                .or_else(|| base.ocr.as_ref().and_then(|o| o.render_dpi)),
        }),
        output: Some(OutputConfig {
            dir: overlay
                .output
                .as_ref()
                .and_then(|o| o.dir.clone())
                .or_else(|| base.output.as_ref().and_then(|o| o.dir.clone())),
            export_pdf: overlay
                .output
                .as_ref()
                .and_then(|o| o.export_pdf)
                .or_else(|| base.output.as_ref().and_then(|o| o.export_pdf)),
            title_mode: overlay
                .output
                .as_ref()
                .and_then(|o| o.title_mode.clone())
                .or_else(|| base.output.as_ref().and_then(|o| o.title_mode.clone())),
        }),
    }
}
