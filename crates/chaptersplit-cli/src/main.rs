use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use chaptersplit_core::config_file::{self, ConfigFile};
use chaptersplit_core::{Document, ProgressEvent, Recognizer};
use chaptersplit_pdf_mupdf::MupdfBackend;
use chaptersplit_segment::{
    DEFAULT_PROFILE, ProfileRegistry, SegmentOptions, Segmenter, TitleMode, open_document,
};

mod output;

use output::ColorMode;

/// Chapter splitter - Split PDFs into chapter and subchapter text files by heading patterns
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a PDF into chapter directories and subchapter files
    Split {
        /// Path to the PDF to split
        file_path: PathBuf,

        /// Document profile selecting the heading patterns
        #[arg(short, long)]
        profile: Option<String>,

        /// Output root directory (default: Output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Extra TOML config file, applied over the platform and local configs
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also save each chapter's pages as a PDF
        #[arg(long)]
        export_pdf: bool,

        /// Disable the OCR fallback for pages without text
        #[arg(long)]
        no_ocr: bool,

        /// Per-page OCR timeout in seconds
        #[arg(long)]
        ocr_timeout: Option<u64>,

        /// Subchapter file naming: "filename" or "condensed"
        #[arg(long)]
        title_mode: Option<TitleMode>,

        /// Print the section tree without writing files
        #[arg(long)]
        dry_run: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// List the available document profiles
    Profiles {
        /// Extra TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Profiles { config } => list_profiles(config.as_deref()),
        Command::Split {
            file_path,
            profile,
            output,
            config,
            export_pdf,
            no_ocr,
            ocr_timeout,
            title_mode,
            dry_run,
            no_color,
        } => split(SplitArgs {
            file_path,
            profile,
            output,
            config,
            export_pdf,
            no_ocr,
            ocr_timeout,
            title_mode,
            dry_run,
            no_color,
        }),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

struct SplitArgs {
    file_path: PathBuf,
    profile: Option<String>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    export_pdf: bool,
    no_ocr: bool,
    ocr_timeout: Option<u64>,
    title_mode: Option<TitleMode>,
    dry_run: bool,
    no_color: bool,
}

/// Platform and CWD configs, with `explicit` applied on top.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let cascaded = config_file::load_config();
    match explicit {
        None => Ok(cascaded),
        Some(path) => {
            let Some(extra) = config_file::load_from_path(path) else {
                anyhow::bail!("Cannot read config file {}", path.display());
            };
            Ok(config_file::merge(cascaded, extra))
        }
    }
}

fn list_profiles(config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let registry = ProfileRegistry::from_config(&config)?;
    let mut stdout = std::io::stdout();
    for key in registry.keys() {
        if key == DEFAULT_PROFILE {
            writeln!(stdout, "{key} (default)")?;
        } else {
            writeln!(stdout, "{key}")?;
        }
    }
    Ok(())
}

fn split(args: SplitArgs) -> anyhow::Result<()> {
    // Resolve configuration: CLI flags > env vars > config file > defaults
    let config = load_config(args.config.as_deref())?;
    let registry = ProfileRegistry::from_config(&config)?;

    let profile_key = args
        .profile
        .or_else(|| std::env::var("CHAPTERSPLIT_PROFILE").ok())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let profile = registry.resolve(&profile_key)?;

    let output_cfg = config.output.clone().unwrap_or_default();
    let ocr_cfg = config.ocr.clone().unwrap_or_default();

    let output_root = args
        .output
        .or_else(|| std::env::var("CHAPTERSPLIT_OUTPUT").ok().map(PathBuf::from))
        .or_else(|| output_cfg.dir.map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("Output"));
    let export_pdf = args.export_pdf || output_cfg.export_pdf.unwrap_or(false);
    let title_mode = match args.title_mode {
        Some(mode) => mode,
        None => match output_cfg.title_mode.as_deref() {
            Some(s) => s.parse().map_err(anyhow::Error::msg)?,
            None => TitleMode::default(),
        },
    };
    let ocr_timeout = Duration::from_secs(
        args.ocr_timeout
            .or(ocr_cfg.timeout_secs)
            .unwrap_or(chaptersplit_segment::extract::DEFAULT_OCR_TIMEOUT.as_secs()),
    );
    let ocr_enabled = !args.no_ocr && ocr_cfg.enabled.unwrap_or(true);

    let base_name = args
        .file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();

    tracing::info!(
        path = %args.file_path.display(),
        profile = profile.name(),
        "splitting document"
    );

    let mut backend = MupdfBackend::new();
    if let Some(dpi) = ocr_cfg.render_dpi {
        backend = backend.with_render_dpi(dpi);
    }
    let doc = open_document(&backend, &args.file_path)?;

    let mut segmenter = Segmenter::new(
        profile,
        SegmentOptions {
            ocr_timeout,
            title_mode,
        },
    );
    if ocr_enabled && let Some(recognizer) = build_recognizer(ocr_cfg.language.as_deref()) {
        segmenter = segmenter.with_recognizer(recognizer);
    }

    let target = OutputTarget {
        root: output_root,
        base_name,
        export_pdf,
        dry_run: args.dry_run,
        color: ColorMode(!args.no_color),
    };

    let bar = ProgressBar::new(doc.page_count().saturating_sub(profile.skip_pages()) as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} pages {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    let result = segment_and_write(
        &segmenter,
        doc.as_ref(),
        &args.file_path,
        &target,
        &mut std::io::stdout(),
        |event| match event {
            ProgressEvent::PageExtracted { ocr, .. } => {
                bar.inc(1);
                if ocr {
                    bar.set_message("(OCR)");
                }
            }
            ProgressEvent::ChaptersFound { count } => {
                bar.set_message(format!("{count} chapters"));
            }
            ProgressEvent::ChapterSegmented { .. } => {}
        },
    );
    bar.finish_and_clear();
    result
}

/// Where and how a segmented document is written.
struct OutputTarget {
    root: PathBuf,
    base_name: String,
    export_pdf: bool,
    dry_run: bool,
    color: ColorMode,
}

/// Segment `doc` and write its sections. Nothing touches the output
/// directory unless segmentation succeeds.
fn segment_and_write(
    segmenter: &Segmenter<'_>,
    doc: &dyn Document,
    source: &Path,
    target: &OutputTarget,
    out: &mut dyn Write,
    progress: impl Fn(ProgressEvent),
) -> anyhow::Result<()> {
    let segmented = segmenter.segment(doc, source, progress)?;

    if target.dry_run {
        output::print_tree(out, &segmented.chapters, target.color)?;
        output::print_summary(out, &segmented.stats, None, target.color)?;
        return Ok(());
    }

    let export = target.export_pdf.then_some(doc);
    let written =
        output::write_sections(&target.root, &target.base_name, &segmented.chapters, export)?;

    writeln!(
        out,
        "Saved {} chapters to {}",
        segmented.chapters.len(),
        target.root.join(&target.base_name).display()
    )?;
    output::print_summary(out, &segmented.stats, Some(&written), target.color)?;
    Ok(())
}

#[cfg(feature = "ocr")]
fn build_recognizer(language: Option<&str>) -> Option<Arc<dyn Recognizer>> {
    use chaptersplit_ocr::{TesseractConfig, TesseractRecognizer};

    let mut config = TesseractConfig::default();
    if let Some(lang) = language {
        config.language = lang.to_string();
    }
    match TesseractRecognizer::new(config) {
        Ok(recognizer) => Some(Arc::new(recognizer)),
        Err(e) => {
            tracing::warn!(error = %e, "OCR unavailable; pages without text will be empty");
            None
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn build_recognizer(_language: Option<&str>) -> Option<Arc<dyn Recognizer>> {
    tracing::warn!("OCR support not compiled in (enable the `ocr` feature of chaptersplit-cli)");
    None
}
