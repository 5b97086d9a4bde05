//! Tesseract-backed [`Recognizer`].
//!
//! Pages arrive already binarized by the segmentation engine; this crate
//! only encodes the image and hands it to Tesseract.

use std::io::Cursor;

use image::{GrayImage, ImageFormat};
use leptess::{LepTess, Variable};

use chaptersplit_core::{RecognitionError, Recognizer};

/// Tesseract page segmentation mode 3: fully automatic, no OSD.
const PSM_AUTO: u32 = 3;

/// Recognizer configuration.
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Tesseract language codes (e.g., "eng", "eng+fra").
    pub language: String,
    /// Page segmentation mode (see Tesseract PSM).
    pub page_segmentation_mode: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            page_segmentation_mode: PSM_AUTO,
        }
    }
}

/// Optical recognition through the system Tesseract library.
pub struct TesseractRecognizer {
    config: TesseractConfig,
}

impl TesseractRecognizer {
    /// Create a recognizer, failing early if Tesseract cannot load the
    /// configured language data.
    pub fn new(config: TesseractConfig) -> Result<Self, RecognitionError> {
        init(&config)?;
        Ok(Self { config })
    }
}

fn init(config: &TesseractConfig) -> Result<LepTess, RecognitionError> {
    let mut lt = LepTess::new(None, &config.language).map_err(|e| {
        RecognitionError::Init(format!(
            "Tesseract cannot load language '{}': {}. Make sure language data is installed",
            config.language, e
        ))
    })?;
    lt.set_variable(
        Variable::TesseditPagesegMode,
        &config.page_segmentation_mode.to_string(),
    )
    .map_err(|e| RecognitionError::Init(format!("failed to set PSM: {e}")))?;
    Ok(lt)
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<String, RecognitionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RecognitionError::Failed(format!(
                "image dimensions must be non-zero (got {width}x{height})"
            )));
        }

        // LepTess is not Send; build one per call.
        let mut lt = init(&self.config)?;

        // leptess expects encoded image data
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| RecognitionError::Failed(format!("failed to encode image: {e}")))?;

        lt.set_image_from_mem(png.get_ref())
            .map_err(|e| RecognitionError::Failed(format!("failed to load image: {e}")))?;

        let text = lt
            .get_utf8_text()
            .map_err(|e| RecognitionError::Failed(format!("invalid UTF-8 from Tesseract: {e}")))?;
        tracing::debug!(width, height, chars = text.len(), "tesseract pass complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TesseractConfig::default();
        assert_eq!(config.language, "eng");
        assert_eq!(config.page_segmentation_mode, PSM_AUTO);
    }
}
