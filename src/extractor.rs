//! Text extraction pipeline: decode, optionally enhance, run OCR.
//!
//! [`TextExtractor::extract`] never fails. Whatever goes wrong is turned into
//! a message shown in place of the extracted text.

use crate::ocr::{OcrEngine, OcrError};
use crate::preprocess;
use image::{DynamicImage, ImageOutputFormat};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shown when the engine finds nothing but whitespace.
pub const NO_TEXT_MESSAGE: &str = "No text will be extracted. Please try a different image.";

/// Prefix of the message shown when extraction fails.
pub const ERROR_PREFIX: &str = "Error during OCR processing: ";

/// How an extraction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The engine returned text.
    Text,
    /// The engine returned only whitespace; `text` holds [`NO_TEXT_MESSAGE`].
    Empty,
    /// Something failed; `text` holds the error message.
    Error,
}

/// Result of one extraction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub id: Uuid,
    pub text: String,
    pub outcome: Outcome,
    pub preprocessed: bool,
    pub processing_time_ms: u64,
}

/// Runs uploads through the enhancement pipeline and the OCR engine.
#[derive(Clone)]
pub struct TextExtractor {
    engine: Arc<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    /// Extract text from an uploaded JPEG/PNG.
    pub async fn extract(&self, image_bytes: Vec<u8>, preprocess: bool) -> Extraction {
        let id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            "Extraction {}: {} bytes, preprocess={}, engine={}",
            id,
            image_bytes.len(),
            preprocess,
            self.engine.name()
        );

        let (text, outcome) = match self.run(image_bytes, preprocess).await {
            Ok(raw) if raw.trim().is_empty() => {
                warn!("Extraction {}: engine returned no text", id);
                (NO_TEXT_MESSAGE.to_string(), Outcome::Empty)
            }
            Ok(raw) => (raw, Outcome::Text),
            Err(e) => {
                error!("Extraction {} failed: {}", id, e);
                (format!("{}{}", ERROR_PREFIX, e), Outcome::Error)
            }
        };

        let processing_time_ms = started.elapsed().as_millis() as u64;
        info!(
            "Extraction {} finished: {:?} ({} chars, {} ms)",
            id,
            outcome,
            text.chars().count(),
            processing_time_ms
        );

        Extraction {
            id,
            text,
            outcome,
            preprocessed: preprocess,
            processing_time_ms,
        }
    }

    async fn run(&self, image_bytes: Vec<u8>, preprocess: bool) -> Result<String, OcrError> {
        let png = tokio::task::spawn_blocking(move || prepare_image(&image_bytes, preprocess)).await??;
        self.engine.recognize(&png).await
    }
}

/// Decode the upload, enhance it if asked, and re-encode as PNG for the engine.
fn prepare_image(image_bytes: &[u8], preprocess: bool) -> Result<Vec<u8>, OcrError> {
    let decoded = image::load_from_memory(image_bytes)?;
    let prepared = if preprocess {
        DynamicImage::ImageLuma8(preprocess::enhance(&decoded))
    } else {
        decoded
    };

    let mut png = Vec::new();
    prepared.write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ocr::EngineInfo;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::sync::Mutex;

    /// Engine stand-in returning a canned reply and recording what it was sent.
    pub(crate) struct StubEngine {
        reply: Result<String, String>,
        pub(crate) seen: Mutex<Vec<Vec<u8>>>,
    }

    impl StubEngine {
        pub(crate) fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(stderr: &str) -> Self {
            Self {
                reply: Err(stderr.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl OcrEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
            self.seen.lock().unwrap().push(png.to_vec());
            self.reply.clone().map_err(|stderr| OcrError::Failed {
                command: "stub".to_string(),
                status: "exit status: 1".to_string(),
                stderr,
            })
        }

        async fn info(&self) -> Result<EngineInfo, OcrError> {
            Ok(EngineInfo {
                name: "stub".to_string(),
                version: "stub 1.0".to_string(),
                languages: vec!["eng".to_string(), "hin".to_string()],
            })
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, _| {
            if x % 5 == 0 {
                Rgb([10, 10, 10])
            } else {
                Rgb([230, 230, 230])
            }
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    fn decode(png: &[u8]) -> DynamicImage {
        image::load_from_memory(png).unwrap()
    }

    #[tokio::test]
    async fn test_text_is_returned_verbatim() {
        let extractor = TextExtractor::new(Arc::new(StubEngine::replying("नमस्ते HELLO\n")));
        let result = extractor.extract(png_bytes(20, 10), false).await;
        assert_eq!(result.outcome, Outcome::Text);
        assert_eq!(result.text, "नमस्ते HELLO\n");
        assert!(!result.preprocessed);
    }

    #[tokio::test]
    async fn test_whitespace_only_becomes_fallback_message() {
        for reply in ["", "   ", "\n\x0c", " \t\n "] {
            let extractor = TextExtractor::new(Arc::new(StubEngine::replying(reply)));
            let result = extractor.extract(png_bytes(20, 10), true).await;
            assert_eq!(result.outcome, Outcome::Empty);
            assert_eq!(result.text, NO_TEXT_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_engine_error_is_caught_and_reported() {
        let extractor = TextExtractor::new(Arc::new(StubEngine::failing(
            "Failed loading language 'hin'",
        )));
        let result = extractor.extract(png_bytes(20, 10), true).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert!(result.text.starts_with(ERROR_PREFIX));
        assert!(result.text.contains("Failed loading language 'hin'"));
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_caught() {
        let engine = Arc::new(StubEngine::replying("never used"));
        let extractor = TextExtractor::new(engine.clone());
        let result = extractor.extract(b"definitely not an image".to_vec(), true).await;
        assert_eq!(result.outcome, Outcome::Error);
        assert!(result.text.starts_with(ERROR_PREFIX));
        assert!(engine.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preprocessing_sends_upscaled_grayscale() {
        let engine = Arc::new(StubEngine::replying("ok"));
        let extractor = TextExtractor::new(engine.clone());
        extractor.extract(png_bytes(20, 10), true).await;

        let sent = decode(&engine.seen.lock().unwrap()[0]);
        assert_eq!((sent.width(), sent.height()), (30, 15));
        assert_eq!(sent.color(), image::ColorType::L8);
    }

    #[tokio::test]
    async fn test_without_preprocessing_image_is_untouched() {
        let engine = Arc::new(StubEngine::replying("ok"));
        let extractor = TextExtractor::new(engine.clone());
        extractor.extract(png_bytes(20, 10), false).await;

        let sent = decode(&engine.seen.lock().unwrap()[0]);
        assert_eq!((sent.width(), sent.height()), (20, 10));
        assert_eq!(sent.color(), image::ColorType::Rgb8);
    }

    /// Block capitals drawn from rectangles, dark on white.
    fn hello_image() -> Vec<u8> {
        use imageproc::drawing::draw_filled_rect_mut;
        use imageproc::rect::Rect;

        let mut img = GrayImage::from_pixel(560, 160, Luma([255]));
        let ink = Luma([0u8]);
        let mut bar = |x: i32, y: i32, w: u32, h: u32| {
            draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(w, h), ink)
        };
        // H
        bar(30, 30, 16, 100);
        bar(90, 30, 16, 100);
        bar(30, 72, 76, 16);
        // E
        bar(130, 30, 16, 100);
        bar(130, 30, 70, 16);
        bar(130, 72, 56, 16);
        bar(130, 114, 70, 16);
        // L
        bar(230, 30, 16, 100);
        bar(230, 114, 66, 16);
        // L
        bar(320, 30, 16, 100);
        bar(320, 114, 66, 16);
        // O
        bar(410, 30, 16, 100);
        bar(480, 30, 16, 100);
        bar(410, 30, 86, 16);
        bar(410, 114, 86, 16);

        let mut out = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    #[ignore] // Requires tesseract with eng+hin language packs
    async fn test_real_engine_reads_legible_text() {
        let engine = crate::ocr::TesseractEngine::new(&crate::config::TesseractConfig::default());
        let extractor = TextExtractor::new(Arc::new(engine));
        let result = extractor.extract(hello_image(), true).await;
        assert_eq!(result.outcome, Outcome::Text, "got: {}", result.text);
        assert!(!result.text.trim().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires tesseract with eng+hin language packs
    async fn test_real_engine_on_blank_image_gives_fallback() {
        let engine = crate::ocr::TesseractEngine::new(&crate::config::TesseractConfig::default());
        let extractor = TextExtractor::new(Arc::new(engine));

        let blank = RgbImage::from_pixel(200, 100, Rgb([40, 120, 200]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(blank)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .unwrap();

        let result = extractor.extract(png, false).await;
        assert_eq!(result.text, NO_TEXT_MESSAGE);
    }
}
