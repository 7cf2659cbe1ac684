//! OCR engine abstraction.
//!
//! Defines the [`OcrEngine`] trait so the extractor can run against the real
//! Tesseract executable or a stand-in during tests.

pub mod tesseract;

use serde::Serialize;
use thiserror::Error;

pub use tesseract::TesseractEngine;

/// Everything that can go wrong between receiving image bytes and getting text back.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("cannot read image: {0}")]
    Image(#[from] image::ImageError),

    #[error("cannot run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("I/O error talking to the OCR engine: {0}")]
    Io(#[from] std::io::Error),

    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Version and installed language packs reported by an engine.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    pub languages: Vec<String>,
}

impl EngineInfo {
    /// Language packs from a `+`-joined list that are not installed.
    pub fn missing_languages(&self, requested: &str) -> Vec<String> {
        requested
            .split('+')
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .filter(|lang| !self.languages.iter().any(|l| l == lang))
            .map(str::to_string)
            .collect()
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Recognise the text in a PNG-encoded image.
    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError>;

    async fn info(&self) -> Result<EngineInfo, OcrError>;
}
