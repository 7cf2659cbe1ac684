//! Service configuration.
//!
//! Settings come from an optional JSON file (`OCR_CONFIG`) and are then
//! overridden by individual environment variables, so a `.env` file is enough
//! for most deployments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Top-level configuration for the OCR web service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Whether uploads are enhanced before OCR unless the request says otherwise.
    #[serde(default = "default_true")]
    pub preprocess: bool,
    #[serde(default)]
    pub tesseract: TesseractConfig,
}

/// How the Tesseract executable is located and invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesseractConfig {
    /// Executable name or path. A bare name is resolved through `PATH`.
    #[serde(default = "default_command")]
    pub command: PathBuf,
    /// Language packs joined with `+` (e.g. "eng+hin").
    #[serde(default = "default_languages")]
    pub languages: String,
    /// OCR engine mode (`--oem`).
    #[serde(default = "default_oem")]
    pub oem: u8,
    /// Page segmentation mode (`--psm`).
    #[serde(default = "default_psm")]
    pub psm: u8,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_command() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_languages() -> String {
    "eng+hin".to_string()
}

fn default_oem() -> u8 {
    3
}

fn default_psm() -> u8 {
    6
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            languages: default_languages(),
            oem: default_oem(),
            psm: default_psm(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_upload_bytes: default_max_upload_bytes(),
            preprocess: true,
            tesseract: TesseractConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `OCR_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let base = match std::env::var("OCR_CONFIG") {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(raw) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("OCR_PREPROCESS") {
            self.preprocess = parse_flag(&raw)
                .with_context(|| format!("OCR_PREPROCESS must be a boolean, got {:?}", raw))?;
        }
        if let Some(cmd) = lookup("TESSERACT_CMD") {
            self.tesseract.command = PathBuf::from(cmd);
        }
        if let Some(langs) = lookup("OCR_LANGUAGES") {
            self.tesseract.languages = langs;
        }
        if let Some(raw) = lookup("OCR_OEM") {
            self.tesseract.oem = parse_var("OCR_OEM", &raw)?;
        }
        if let Some(raw) = lookup("OCR_PSM") {
            self.tesseract.psm = parse_var("OCR_PSM", &raw)?;
        }

        if self.tesseract.languages.trim().is_empty() {
            anyhow::bail!("OCR_LANGUAGES must name at least one language pack");
        }

        Ok(self)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
}

/// Parse the boolean spellings accepted from env vars and form fields.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
