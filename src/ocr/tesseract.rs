//! Tesseract OCR engine.
//!
//! Runs the `tesseract` executable as a child process, streaming the image
//! through stdin and reading recognised text from stdout.

use super::{EngineInfo, OcrEngine, OcrError};
use crate::config::TesseractConfig;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub struct TesseractEngine {
    command: PathBuf,
    languages: String,
    oem: u8,
    psm: u8,
}

impl TesseractEngine {
    pub fn new(config: &TesseractConfig) -> Self {
        Self {
            command: config.command.clone(),
            languages: config.languages.clone(),
            oem: config.oem,
            psm: config.psm,
        }
    }

    /// Arguments for one recognition run: stdin in, plain text on stdout.
    fn recognition_args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.languages.clone(),
            "--oem".to_string(),
            self.oem.to_string(),
            "--psm".to_string(),
            self.psm.to_string(),
        ]
    }

    fn command_name(&self) -> String {
        self.command.display().to_string()
    }

    async fn run(&self, args: &[String], input: Option<&[u8]>) -> Result<Output, OcrError> {
        let mut child = Command::new(&self.command)
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OcrError::Spawn {
                command: self.command_name(),
                source,
            })?;

        // Feed stdin from its own task so a full stdout pipe can't stall the write.
        let writer = match (input, child.stdin.take()) {
            (Some(data), Some(mut stdin)) => {
                let data = data.to_vec();
                Some(tokio::spawn(async move {
                    stdin.write_all(&data).await?;
                    stdin.shutdown().await
                }))
            }
            _ => None,
        };

        let output = child.wait_with_output().await?;

        // Check the exit status first: a failing engine may close stdin early,
        // and its stderr is more useful than the resulting broken pipe.
        if !output.status.success() {
            return Err(OcrError::Failed {
                command: self.command_name(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(writer) = writer {
            writer.await??;
        }

        Ok(output)
    }
}

#[async_trait::async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, png: &[u8]) -> Result<String, OcrError> {
        debug!(
            "TesseractEngine: recognising {} bytes (lang={}, oem={}, psm={})",
            png.len(),
            self.languages,
            self.oem,
            self.psm
        );

        let output = self.run(&self.recognition_args(), Some(png)).await?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();

        debug!("TesseractEngine: recognised {} chars", text.chars().count());
        Ok(text)
    }

    async fn info(&self) -> Result<EngineInfo, OcrError> {
        let version = self.run(&["--version".to_string()], None).await?;
        let langs = self.run(&["--list-langs".to_string()], None).await?;

        // Older releases print the version banner on stderr.
        let banner = if version.stdout.is_empty() {
            &version.stderr
        } else {
            &version.stdout
        };

        let info = EngineInfo {
            name: self.name().to_string(),
            version: first_line(&String::from_utf8_lossy(banner)),
            languages: parse_language_list(&String::from_utf8_lossy(&langs.stdout)),
        };
        info!(
            "TesseractEngine: {} with {} language packs",
            info.version,
            info.languages.len()
        );
        Ok(info)
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Parse `tesseract --list-langs` output, skipping the header line.
fn parse_language_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}
