//! Plain text file extractor.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use distill_core::{Error, Extractor, Result, SourceKind};

/// Default cap on the size of a file read into memory.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Reads a local file as UTF-8 (lossy for invalid sequences).
pub struct TextFileExtractor {
    max_bytes: u64,
}

impl TextFileExtractor {
    pub fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    /// Refuse files larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl Default for TextFileExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for TextFileExtractor {
    fn source_kind(&self) -> SourceKind {
        SourceKind::File
    }

    async fn extract(&self, source_ref: &str) -> Result<String> {
        let path = Path::new(source_ref);
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::Extraction(format!("Cannot read {}: {}", source_ref, e)))?;

        if !metadata.is_file() {
            return Err(Error::Extraction(format!("{} is not a file", source_ref)));
        }
        if metadata.len() > self.max_bytes {
            return Err(Error::Extraction(format!(
                "{} is {} bytes, over the {} byte limit",
                source_ref,
                metadata.len(),
                self.max_bytes
            )));
        }

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Extraction(format!("Cannot read {}: {}", source_ref, e)))?;
        let text = String::from_utf8_lossy(&data).into_owned();
        debug!(path = source_ref, char_count = text.chars().count(), "Read text file");
        Ok(text)
    }

    fn name(&self) -> &str {
        "text_file"
    }
}
