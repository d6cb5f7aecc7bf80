//! Design source reader
//!
//! Loads the design document as UTF-8 text. No semantic parsing happens here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors raised while loading a design document
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Design document not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read design document {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Design document {} is not valid UTF-8 (first bad byte at offset {offset})", path.display())]
    Encoding { path: PathBuf, offset: usize },

    #[error("Design document {} is empty", path.display())]
    Empty { path: PathBuf },
}

/// The raw design text plus the path it was read from
#[derive(Debug, Clone)]
pub struct DesignDocument {
    path: PathBuf,
    text: String,
}

impl DesignDocument {
    /// Read a design document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "DesignDocument::load: called");

        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                debug!("DesignDocument::load: not found");
                SourceError::NotFound { path: path.clone() }
            } else {
                debug!(error = %e, "DesignDocument::load: read failed");
                SourceError::Read {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;

        let text = String::from_utf8(bytes).map_err(|e| SourceError::Encoding {
            path: path.clone(),
            offset: e.utf8_error().valid_up_to(),
        })?;

        Self::from_text(path, text)
    }

    /// Build a document from text already in memory
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Result<Self, SourceError> {
        let path = path.into();
        let mut text = text.into();

        if let Some(stripped) = text.strip_prefix('\u{feff}') {
            text = stripped.to_string();
        }

        if text.trim().is_empty() {
            return Err(SourceError::Empty { path });
        }

        debug!(?path, len = text.len(), "DesignDocument::from_text: loaded");
        Ok(Self { path, text })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// File stem of the source path, used when the model gives no plan title
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Project Plan".to_string())
    }
}
