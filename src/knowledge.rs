//! Knowledge Context: optional free-text reference material for replies.
//!
//! Loaded whole once per cycle and handed unchanged to every generation
//! request in that cycle. A missing file is not an error.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

/// Source of the knowledge text.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeSource {
    path: Option<PathBuf>,
}

impl KnowledgeSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the knowledge file. Empty when unconfigured, absent or unreadable.
    pub async fn load(&self) -> String {
        let Some(path) = &self.path else {
            return String::new();
        };

        match fs::read_to_string(path).await {
            Ok(text) => {
                let text = text.trim().to_string();
                debug!(path = %path.display(), chars = text.len(), "Loaded knowledge context");
                text
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No knowledge file; continuing without it");
                String::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read knowledge file");
                String::new()
            }
        }
    }
}
