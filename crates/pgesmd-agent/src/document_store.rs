// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Local};
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::StoreError;

const DOCUMENT_EXTENSION: &str = ".xml";

/// Name a fetched document is saved under: local time plus the four characters before the last
/// one of its resource URI.
pub fn document_name(resource_uri: &str, now: DateTime<Local>) -> String {
    let chars: Vec<char> = resource_uri.chars().collect();
    let end = chars.len().saturating_sub(1);
    let start = chars.len().saturating_sub(5);
    let suffix: String = chars[start..end].iter().collect();
    format!("{}_{suffix}", now.format("%y.%m.%d %H:%M:%S"))
}

/// Raw usage documents kept on disk for later inspection or re-import.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DocumentStore { dir: dir.into() }
    }

    pub async fn save(&self, name: &str, document: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{name}{DOCUMENT_EXTENSION}"));
        tokio::fs::write(&path, document).await?;
        debug!("Saved {} bytes to {}", document.len(), path.display());
        Ok(path)
    }

    /// Reads a saved document back. The `.xml` extension may be left out.
    pub async fn read(&self, file: &str) -> Result<Vec<u8>, StoreError> {
        if file.is_empty() || file.contains(['/', '\\']) || file.contains("..") {
            return Err(StoreError::InvalidName(file.to_string()));
        }
        let file_name = if file.ends_with(DOCUMENT_EXTENSION) {
            file.to_string()
        } else {
            format!("{file}{DOCUMENT_EXTENSION}")
        };
        match tokio::fs::read(self.dir.join(&file_name)).await {
            Ok(document) => Ok(document),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(file.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
