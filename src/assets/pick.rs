use std::path::PathBuf;

use tokio::fs;

use crate::error::ImageError;

#[derive(Debug, Clone)]
enum PickSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A device-local image chosen for upload. Never persisted.
#[derive(Debug, Clone)]
pub struct LocalPick {
    file_name: String,
    source: PickSource,
}

impl LocalPick {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            file_name,
            source: PickSource::Path(path),
        }
    }

    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            source: PickSource::Bytes(bytes),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub async fn read(&self) -> Result<Vec<u8>, ImageError> {
        let bytes = match &self.source {
            PickSource::Path(path) => fs::read(path).await?,
            PickSource::Bytes(bytes) => bytes.clone(),
        };
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(bytes)
    }
}
