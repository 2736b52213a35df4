use std::io;

use thiserror::Error;

use crate::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image type: {0}")]
    UnsupportedFormat(String),
    #[error("decode image failed: {0}")]
    Decode(#[source] image::ImageError),
    #[error("encode image failed: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image payload is empty")]
    Empty,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object key `{0}` is invalid")]
    InvalidKey(String),
    #[error("storage request to bucket `{bucket}` failed: HTTP {status} {body}")]
    Status {
        bucket: String,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no `{table}` row with id `{id}` visible to the caller")]
    NotFound { table: String, id: String },
    #[error("value for `{field}` is already taken")]
    Conflict { field: String, message: String },
    #[error("table request to `{table}` failed: HTTP {status} {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },
    #[error("row from `{table}` is missing column `{column}`")]
    MissingColumn { table: String, column: String },
    #[error("no authenticated user for a write to `{0}`")]
    Unauthenticated(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type RecordResult<T> = Result<T, RecordError>;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("backend is not reachable")]
    Offline,
    #[error("{0}")]
    Validation(FieldErrors),
    #[error("entity id `{0}` cannot be used as a storage prefix")]
    InvalidEntityId(String),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// What a caller should show for a failed user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFeedback {
    /// Route to inline per-field messages.
    Fields(FieldErrors),
    /// One blocking alert.
    Alert(String),
}

pub const OFFLINE_MESSAGE: &str =
    "No internet connection. Check your network and try again.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

impl AssetError {
    pub fn feedback(&self) -> UserFeedback {
        match self {
            AssetError::Validation(errors) => UserFeedback::Fields(errors.clone()),
            AssetError::Record(RecordError::Conflict { field, .. }) => {
                let mut errors = FieldErrors::default();
                errors.push(field.clone(), format!("This {field} is already taken."));
                UserFeedback::Fields(errors)
            }
            AssetError::Offline => UserFeedback::Alert(OFFLINE_MESSAGE.to_string()),
            _ => UserFeedback::Alert(GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_conflict_routes_to_field() {
        let err = AssetError::Record(RecordError::Conflict {
            field: "username".into(),
            message: "duplicate key".into(),
        });
        match err.feedback() {
            UserFeedback::Fields(fields) => {
                assert!(fields.get("username").is_some());
            }
            other => panic!("unexpected feedback {other:?}"),
        }
    }

    #[test]
    fn storage_failures_collapse_to_generic_alert() {
        let err = AssetError::Storage(StorageError::InvalidKey("".into()));
        assert_eq!(
            err.feedback(),
            UserFeedback::Alert(GENERIC_FAILURE_MESSAGE.to_string())
        );
        assert_eq!(
            AssetError::Offline.feedback(),
            UserFeedback::Alert(OFFLINE_MESSAGE.to_string())
        );
    }
}
