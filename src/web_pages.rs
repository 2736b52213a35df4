use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::assets::{EntityKind, LocalPick, UploadMode};
use crate::error::{AssetError, RecordError, UserFeedback};
use crate::tools::{SaveResponse, ToolContext};
use crate::validation::FieldErrors;
use crate::workflow::EntityEdit;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<FieldErrors>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub mode: Option<UploadMode>,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            fields: None,
        }),
    )
        .into_response()
}

fn asset_error_response(err: &AssetError) -> Response {
    let status = match err {
        AssetError::Validation(_) | AssetError::Record(RecordError::Conflict { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        AssetError::InvalidEntityId(_) | AssetError::Image(_) => StatusCode::BAD_REQUEST,
        AssetError::Record(RecordError::NotFound { .. }) => StatusCode::NOT_FOUND,
        AssetError::Offline => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = match err.feedback() {
        UserFeedback::Fields(fields) => ErrorResponse {
            error: "invalid fields".into(),
            fields: Some(fields),
        },
        UserFeedback::Alert(message) => ErrorResponse {
            error: message,
            fields: None,
        },
    };
    (status, Json(body)).into_response()
}

/// `POST /entities/{entity_type}/{entity_id}/images?mode=` with one or more
/// `file` parts. `replace_main` takes the first file only.
pub async fn handle_image_upload(
    State(context): State<ToolContext>,
    Path((entity_type, entity_id)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Response {
    let kind = EntityKind::from_tag(&entity_type);
    let mode = query.mode.unwrap_or(UploadMode::ReplaceMain);
    if mode == UploadMode::AppendAdditional && !kind.has_additional_images() {
        return json_error(StatusCode::BAD_REQUEST, "this entity type has no additional images");
    }

    let mut picks = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/") {
                        return json_error(StatusCode::BAD_REQUEST, "unsupported file type");
                    }
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                match field.bytes().await {
                    Ok(data) if data.is_empty() => {
                        return json_error(StatusCode::BAD_REQUEST, "uploaded file is empty");
                    }
                    Ok(data) => picks.push(LocalPick::from_bytes(file_name, data.to_vec())),
                    Err(err) => {
                        return json_error(
                            StatusCode::BAD_REQUEST,
                            &format!("failed to read file: {err}"),
                        );
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    &format!("failed to read form: {err}"),
                );
            }
        }
    }
    if picks.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "no file was uploaded");
    }

    let mut edit = EntityEdit::update(kind, entity_id, context.owner_id.clone());
    match mode {
        UploadMode::ReplaceMain => edit.new_main = picks.into_iter().next(),
        UploadMode::AppendAdditional => edit.new_additional = picks,
    }
    match context.service.save_entity(edit, |_| {}).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(SaveResponse::new(&context.service, outcome)),
        )
            .into_response(),
        Err(err) => asset_error_response(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            asset_error_response(&AssetError::Offline).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let mut fields = FieldErrors::default();
        fields.push("title", "Title is required.");
        assert_eq!(
            asset_error_response(&AssetError::Validation(fields)).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        let missing = AssetError::Record(RecordError::NotFound {
            table: "listings".into(),
            id: "abc".into(),
        });
        assert_eq!(asset_error_response(&missing).status(), StatusCode::NOT_FOUND);
    }
}
