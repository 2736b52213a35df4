use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::JsonSchema,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    assets::{EntityKind, UploadMode},
    tools::{
        SaveResponse, ToolContext, asset_error,
        image_source::{decode_pick, fetch_pick},
        json_result,
    },
    workflow::EntityEdit,
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UploadEntityImageRequest {
    #[schemars(description = "Entity type: sale, want-to-buy or avatar")]
    pub entity_type: String,
    #[schemars(description = "Id of an entity owned by the caller")]
    pub entity_id: String,
    #[schemars(description = "replace_main replaces the main image, append_additional adds to the gallery")]
    pub mode: UploadMode,
    #[schemars(description = "http(s) URL of the image to upload")]
    pub image_url: Option<String>,
    #[schemars(description = "Base64 encoded image bytes, used when image_url is absent")]
    pub image_base64: Option<String>,
    #[schemars(description = "Original file name of the image")]
    pub file_name: Option<String>,
}

pub async fn upload_entity_image(
    context: &ToolContext,
    Parameters(request): Parameters<UploadEntityImageRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    if request.mode == UploadMode::AppendAdditional && !kind.has_additional_images() {
        return Err(McpError::invalid_params(
            "this entity type has no additional images",
            Some(Value::String(kind.to_string())),
        ));
    }
    let file_name = request.file_name.as_deref().unwrap_or("upload");
    let pick = match (request.image_url.as_deref(), request.image_base64.as_deref()) {
        (Some(url), _) => fetch_pick(url).await?,
        (None, Some(encoded)) => decode_pick(file_name, encoded)?,
        (None, None) => {
            return Err(McpError::invalid_params(
                "either image_url or image_base64 is required",
                None,
            ));
        }
    };

    let mut edit = EntityEdit::update(kind, request.entity_id, context.owner_id.clone());
    match request.mode {
        UploadMode::ReplaceMain => edit.new_main = Some(pick),
        UploadMode::AppendAdditional => edit.new_additional.push(pick),
    }
    let outcome = context
        .service
        .save_entity(edit, |_| {})
        .await
        .map_err(asset_error)?;
    json_result(&SaveResponse::new(&context.service, outcome))
}
