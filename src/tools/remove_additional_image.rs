use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::JsonSchema,
};
use serde::Deserialize;

use crate::{
    assets::EntityKind,
    tools::{EntityView, ToolContext, asset_error, json_result},
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RemoveAdditionalImageRequest {
    #[schemars(description = "Entity type: sale or want-to-buy")]
    pub entity_type: String,
    #[schemars(description = "Id of an entity owned by the caller")]
    pub entity_id: String,
    #[schemars(description = "Stored key or public URL of the image to remove")]
    pub reference: String,
}

pub async fn remove_additional_image(
    context: &ToolContext,
    Parameters(request): Parameters<RemoveAdditionalImageRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    let record = context
        .service
        .remove_additional(kind, &request.entity_id, &context.owner_id, &request.reference)
        .await
        .map_err(asset_error)?;
    json_result(&EntityView::from_record(&context.service, record))
}
