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
    tools::{ToolContext, asset_error, json_result},
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteEntityRequest {
    #[schemars(description = "Entity type: sale, want-to-buy or avatar")]
    pub entity_type: String,
    #[schemars(description = "Id of an entity owned by the caller")]
    pub entity_id: String,
    #[schemars(description = "Also remove unreferenced objects stored under the entity id")]
    #[serde(default)]
    pub sweep_prefix: bool,
}

pub async fn delete_entity(
    context: &ToolContext,
    Parameters(request): Parameters<DeleteEntityRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    let report = context
        .service
        .delete_entity(kind, &request.entity_id, &context.owner_id, request.sweep_prefix)
        .await
        .map_err(asset_error)?;
    json_result(&report)
}
