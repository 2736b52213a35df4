use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::JsonSchema,
};
use serde::{Deserialize, Serialize};

use crate::{
    assets::EntityKind,
    tools::{ToolContext, asset_error, json_result},
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEntityAssetsRequest {
    #[schemars(description = "Entity type: sale, want-to-buy or avatar")]
    pub entity_type: String,
    #[schemars(description = "Entity id whose stored objects should be listed")]
    pub entity_id: String,
}

#[derive(Debug, Serialize)]
struct StoredAsset {
    key: String,
    url: String,
}

pub async fn list_entity_assets(
    context: &ToolContext,
    Parameters(request): Parameters<ListEntityAssetsRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    let service = &context.service;
    let keys = service
        .list_entity_assets(kind, &request.entity_id)
        .await
        .map_err(asset_error)?;
    let bucket = service.bucket(kind);
    let assets: Vec<StoredAsset> = keys
        .into_iter()
        .map(|key| StoredAsset {
            url: service.storage().public_url(bucket, &key),
            key,
        })
        .collect();
    json_result(&assets)
}
