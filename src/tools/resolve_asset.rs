use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::JsonSchema,
};
use serde::{Deserialize, Serialize};

use crate::{
    assets::{AssetReference, EntityKind},
    tools::{ToolContext, json_result},
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ResolveAssetRequest {
    #[schemars(description = "Entity type: sale, want-to-buy or avatar")]
    pub entity_type: String,
    #[schemars(description = "Stored image reference, either a public URL or a bucket-relative key")]
    pub reference: String,
}

#[derive(Debug, Serialize)]
struct ResolvedAsset {
    bucket: String,
    is_url: bool,
    /// `None` when the reference does not point into the bucket.
    key: Option<String>,
    display_url: Option<String>,
}

pub async fn resolve_asset(
    context: &ToolContext,
    Parameters(request): Parameters<ResolveAssetRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    let reference = AssetReference::parse(&request.reference)
        .ok_or_else(|| McpError::invalid_params("reference must not be empty", None))?;
    let service = &context.service;
    json_result(&ResolvedAsset {
        bucket: service.bucket(kind).to_string(),
        is_url: reference.is_url(),
        key: service.resolve_key(kind, reference.as_str()),
        display_url: service.display_url(kind, reference.as_str()),
    })
}
