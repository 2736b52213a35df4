use anyhow::Result;
use rmcp::{
    ErrorData as McpError,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars::JsonSchema,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    assets::EntityKind,
    tools::{SaveResponse, ToolContext, asset_error, json_result, image_source::fetch_pick},
    workflow::EntityEdit,
};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEntityRequest {
    #[schemars(description = "Entity type: sale, want-to-buy or avatar")]
    pub entity_type: String,
    #[schemars(description = "Column values of the new record, e.g. title and price")]
    pub fields: Map<String, Value>,
    #[schemars(description = "Optional http(s) URL of the main image")]
    pub main_image_url: Option<String>,
    #[schemars(description = "Optional http(s) URLs of additional images")]
    #[serde(default)]
    pub additional_image_urls: Vec<String>,
}

pub async fn create_entity(
    context: &ToolContext,
    Parameters(request): Parameters<CreateEntityRequest>,
) -> Result<CallToolResult, McpError> {
    let kind = EntityKind::from_tag(&request.entity_type);
    let mut edit = EntityEdit::create(kind, context.owner_id.clone(), request.fields);
    if let Some(url) = request.main_image_url.as_deref() {
        edit.new_main = Some(fetch_pick(url).await?);
    }
    for url in &request.additional_image_urls {
        edit.new_additional.push(fetch_pick(url).await?);
    }
    let outcome = context
        .service
        .save_entity(edit, |_| {})
        .await
        .map_err(asset_error)?;
    json_result(&SaveResponse::new(&context.service, outcome))
}
