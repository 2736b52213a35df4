pub mod create_entity;
pub mod delete_entity;
pub mod image_source;
pub mod list_entity_assets;
pub mod remove_additional_image;
pub mod resolve_asset;
pub mod upload_entity_image;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    assets::EntityKind,
    error::{AssetError, UserFeedback},
    records::EntityRecord,
    workflow::{AssetService, SaveOutcome},
};

/// State shared by every tool: the asset service and the caller it acts for.
#[derive(Clone)]
pub struct ToolContext {
    pub service: Arc<AssetService>,
    pub owner_id: String,
}

/// A record with its image references resolved to displayable URLs.
#[derive(Serialize)]
pub struct EntityView {
    pub id: String,
    pub entity_type: EntityKind,
    pub main_image_url: Option<String>,
    pub additional_image_urls: Vec<String>,
    pub fields: Map<String, Value>,
}

impl EntityView {
    pub fn from_record(service: &AssetService, record: EntityRecord) -> Self {
        let main_image_url = record
            .main_image
            .as_deref()
            .and_then(|reference| service.display_url(record.kind, reference));
        let additional_image_urls = record
            .additional_images
            .iter()
            .filter_map(|reference| service.display_url(record.kind, reference))
            .collect();
        Self {
            id: record.id,
            entity_type: record.kind,
            main_image_url,
            additional_image_urls,
            fields: record.fields,
        }
    }
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub entity: EntityView,
    /// Set when the save outlived the slow-operation watchdog.
    pub slow: bool,
}

impl SaveResponse {
    pub fn new(service: &AssetService, outcome: SaveOutcome) -> Self {
        Self {
            entity: EntityView::from_record(service, outcome.record),
            slow: outcome.slow,
        }
    }
}

pub fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string(value).map_err(|err| {
        McpError::internal_error(
            "serialize tool response failed",
            Some(Value::String(err.to_string())),
        )
    })?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Validation problems and field conflicts are the caller's to fix; the
/// rest collapse into the generic alert with the detail attached.
pub fn asset_error(err: AssetError) -> McpError {
    match err.feedback() {
        UserFeedback::Fields(errors) => McpError::invalid_params(
            "invalid fields",
            serde_json::to_value(&errors).ok(),
        ),
        UserFeedback::Alert(message) => {
            McpError::internal_error(message, Some(Value::String(err.to_string())))
        }
    }
}

pub use create_entity::{CreateEntityRequest, create_entity};
pub use delete_entity::{DeleteEntityRequest, delete_entity};
pub use list_entity_assets::{ListEntityAssetsRequest, list_entity_assets};
pub use remove_additional_image::{RemoveAdditionalImageRequest, remove_additional_image};
pub use resolve_asset::{ResolveAssetRequest, resolve_asset};
pub use upload_entity_image::{UploadEntityImageRequest, upload_entity_image};
