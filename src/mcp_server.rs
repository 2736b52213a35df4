use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use crate::tools::{
    CreateEntityRequest, DeleteEntityRequest, ListEntityAssetsRequest,
    RemoveAdditionalImageRequest, ResolveAssetRequest, ToolContext, UploadEntityImageRequest,
};

#[derive(Clone)]
pub struct AssetToolServer {
    tool_router: ToolRouter<Self>,
    context: ToolContext,
}

impl AssetToolServer {
    pub fn new(context: ToolContext) -> Self {
        Self {
            tool_router: Self::tool_router(),
            context,
        }
    }
}

#[tool_router]
impl AssetToolServer {
    #[tool(
        description = "Create a sale listing, want-to-buy post or profile. Images given as URLs are normalized to JPEG and uploaded before the record is saved."
    )]
    async fn create_entity(
        &self,
        Parameters(request): Parameters<CreateEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::create_entity(&self.context, Parameters(request)).await
    }

    #[tool(
        description = "Upload an image for an existing entity, either replacing its main image or appending to its additional images"
    )]
    async fn upload_entity_image(
        &self,
        Parameters(request): Parameters<UploadEntityImageRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::upload_entity_image(&self.context, Parameters(request)).await
    }

    #[tool(description = "Remove one additional image from an entity and delete the stored object")]
    async fn remove_additional_image(
        &self,
        Parameters(request): Parameters<RemoveAdditionalImageRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::remove_additional_image(&self.context, Parameters(request)).await
    }

    #[tool(
        description = "Delete an entity together with its stored images. Image removal is best effort; the record is deleted even if some objects could not be removed."
    )]
    async fn delete_entity(
        &self,
        Parameters(request): Parameters<DeleteEntityRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::delete_entity(&self.context, Parameters(request)).await
    }

    #[tool(description = "Resolve a stored image reference into its bucket, key and display URL")]
    async fn resolve_asset(
        &self,
        Parameters(request): Parameters<ResolveAssetRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::resolve_asset(&self.context, Parameters(request)).await
    }

    #[tool(description = "List every object stored under an entity id")]
    async fn list_entity_assets(
        &self,
        Parameters(request): Parameters<ListEntityAssetsRequest>,
    ) -> Result<CallToolResult, McpError> {
        crate::tools::list_entity_assets(&self.context, Parameters(request)).await
    }
}

#[tool_handler]
impl ServerHandler for AssetToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
