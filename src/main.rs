use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marketplace_assets::{
    assets::{BucketResolver, PathCodec},
    assets::path::PUBLIC_OBJECT_PATH,
    client::{BackendClient, Session},
    config::{AppConfig, BackendConfig},
    connectivity::HttpReachability,
    image_processing::ImageNormalizer,
    mcp_server::AssetToolServer,
    records::{MemoryRecordStore, RestRecordStore},
    storage::{LocalObjectStorage, RemoteObjectStorage},
    tools::ToolContext,
    web_pages,
    workflow::AssetService,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let context = match config.backend.as_ref() {
        Some(backend) => remote_context(&config, backend).await?,
        None => local_context(&config),
    };

    let mcp_path = config.route("/mcp");
    let upload_path = config.route("/entities/{entity_type}/{entity_id}/images");
    let context_for_service = context.clone();
    let service = StreamableHttpService::new(
        move || Ok(AssetToolServer::new(context_for_service.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let mut router = axum::Router::new()
        .route(
            &upload_path,
            post(web_pages::handle_image_upload).layer(DefaultBodyLimit::max(50 * 1024 * 1024)),
        )
        .nest_service(&mcp_path, service);
    if config.is_local() {
        router = router.nest_service(
            &format!("/{PUBLIC_OBJECT_PATH}"),
            ServeDir::new(&config.storage_dir),
        );
    }
    let router = router.with_state(context);

    let bind_address = config.addr();
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(
        address = %bind_address,
        mcp_path = %mcp_path,
        local = config.is_local(),
        "marketplace asset server started"
    );

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

fn configure(service: AssetService, config: &AppConfig) -> AssetService {
    service
        .with_buckets(BucketResolver::new(config.buckets.clone()))
        .with_codec(PathCodec::new(config.main_key_scheme))
        .with_normalizer(ImageNormalizer::new(config.max_dimension, config.jpeg_quality))
        .with_reference_form(config.reference_form)
        .with_slow_after(config.slow_after)
}

/// Files under the storage dir, rows in memory; served back on the public
/// object path.
fn local_context(config: &AppConfig) -> ToolContext {
    let storage = Arc::new(LocalObjectStorage::new(
        config.storage_dir.clone(),
        config.public_base_url.clone(),
    ));
    let records = Arc::new(MemoryRecordStore::new());
    ToolContext {
        service: Arc::new(configure(AssetService::new(storage, records), config)),
        owner_id: config.local_user_id.clone(),
    }
}

async fn remote_context(config: &AppConfig, backend: &BackendConfig) -> Result<ToolContext> {
    let client = BackendClient::new(&backend.url, backend.api_key.clone());
    let session = match (&backend.access_token, &backend.user_id, &backend.email, &backend.password) {
        (Some(token), Some(user_id), _, _) => {
            let session = Session {
                access_token: token.clone(),
                user_id: user_id.clone(),
            };
            client.set_session(Some(session.clone())).await;
            session
        }
        (_, _, Some(email), Some(password)) => client
            .sign_in_with_password(email, password)
            .await
            .context("signing in to the backend")?,
        _ => anyhow::bail!(
            "set BACKEND_ACCESS_TOKEN and BACKEND_USER_ID, or BACKEND_EMAIL and BACKEND_PASSWORD"
        ),
    };

    let service = AssetService::new(
        Arc::new(RemoteObjectStorage::new(client.clone())),
        Arc::new(RestRecordStore::new(client.clone())),
    )
    .with_reachability(Arc::new(HttpReachability::new(client)));
    Ok(ToolContext {
        service: Arc::new(configure(service, config)),
        owner_id: session.user_id,
    })
}
