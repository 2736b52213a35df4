use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::assets::bucket::{
    BucketNames, DEFAULT_AVATAR_BUCKET, DEFAULT_LISTING_BUCKET, DEFAULT_WANT_TO_BUY_BUCKET,
};
use crate::assets::path::normalize_base_url;
use crate::assets::MainKeyScheme;
use crate::image_processing::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};
use crate::watchdog::DEFAULT_SLOW_AFTER;
use crate::workflow::ReferenceForm;

/// Hosted backend connection. Absent in local mode.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub secret_key: Option<String>,
    pub backend: Option<BackendConfig>,
    pub buckets: BucketNames,
    pub main_key_scheme: MainKeyScheme,
    pub reference_form: ReferenceForm,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub slow_after: Duration,
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    /// Owner used for writes in local mode.
    pub local_user_id: String,
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(name) {
        Some(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {name} value `{value}`")),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Read configuration from the environment (`.env` is loaded by the
    /// binary beforehand).
    pub fn from_env() -> Result<Self> {
        let port = parsed("MCP_PORT", 3000u16)?;
        let bind_address = format!("0.0.0.0:{port}");

        let backend = match non_empty("BACKEND_URL") {
            Some(url) => Some(BackendConfig {
                url,
                api_key: non_empty("BACKEND_API_KEY")
                    .ok_or_else(|| anyhow!("BACKEND_API_KEY is required with BACKEND_URL"))?,
                access_token: non_empty("BACKEND_ACCESS_TOKEN"),
                user_id: non_empty("BACKEND_USER_ID"),
                email: non_empty("BACKEND_EMAIL"),
                password: non_empty("BACKEND_PASSWORD"),
            }),
            None => None,
        };

        let main_key_scheme = match non_empty("MAIN_KEY_SCHEME") {
            Some(name) => MainKeyScheme::from_name(&name)
                .ok_or_else(|| anyhow!("MAIN_KEY_SCHEME must be `fixed` or `timestamped`, got `{name}`"))?,
            None => MainKeyScheme::default(),
        };
        let reference_form = match non_empty("REFERENCE_FORM").as_deref() {
            Some("key") | None => ReferenceForm::Key,
            Some("public_url") | Some("url") => ReferenceForm::PublicUrl,
            Some(other) => return Err(anyhow!("REFERENCE_FORM must be `key` or `public_url`, got `{other}`")),
        };

        Ok(Self {
            port,
            secret_key: non_empty("SECRET_KEY"),
            backend,
            buckets: BucketNames {
                listing: non_empty("LISTING_BUCKET").unwrap_or_else(|| DEFAULT_LISTING_BUCKET.into()),
                want_to_buy: non_empty("WANT_TO_BUY_BUCKET")
                    .unwrap_or_else(|| DEFAULT_WANT_TO_BUY_BUCKET.into()),
                avatar: non_empty("AVATAR_BUCKET").unwrap_or_else(|| DEFAULT_AVATAR_BUCKET.into()),
            },
            main_key_scheme,
            reference_form,
            max_dimension: parsed("IMAGE_MAX_DIMENSION", DEFAULT_MAX_DIMENSION)?,
            jpeg_quality: parsed("IMAGE_JPEG_QUALITY", DEFAULT_JPEG_QUALITY)?,
            slow_after: Duration::from_secs(parsed("WATCHDOG_SECS", DEFAULT_SLOW_AFTER.as_secs())?),
            storage_dir: resolve_storage_dir(),
            public_base_url: resolve_public_base_url(&bind_address),
            local_user_id: non_empty("LOCAL_USER_ID").unwrap_or_else(|| "local-user".into()),
        })
    }

    pub fn addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn is_local(&self) -> bool {
        self.backend.is_none()
    }

    /// Prefix routes with the secret key when one is configured.
    pub fn route(&self, path: &str) -> String {
        match self.secret_key.as_deref() {
            Some(secret) => format!("/{secret}{path}"),
            None => path.to_string(),
        }
    }
}

fn resolve_storage_dir() -> PathBuf {
    if let Some(dir) = non_empty("STORAGE_DIR") {
        return PathBuf::from(dir);
    }
    let mut base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.push("marketplace-assets");
    base
}

fn resolve_public_base_url(bind_address: &str) -> String {
    if let Some(url) = non_empty("PUBLIC_URL") {
        return normalize_base_url(&url);
    }
    let domain = non_empty("DOMAIN").unwrap_or_else(|| bind_address.to_string());
    normalize_base_url(&domain)
}
