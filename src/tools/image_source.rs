use base64::{Engine as _, engine::general_purpose::STANDARD};
use percent_encoding::percent_decode_str;
use rmcp::ErrorData as McpError;
use serde_json::Value;
use url::Url;

use crate::assets::LocalPick;

/// Larger downloads are refused before decoding.
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

fn rejected(message: &'static str, detail: impl Into<String>) -> McpError {
    McpError::invalid_params(message, Some(Value::String(detail.into())))
}

/// An absolute http(s) URL with a host and no embedded credentials.
pub fn image_url(raw: &str) -> Result<Url, McpError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(McpError::invalid_params("image url must not be empty", None));
    }
    let parsed = Url::parse(trimmed).map_err(|err| rejected("invalid image url", err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(rejected(
            "image url must use http or https",
            parsed.scheme().to_string(),
        ));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(rejected("image url has no host", trimmed.to_string()));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(McpError::invalid_params(
            "image url must not carry credentials",
            None,
        ));
    }
    Ok(parsed)
}

/// Last non-empty path segment, decoded; `download` when there is none.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).next_back())
        .and_then(|segment| percent_decode_str(segment).decode_utf8().ok())
        .map(|name| name.into_owned())
        .unwrap_or_else(|| "download".to_string())
}

/// Download an image so it can go through the same pipeline as a local pick.
pub async fn fetch_pick(raw_url: &str) -> Result<LocalPick, McpError> {
    let url = image_url(raw_url)?;
    let file_name = file_name_from_url(&url);
    let response = reqwest::get(url.as_str()).await.map_err(|err| {
        McpError::internal_error("fetch image failed", Some(Value::String(err.to_string())))
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(McpError::internal_error(
            "fetch image failed",
            Some(Value::String(format!("HTTP {status}"))),
        ));
    }
    if response
        .content_length()
        .is_some_and(|length| length > MAX_IMAGE_BYTES as u64)
    {
        return Err(rejected("image is too large", url.to_string()));
    }
    let bytes = response.bytes().await.map_err(|err| {
        McpError::internal_error(
            "read image bytes failed",
            Some(Value::String(err.to_string())),
        )
    })?;
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(rejected("image is too large", url.to_string()));
    }
    if bytes.is_empty() {
        return Err(rejected("downloaded image is empty", url.to_string()));
    }
    Ok(LocalPick::from_bytes(file_name, bytes.to_vec()))
}

/// Bare base64 or a `data:` URL.
pub fn decode_pick(file_name: &str, encoded: &str) -> Result<LocalPick, McpError> {
    let payload = encoded
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded)
        .trim();
    let bytes = STANDARD
        .decode(payload)
        .map_err(|err| rejected("invalid base64 image", err.to_string()))?;
    if bytes.is_empty() {
        return Err(McpError::invalid_params("image payload is empty", None));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(McpError::invalid_params("image is too large", None));
    }
    Ok(LocalPick::from_bytes(file_name, bytes))
}
