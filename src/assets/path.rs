//! Object-key encoding and the inverse mapping from stored references.
//!
//! Keys always live under `<entityId>/`. Main images use `main.<ext>` (or
//! `main_<ts>.<ext>` with [`MainKeyScheme::Timestamped`]); additional images
//! use `<ts>_<index>.<ext>`.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::Url;

use super::AssetReference;
use crate::error::{AssetError, AssetResult};

pub const PUBLIC_OBJECT_PATH: &str = "storage/v1/object/public";

const MAIN_STEM: &str = "main";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainKeyScheme {
    /// `main.<ext>`, re-uploads overwrite in place.
    #[default]
    Fixed,
    /// `main_<ts>.<ext>`, the previous main object must be removed explicitly.
    Timestamped,
}

impl MainKeyScheme {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(MainKeyScheme::Fixed),
            "timestamped" | "timestamp" => Some(MainKeyScheme::Timestamped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PathCodec {
    scheme: MainKeyScheme,
}

impl PathCodec {
    pub fn new(scheme: MainKeyScheme) -> Self {
        Self { scheme }
    }

    pub fn main_key(&self, entity_id: &str, disambiguator: i64, ext: &str) -> AssetResult<String> {
        let prefix = entity_prefix(entity_id)?;
        let ext = normalize_ext(ext);
        Ok(match self.scheme {
            MainKeyScheme::Fixed => format!("{prefix}{MAIN_STEM}.{ext}"),
            MainKeyScheme::Timestamped => format!("{prefix}{MAIN_STEM}_{disambiguator}.{ext}"),
        })
    }

    pub fn additional_key(
        &self,
        entity_id: &str,
        timestamp: i64,
        index: usize,
        ext: &str,
    ) -> AssetResult<String> {
        let prefix = entity_prefix(entity_id)?;
        Ok(format!("{prefix}{timestamp}_{index}.{}", normalize_ext(ext)))
    }
}

/// `<entityId>/`, the prefix that scopes every object of an entity.
pub fn entity_prefix(entity_id: &str) -> AssetResult<String> {
    let trimmed = entity_id.trim();
    if trimmed.is_empty()
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains("..")
        || trimmed.contains(['?', '#'])
        || trimmed.chars().any(|c| c.is_ascii_control())
    {
        return Err(AssetError::InvalidEntityId(entity_id.to_string()));
    }
    Ok(format!("{trimmed}/"))
}

fn normalize_ext(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if trimmed.is_empty() {
        "jpg".to_string()
    } else {
        trimmed
    }
}

/// Extract the bucket-relative key from a stored reference.
///
/// Query strings and fragments are dropped and URL path segments are
/// percent-decoded. Returns `None` when a URL has no path segment equal to
/// `bucket`; callers treat that as nothing to delete. Bare keys are already
/// bucket-relative and come back unchanged.
pub fn decode(reference: &str, bucket: &str) -> Option<String> {
    if bucket.is_empty() {
        return None;
    }
    let stripped = reference
        .trim()
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    match AssetReference::parse(stripped)? {
        AssetReference::Url(raw) => {
            let parsed = Url::parse(&raw).ok()?;
            let segments: Vec<&str> = parsed.path_segments()?.collect();
            key_after_bucket(&segments, bucket)
        }
        AssetReference::Key(raw) if raw.starts_with('/') => {
            let segments: Vec<&str> = raw.split('/').collect();
            key_after_bucket(&segments, bucket)
        }
        AssetReference::Key(raw) => Some(raw),
    }
}

fn key_after_bucket(segments: &[&str], bucket: &str) -> Option<String> {
    // Anchor on `.../object/public/<bucket>` first: an entity id may equal
    // the bucket name.
    let public: Vec<&str> = PUBLIC_OBJECT_PATH.split('/').collect();
    let anchored = segments
        .windows(public.len() + 1)
        .position(|window| window[..public.len()] == public[..] && window[public.len()] == bucket)
        .map(|start| start + public.len());
    let position = match anchored {
        Some(position) => position,
        None => segments.iter().position(|segment| *segment == bucket)?,
    };
    let rest = segments[position + 1..]
        .iter()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            percent_decode_str(segment)
                .decode_utf8()
                .ok()
                .map(|decoded| decoded.into_owned())
        })
        .collect::<Option<Vec<String>>>()?;
    if rest.is_empty() {
        None
    } else {
        Some(rest.join("/"))
    }
}

/// Collapse doubled schemes such as `http://https://` left by sloppy config.
pub fn normalize_base_url(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        base = format!("http://{base}");
    }
    while base.starts_with("http://http://") {
        base = base.replacen("http://http://", "http://", 1);
    }
    while base.starts_with("https://https://") {
        base = base.replacen("https://https://", "https://", 1);
    }
    while base.starts_with("http://https://") {
        base = base.replacen("http://https://", "https://", 1);
    }
    while base.starts_with("https://http://") {
        base = base.replacen("https://http://", "http://", 1);
    }
    base
}

/// `<base>/storage/v1/object/public/<bucket>/<key>` with every key segment
/// percent-encoded.
pub fn public_url(base_url: &str, bucket: &str, key: &str) -> String {
    let base = normalize_base_url(base_url);
    let key = key.trim_start_matches('/');
    let Ok(mut url) = Url::parse(&base) else {
        return format!("{base}/{PUBLIC_OBJECT_PATH}/{bucket}/{key}");
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments
                .pop_if_empty()
                .extend(PUBLIC_OBJECT_PATH.split('/'))
                .push(bucket)
                .extend(key.split('/'));
        }
        Err(()) => return format!("{base}/{PUBLIC_OBJECT_PATH}/{bucket}/{key}"),
    }
    url.to_string()
}
