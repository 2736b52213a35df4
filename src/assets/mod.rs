pub mod bucket;
pub mod path;
pub mod pick;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use bucket::{BucketNames, BucketResolver};
pub use path::{MainKeyScheme, PathCodec};
pub use pick::LocalPick;

/// Entity families that own images.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A standard for-sale listing.
    Sale,
    /// A buy-order ("want to buy").
    WantToBuy,
    /// A user profile and its avatar.
    Avatar,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Sale, EntityKind::WantToBuy, EntityKind::Avatar];

    /// Parse a loose type tag. Unknown tags fall back to [`EntityKind::Sale`].
    pub fn from_tag(tag: &str) -> Self {
        let normalized = tag.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "want_to_buy" | "wanttobuy" | "wtb" | "buy_order" | "buy" => EntityKind::WantToBuy,
            "avatar" | "profile" | "user" => EntityKind::Avatar,
            _ => EntityKind::Sale,
        }
    }

    pub fn as_tag(self) -> &'static str {
        match self {
            EntityKind::Sale => "sale",
            EntityKind::WantToBuy => "want-to-buy",
            EntityKind::Avatar => "avatar",
        }
    }

    /// Whether records of this kind carry an additional-images list.
    pub fn has_additional_images(self) -> bool {
        !matches!(self, EntityKind::Avatar)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    ReplaceMain,
    AppendAdditional,
}

/// A persisted image pointer: either a public URL or a bucket-relative key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetReference {
    Url(String),
    Key(String),
}

impl AssetReference {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Some(AssetReference::Url(trimmed.to_string()))
        } else {
            Some(AssetReference::Key(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AssetReference::Url(value) | AssetReference::Key(value) => value,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, AssetReference::Url(_))
    }
}
