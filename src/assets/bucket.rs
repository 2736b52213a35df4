use serde::{Deserialize, Serialize};

use super::EntityKind;

pub const DEFAULT_LISTING_BUCKET: &str = "listing-images";
pub const DEFAULT_WANT_TO_BUY_BUCKET: &str = "want-to-buy-images";
pub const DEFAULT_AVATAR_BUCKET: &str = "avatars";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketNames {
    pub listing: String,
    pub want_to_buy: String,
    pub avatar: String,
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            listing: DEFAULT_LISTING_BUCKET.to_string(),
            want_to_buy: DEFAULT_WANT_TO_BUY_BUCKET.to_string(),
            avatar: DEFAULT_AVATAR_BUCKET.to_string(),
        }
    }
}

/// Maps entity kinds to their fixed storage bucket.
#[derive(Debug, Clone, Default)]
pub struct BucketResolver {
    names: BucketNames,
}

impl BucketResolver {
    pub fn new(names: BucketNames) -> Self {
        Self { names }
    }

    pub fn resolve(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Sale => &self.names.listing,
            EntityKind::WantToBuy => &self.names.want_to_buy,
            EntityKind::Avatar => &self.names.avatar,
        }
    }

    pub fn resolve_tag(&self, tag: &str) -> &str {
        self.resolve(EntityKind::from_tag(tag))
    }
}
