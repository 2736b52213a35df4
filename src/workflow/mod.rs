//! Image lifecycle workflows: upload/associate, save, delete.

mod delete;
mod save;
mod upload;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::assets::{BucketResolver, EntityKind, PathCodec, path};
use crate::connectivity::{AlwaysReachable, Reachability};
use crate::error::{AssetError, AssetResult, RecordError};
use crate::image_processing::ImageNormalizer;
use crate::records::{EntityRecord, RecordStore, TableSchema};
use crate::storage::ObjectStorage;
use crate::watchdog::DEFAULT_SLOW_AFTER;

pub use delete::{DeletionReport, FailedRemoval};
pub use save::{EntityEdit, SaveOutcome};
pub use upload::UploadRequest;

/// Source of upload disambiguators.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Which form of Asset Reference gets written to image columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceForm {
    #[default]
    Key,
    PublicUrl,
}

#[derive(Clone)]
pub struct AssetService {
    storage: Arc<dyn ObjectStorage>,
    records: Arc<dyn RecordStore>,
    reachability: Arc<dyn Reachability>,
    clock: Arc<dyn Clock>,
    buckets: BucketResolver,
    codec: PathCodec,
    normalizer: ImageNormalizer,
    reference_form: ReferenceForm,
    slow_after: Duration,
}

impl AssetService {
    pub fn new(storage: Arc<dyn ObjectStorage>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            storage,
            records,
            reachability: Arc::new(AlwaysReachable),
            clock: Arc::new(SystemClock),
            buckets: BucketResolver::default(),
            codec: PathCodec::default(),
            normalizer: ImageNormalizer::default(),
            reference_form: ReferenceForm::default(),
            slow_after: DEFAULT_SLOW_AFTER,
        }
    }

    pub fn with_reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_buckets(mut self, buckets: BucketResolver) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_codec(mut self, codec: PathCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_normalizer(mut self, normalizer: ImageNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_reference_form(mut self, form: ReferenceForm) -> Self {
        self.reference_form = form;
        self
    }

    pub fn with_slow_after(mut self, slow_after: Duration) -> Self {
        self.slow_after = slow_after;
        self
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    pub fn bucket(&self, kind: EntityKind) -> &str {
        self.buckets.resolve(kind)
    }

    /// Bucket-relative key for a stored reference, if it points into the
    /// kind's bucket.
    pub fn resolve_key(&self, kind: EntityKind, reference: &str) -> Option<String> {
        path::decode(reference, self.bucket(kind))
    }

    /// Displayable URL for a stored reference. References that do not point
    /// into the kind's bucket are returned unchanged.
    pub fn display_url(&self, kind: EntityKind, reference: &str) -> Option<String> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return None;
        }
        match self.resolve_key(kind, trimmed) {
            Some(key) => Some(self.storage.public_url(self.bucket(kind), &key)),
            None => Some(trimmed.to_string()),
        }
    }

    /// Every object stored under the entity's prefix.
    pub async fn list_entity_assets(&self, kind: EntityKind, entity_id: &str) -> AssetResult<Vec<String>> {
        let prefix = path::entity_prefix(entity_id)?;
        Ok(self.storage.list(self.bucket(kind), &prefix).await?)
    }

    fn reference_for(&self, kind: EntityKind, key: &str) -> String {
        match self.reference_form {
            ReferenceForm::Key => key.to_string(),
            ReferenceForm::PublicUrl => self.storage.public_url(self.bucket(kind), key),
        }
    }

    fn same_asset(&self, kind: EntityKind, left: &str, right: &str) -> bool {
        if left.trim() == right.trim() {
            return true;
        }
        match (self.resolve_key(kind, left), self.resolve_key(kind, right)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }

    async fn ensure_online(&self) -> AssetResult<()> {
        if self.reachability.is_reachable().await {
            Ok(())
        } else {
            Err(AssetError::Offline)
        }
    }

    /// Load a record the caller owns; someone else's row reads as missing.
    async fn owned_record(&self, kind: EntityKind, id: &str, owner_id: &str) -> AssetResult<EntityRecord> {
        let not_found = || RecordError::NotFound {
            table: TableSchema::for_kind(kind).table.to_string(),
            id: id.to_string(),
        };
        let record = self.records.select(kind, id).await?.ok_or_else(not_found)?;
        if record.owner_id != owner_id {
            return Err(not_found().into());
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn display_url_normalizes_keys_and_keeps_foreign_urls() {
        let (service, _, _) = service_with_fakes(&[0]);
        assert_eq!(
            service.display_url(EntityKind::Sale, "abc/main.jpg").as_deref(),
            Some("https://cdn.test/storage/v1/object/public/listing-images/abc/main.jpg")
        );
        assert_eq!(
            service
                .display_url(EntityKind::Sale, "https://elsewhere.test/pic.jpg")
                .as_deref(),
            Some("https://elsewhere.test/pic.jpg")
        );
        assert_eq!(service.display_url(EntityKind::Sale, " "), None);
    }

    #[test]
    fn same_asset_matches_key_and_url_forms() {
        let (service, _, _) = service_with_fakes(&[0]);
        assert!(service.same_asset(
            EntityKind::Sale,
            "abc/1_0.jpg",
            "https://cdn.test/storage/v1/object/public/listing-images/abc/1_0.jpg?t=9"
        ));
        assert!(!service.same_asset(EntityKind::Sale, "abc/1_0.jpg", "abc/2_1.jpg"));
    }
}
