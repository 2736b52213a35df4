use std::collections::BTreeSet;

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::AssetService;
use crate::assets::{EntityKind, path};
use crate::error::AssetResult;
use crate::records::{EntityRecord, image_patch};

#[derive(Debug, Clone, Serialize)]
pub struct FailedRemoval {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub removed: Vec<String>,
    pub failed: Vec<FailedRemoval>,
    /// References that did not resolve to a key in the entity's bucket.
    pub skipped: Vec<String>,
    /// Leftovers found under the entity prefix and removed.
    pub swept: Vec<String>,
}

impl AssetService {
    /// Delete an entity the caller owns together with its images.
    pub async fn delete_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
        owner_id: &str,
        sweep_prefix: bool,
    ) -> AssetResult<DeletionReport> {
        self.ensure_online().await?;
        let record = self.owned_record(kind, entity_id, owner_id).await?;
        self.delete_with_references(
            kind,
            entity_id,
            owner_id,
            record.main_image.as_deref(),
            &record.additional_images,
            sweep_prefix,
        )
        .await
    }

    /// Best-effort removal of every referenced object, then the row delete.
    /// Storage failures are collected in the report; the row is deleted
    /// regardless.
    pub async fn delete_with_references(
        &self,
        kind: EntityKind,
        entity_id: &str,
        owner_id: &str,
        main_image: Option<&str>,
        additional_images: &[String],
        sweep_prefix: bool,
    ) -> AssetResult<DeletionReport> {
        let bucket = self.bucket(kind);
        let mut report = DeletionReport::default();
        let mut keys = Vec::new();
        let mut seen = BTreeSet::new();
        for reference in main_image.into_iter().chain(additional_images.iter().map(String::as_str)) {
            match path::decode(reference, bucket) {
                Some(key) => {
                    if seen.insert(key.clone()) {
                        keys.push(key);
                    }
                }
                None => report.skipped.push(reference.to_string()),
            }
        }

        self.remove_each(bucket, &keys, &mut report.removed, &mut report.failed)
            .await;

        if sweep_prefix {
            match self.list_entity_assets(kind, entity_id).await {
                Ok(listed) => {
                    let leftovers: Vec<String> = listed
                        .into_iter()
                        .filter(|key| !seen.contains(key))
                        .collect();
                    self.remove_each(bucket, &leftovers, &mut report.swept, &mut report.failed)
                        .await;
                }
                Err(err) => warn!(bucket, entity_id, error = %err, "failed to list entity prefix"),
            }
        }

        self.records.delete(kind, entity_id, owner_id).await?;
        info!(
            bucket,
            entity_id,
            removed = report.removed.len(),
            failed = report.failed.len(),
            swept = report.swept.len(),
            "deleted entity"
        );
        Ok(report)
    }

    /// Drop one additional image from a record, then remove the object.
    pub async fn remove_additional(
        &self,
        kind: EntityKind,
        entity_id: &str,
        owner_id: &str,
        reference: &str,
    ) -> AssetResult<EntityRecord> {
        self.ensure_online().await?;
        let record = self.owned_record(kind, entity_id, owner_id).await?;
        let (removed, kept): (Vec<String>, Vec<String>) = record
            .additional_images
            .iter()
            .cloned()
            .partition(|candidate| self.same_asset(kind, candidate, reference));
        if removed.is_empty() {
            return Ok(record);
        }
        let patch = image_patch(kind, None, Some(&kept));
        let updated = self.records.update(kind, entity_id, owner_id, patch).await?;
        self.remove_references(kind, &removed).await;
        Ok(updated)
    }

    /// Secondary cleanup: failures are logged and swallowed.
    pub(super) async fn remove_references(&self, kind: EntityKind, references: &[String]) {
        let bucket = self.bucket(kind);
        let keys: Vec<String> = references
            .iter()
            .filter_map(|reference| path::decode(reference, bucket))
            .collect();
        let mut removed = Vec::new();
        let mut failed = Vec::new();
        self.remove_each(bucket, &keys, &mut removed, &mut failed).await;
    }

    async fn remove_each(
        &self,
        bucket: &str,
        keys: &[String],
        removed: &mut Vec<String>,
        failed: &mut Vec<FailedRemoval>,
    ) {
        let results = join_all(keys.iter().map(|key| async move {
            self.storage.remove(bucket, std::slice::from_ref(key)).await
        }))
        .await;
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => removed.push(key.clone()),
                Err(err) => {
                    warn!(bucket, key = %key, error = %err, "failed to remove object");
                    failed.push(FailedRemoval {
                        key: key.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}
