use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{AssetService, UploadRequest};
use crate::assets::{EntityKind, LocalPick, UploadMode};
use crate::error::{AssetError, AssetResult};
use crate::records::{EntityRecord, image_patch};
use crate::validation;
use crate::watchdog;

/// One user-initiated save: field edits plus image changes, persisted with
/// a single record write.
#[derive(Debug, Clone)]
pub struct EntityEdit {
    pub kind: EntityKind,
    /// `None` creates a new record.
    pub entity_id: Option<String>,
    pub owner_id: String,
    pub fields: Map<String, Value>,
    pub new_main: Option<LocalPick>,
    pub new_additional: Vec<LocalPick>,
    pub removed_additional: Vec<String>,
}

impl EntityEdit {
    pub fn create(kind: EntityKind, owner_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            kind,
            entity_id: None,
            owner_id: owner_id.into(),
            fields,
            new_main: None,
            new_additional: Vec::new(),
            removed_additional: Vec::new(),
        }
    }

    pub fn update(kind: EntityKind, entity_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: Some(entity_id.into()),
            owner_id: owner_id.into(),
            fields: Map::new(),
            new_main: None,
            new_additional: Vec::new(),
            removed_additional: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub record: EntityRecord,
    /// The watchdog fired before the save finished.
    pub slow: bool,
}

impl AssetService {
    /// Validate, check connectivity, upload images and persist everything in
    /// one record write. Any upload failure aborts the save.
    pub async fn save_entity<S>(&self, edit: EntityEdit, on_slow: S) -> AssetResult<SaveOutcome>
    where
        S: FnOnce(&str),
    {
        let checked = match edit.entity_id {
            None => validation::validate_new(edit.kind, &edit.fields),
            Some(_) => validation::validate_patch(edit.kind, &edit.fields),
        };
        checked.map_err(AssetError::Validation)?;
        self.ensure_online().await?;

        let label = format!("save {}", edit.kind);
        let watched = watchdog::watch(&label, self.slow_after, self.persist_edit(edit), on_slow).await;
        Ok(SaveOutcome {
            record: watched.output?,
            slow: watched.slow,
        })
    }

    async fn persist_edit(&self, edit: EntityEdit) -> AssetResult<EntityRecord> {
        let EntityEdit {
            kind,
            entity_id,
            owner_id,
            fields,
            new_main,
            new_additional,
            removed_additional,
        } = edit;

        let Some(id) = entity_id else {
            // New records start with no assets; the images follow in the update.
            let record = self.records.insert(kind, &owner_id, fields).await?;
            info!(kind = %kind, entity_id = %record.id, "created record");
            let id = record.id.clone();
            let attached = self
                .attach_images(record, Map::new(), &owner_id, new_main, new_additional, Vec::new())
                .await;
            if attached.is_err() {
                self.discard_new_record(kind, &id, &owner_id).await;
            }
            return attached;
        };
        let record = self.owned_record(kind, &id, &owner_id).await?;
        self.attach_images(record, fields, &owner_id, new_main, new_additional, removed_additional)
            .await
    }

    async fn attach_images(
        &self,
        record: EntityRecord,
        mut patch: Map<String, Value>,
        owner_id: &str,
        new_main: Option<LocalPick>,
        new_additional: Vec<LocalPick>,
        removed_additional: Vec<String>,
    ) -> AssetResult<EntityRecord> {
        let kind = record.kind;
        if let Some(pick) = new_main {
            let keys = self
                .upload(UploadRequest {
                    kind,
                    entity_id: &record.id,
                    mode: UploadMode::ReplaceMain,
                    picks: vec![pick],
                    previous_main: record.main_image.as_deref(),
                    existing_additional: 0,
                })
                .await?;
            if let Some(key) = keys.first() {
                let reference = self.reference_for(kind, key);
                patch.extend(image_patch(kind, Some(Some(&reference)), None));
            }
        }

        let (dropped, mut additional): (Vec<String>, Vec<String>) =
            record.additional_images.iter().cloned().partition(|candidate| {
                removed_additional
                    .iter()
                    .any(|removed| self.same_asset(kind, candidate, removed))
            });
        let mut additional_changed = !dropped.is_empty();
        if !new_additional.is_empty() {
            if !kind.has_additional_images() {
                debug!(kind = %kind, "kind has no additional images; ignoring picks");
            } else {
                let keys = self
                    .upload(UploadRequest {
                        kind,
                        entity_id: &record.id,
                        mode: UploadMode::AppendAdditional,
                        picks: new_additional,
                        previous_main: None,
                        existing_additional: additional.len(),
                    })
                    .await?;
                additional.extend(keys.iter().map(|key| self.reference_for(kind, key)));
                additional_changed = true;
            }
        }
        if additional_changed {
            patch.extend(image_patch(kind, None, Some(&additional)));
        }

        let saved = if patch.is_empty() {
            record
        } else {
            self.records
                .update(kind, &record.id, owner_id, patch)
                .await?
        };

        // Only after the row no longer points at them.
        if !dropped.is_empty() {
            self.remove_references(kind, &dropped).await;
        }
        info!(kind = %kind, entity_id = %saved.id, "saved record");
        Ok(saved)
    }

    /// Undo a create whose images failed: drop whatever already landed under
    /// the new prefix, then the row.
    async fn discard_new_record(&self, kind: EntityKind, id: &str, owner_id: &str) {
        match self.list_entity_assets(kind, id).await {
            Ok(keys) if !keys.is_empty() => self.remove_references(kind, &keys).await,
            Ok(_) => {}
            Err(err) => warn!(kind = %kind, entity_id = id, error = %err, "failed to list new record assets"),
        }
        match self.records.delete(kind, id, owner_id).await {
            Ok(()) => info!(kind = %kind, entity_id = id, "discarded new record after failed save"),
            Err(err) => warn!(kind = %kind, entity_id = id, error = %err, "failed to discard new record"),
        }
    }
}
