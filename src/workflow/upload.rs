use futures::future::join_all;
use tracing::{debug, info, warn};

use super::AssetService;
use crate::assets::{EntityKind, LocalPick, UploadMode, path};
use crate::error::AssetResult;
use crate::image_processing::NormalizedImage;
use crate::storage::compute_hash;

#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub kind: EntityKind,
    pub entity_id: &'a str,
    pub mode: UploadMode,
    pub picks: Vec<LocalPick>,
    /// Current main reference, removed before a `ReplaceMain` upload.
    pub previous_main: Option<&'a str>,
    /// Length of the current additional list; new indexes continue from it.
    pub existing_additional: usize,
}

impl AssetService {
    /// Upload picks and return their object keys. Nothing is written to the
    /// entity's record here.
    pub async fn upload(&self, request: UploadRequest<'_>) -> AssetResult<Vec<String>> {
        if request.picks.is_empty() {
            return Ok(Vec::new());
        }
        // Reject bad ids before any image work.
        path::entity_prefix(request.entity_id)?;
        match request.mode {
            UploadMode::ReplaceMain => {
                if request.picks.len() > 1 {
                    warn!(
                        entity_id = request.entity_id,
                        count = request.picks.len(),
                        "only the first pick replaces the main image"
                    );
                }
                let pick = &request.picks[0];
                let key = self
                    .replace_main(request.kind, request.entity_id, pick, request.previous_main)
                    .await?;
                Ok(vec![key])
            }
            UploadMode::AppendAdditional => {
                self.append_additional(
                    request.kind,
                    request.entity_id,
                    &request.picks,
                    request.existing_additional,
                )
                .await
            }
        }
    }

    async fn normalize_pick(&self, pick: &LocalPick) -> AssetResult<NormalizedImage> {
        let bytes = pick.read().await?;
        let normalizer = self.normalizer;
        let normalized = tokio::task::spawn_blocking(move || normalizer.normalize(&bytes)).await??;
        debug!(
            file = pick.file_name(),
            width = normalized.width,
            height = normalized.height,
            passthrough = normalized.passthrough,
            sha256 = %compute_hash(&normalized.bytes),
            "normalized pick"
        );
        Ok(normalized)
    }

    async fn replace_main(
        &self,
        kind: EntityKind,
        entity_id: &str,
        pick: &LocalPick,
        previous_main: Option<&str>,
    ) -> AssetResult<String> {
        let bucket = self.bucket(kind);
        let image = self.normalize_pick(pick).await?;
        let key = self
            .codec
            .main_key(entity_id, self.clock.now_millis(), image.extension)?;

        // Delete first so a changed file name never leaves the old main
        // behind; the upsert below makes a failed delete harmless.
        if let Some(previous_key) = previous_main.and_then(|reference| path::decode(reference, bucket)) {
            if let Err(err) = self.storage.remove(bucket, &[previous_key.clone()]).await {
                warn!(bucket, key = %previous_key, error = %err, "failed to remove previous main image");
            }
        }

        self.storage
            .upload(bucket, &key, image.bytes, image.mime_type)
            .await?;
        info!(bucket, key = %key, entity_id, "uploaded main image");
        Ok(key)
    }

    async fn append_additional(
        &self,
        kind: EntityKind,
        entity_id: &str,
        picks: &[LocalPick],
        existing: usize,
    ) -> AssetResult<Vec<String>> {
        let bucket = self.bucket(kind);
        let images = join_all(picks.iter().map(|pick| self.normalize_pick(pick)))
            .await
            .into_iter()
            .collect::<AssetResult<Vec<_>>>()?;

        // Every key is fixed before dispatch, so completion order cannot
        // cause collisions.
        let timestamp = self.clock.now_millis();
        let mut planned = Vec::with_capacity(images.len());
        for (offset, image) in images.into_iter().enumerate() {
            let key = self
                .codec
                .additional_key(entity_id, timestamp, existing + offset, image.extension)?;
            planned.push((key, image));
        }
        let keys: Vec<String> = planned.iter().map(|(key, _)| key.clone()).collect();

        let results = join_all(planned.into_iter().map(|(key, image)| async move {
            self.storage
                .upload(bucket, &key, image.bytes, image.mime_type)
                .await
        }))
        .await;

        let mut first_error = None;
        let mut uploaded = Vec::new();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(()) => uploaded.push(key.clone()),
                Err(err) => {
                    warn!(bucket, key = %key, error = %err, "additional image upload failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if let Some(err) = first_error {
            if !uploaded.is_empty() {
                warn!(bucket, orphaned = ?uploaded, "batch aborted; uploaded objects left in storage");
            }
            return Err(err.into());
        }
        info!(bucket, entity_id, count = keys.len(), "uploaded additional images");
        Ok(keys)
    }
}
