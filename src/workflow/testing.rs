//! In-process fakes shared by the workflow tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};

use super::{AssetService, Clock};
use crate::assets::LocalPick;
use crate::assets::path::public_url;
use crate::error::{StorageError, StorageResult};
use crate::records::MemoryRecordStore;
use crate::storage::ObjectStorage;

#[derive(Default)]
pub struct FakeStorage {
    pub objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    pub removal_attempts: Mutex<Vec<String>>,
    pub upload_order: Mutex<Vec<String>>,
    pub failing_removals: Mutex<BTreeSet<String>>,
    pub failing_uploads: Mutex<BTreeSet<String>>,
    /// Keys whose upload is held back, to force out-of-order completion.
    pub slow_uploads: Mutex<BTreeSet<String>>,
}

impl FakeStorage {
    pub fn fail_removal_of(&self, key: &str) {
        self.failing_removals.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_upload_of(&self, key: &str) {
        self.failing_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn delay_upload_of(&self, key: &str) {
        self.slow_uploads.lock().unwrap().insert(key.to_string());
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(object_bucket, _)| object_bucket == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn insert(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), b"seed".to_vec());
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<()> {
        let delayed = self.slow_uploads.lock().unwrap().contains(key);
        if delayed {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if self.failing_uploads.lock().unwrap().contains(key) {
            return Err(StorageError::Status {
                bucket: bucket.to_string(),
                status: 500,
                body: "simulated upload failure".into(),
            });
        }
        self.upload_order.lock().unwrap().push(key.to_string());
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(())
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.removal_attempts.lock().unwrap().push(key.clone());
            if self.failing_removals.lock().unwrap().contains(key) {
                return Err(StorageError::Status {
                    bucket: bucket.to_string(),
                    status: 500,
                    body: "simulated removal failure".into(),
                });
            }
            self.objects
                .lock()
                .unwrap()
                .remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        public_url("https://cdn.test", bucket, key)
    }
}

/// Hands out the queued timestamps in order, then repeats the last one.
pub struct SequenceClock {
    values: Mutex<VecDeque<i64>>,
    last: Mutex<i64>,
}

impl SequenceClock {
    pub fn new(values: &[i64]) -> Self {
        Self {
            values: Mutex::new(values.iter().copied().collect()),
            last: Mutex::new(values.last().copied().unwrap_or_default()),
        }
    }
}

impl Clock for SequenceClock {
    fn now_millis(&self) -> i64 {
        match self.values.lock().unwrap().pop_front() {
            Some(value) => {
                *self.last.lock().unwrap() = value;
                value
            }
            None => *self.last.lock().unwrap(),
        }
    }
}

pub fn service_with_fakes(
    timestamps: &[i64],
) -> (AssetService, Arc<FakeStorage>, Arc<MemoryRecordStore>) {
    let storage = Arc::new(FakeStorage::default());
    let records = Arc::new(MemoryRecordStore::new());
    let service = AssetService::new(storage.clone(), records.clone())
        .with_clock(Arc::new(SequenceClock::new(timestamps)));
    (service, storage, records)
}

pub fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::new_rgb8(32, 24);
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn png_pick(name: &str) -> LocalPick {
    LocalPick::from_bytes(name, png_bytes())
}
