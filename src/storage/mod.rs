//! Object storage port.
//!
//! Backends:
//! - [`RemoteObjectStorage`]: the hosted storage REST API
//! - [`LocalObjectStorage`]: a directory on disk, served by the tool server in local mode

mod local;
mod remote;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::StorageResult;

pub use local::LocalObjectStorage;
pub use remote::RemoteObjectStorage;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write `data` at `bucket/key`, overwriting any existing object.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Remove the given keys. Missing objects are not an error.
    async fn remove(&self, bucket: &str, keys: &[String]) -> StorageResult<()>;

    /// Every key under `prefix` (recursively), bucket-relative.
    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>>;

    fn public_url(&self, bucket: &str, key: &str) -> String;
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
