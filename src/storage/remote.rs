use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::ObjectStorage;
use crate::assets::path::public_url;
use crate::client::BackendClient;
use crate::error::{StorageError, StorageResult};

const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    /// Folders come back without an id.
    id: Option<String>,
}

/// Storage REST API of the hosted backend.
#[derive(Clone, Debug)]
pub struct RemoteObjectStorage {
    client: BackendClient,
}

impl RemoteObjectStorage {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    async fn ensure_success(
        bucket: &str,
        response: reqwest::Response,
    ) -> StorageResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StorageError::Status {
            bucket: bucket.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn list_page(
        &self,
        bucket: &str,
        folder: &str,
        offset: usize,
    ) -> StorageResult<Vec<ListedObject>> {
        let request = self
            .client
            .http()
            .post(self.client.endpoint(&format!("storage/v1/object/list/{bucket}")))
            .json(&json!({
                "prefix": folder,
                "limit": LIST_PAGE_SIZE,
                "offset": offset,
                "sortBy": { "column": "name", "order": "asc" },
            }));
        let response = self.client.authorize(request).await.send().await?;
        let response = Self::ensure_success(bucket, response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ObjectStorage for RemoteObjectStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        debug!(bucket, key, content_type, size = data.len(), "uploading object");
        let request = self
            .client
            .http()
            .post(self.client.endpoint(&format!("storage/v1/object/{bucket}/{key}")))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .body(data);
        let response = self.client.authorize(request).await.send().await?;
        Self::ensure_success(bucket, response).await?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        debug!(bucket, count = keys.len(), "removing objects");
        let request = self
            .client
            .http()
            .delete(self.client.endpoint(&format!("storage/v1/object/{bucket}")))
            .json(&json!({ "prefixes": keys }));
        let response = self.client.authorize(request).await.send().await?;
        Self::ensure_success(bucket, response).await?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<String>> {
        // The list endpoint is one folder deep; walk sub-folders explicitly.
        let mut pending = vec![prefix.trim_matches('/').to_string()];
        let mut keys = Vec::new();
        while let Some(folder) = pending.pop() {
            let mut offset = 0;
            loop {
                let page = self.list_page(bucket, &folder, offset).await?;
                let page_len = page.len();
                for entry in page {
                    let key = if folder.is_empty() {
                        entry.name.clone()
                    } else {
                        format!("{folder}/{}", entry.name)
                    };
                    if entry.id.is_some() {
                        keys.push(key);
                    } else {
                        pending.push(key);
                    }
                }
                if page_len < LIST_PAGE_SIZE {
                    break;
                }
                offset += page_len;
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        public_url(self.client.base_url(), bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{Value, json};

    use super::*;
    use crate::stub_backend::StubBackend;

    fn files(names: impl IntoIterator<Item = String>) -> Value {
        Value::Array(
            names
                .into_iter()
                .map(|name| json!({ "name": name, "id": "obj" }))
                .collect(),
        )
    }

    #[tokio::test]
    async fn list_pages_through_folders() {
        let mut first_page: Vec<Value> = (0..LIST_PAGE_SIZE - 1)
            .map(|index| json!({ "name": format!("{index:04}.jpg"), "id": "obj" }))
            .collect();
        first_page.push(json!({ "name": "nested", "id": null }));
        let backend = StubBackend::start(vec![
            (StatusCode::OK, Value::Array(first_page)),
            (StatusCode::OK, files(["main.jpg".to_string()])),
            (StatusCode::OK, files(["deep.jpg".to_string()])),
        ])
        .await;
        let storage = RemoteObjectStorage::new(backend.client());

        let keys = storage.list("listing-images", "abc/").await.unwrap();
        assert_eq!(keys.len(), LIST_PAGE_SIZE + 1);
        assert!(keys.contains(&"abc/main.jpg".to_string()));
        assert!(keys.contains(&"abc/nested/deep.jpg".to_string()));
        assert!(!keys.contains(&"abc/nested".to_string()));

        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|request| request.method == Method::POST
            && request.path == "/storage/v1/object/list/listing-images"));
        let walked: Vec<(Value, Value)> = requests
            .iter()
            .map(|request| {
                let body = request.json();
                (body["prefix"].clone(), body["offset"].clone())
            })
            .collect();
        assert_eq!(
            walked,
            vec![
                (json!("abc"), json!(0)),
                (json!("abc"), json!(LIST_PAGE_SIZE)),
                (json!("abc/nested"), json!(0)),
            ]
        );
        assert_eq!(requests[0].json()["limit"], json!(LIST_PAGE_SIZE));
    }

    #[tokio::test]
    async fn upload_upserts_with_content_type() {
        let backend = StubBackend::start(vec![(StatusCode::OK, json!({ "Key": "x" }))]).await;
        let client = backend.client();
        client
            .set_session(Some(crate::client::Session {
                access_token: "user-token".into(),
                user_id: "u1".into(),
            }))
            .await;
        let storage = RemoteObjectStorage::new(client);

        storage
            .upload("listing-images", "/abc/main.jpg", b"jpeg".to_vec(), "image/jpeg")
            .await
            .unwrap();

        let requests = backend.requests();
        let upload = &requests[0];
        assert_eq!(upload.method, Method::POST);
        assert_eq!(upload.path, "/storage/v1/object/listing-images/abc/main.jpg");
        assert_eq!(upload.header("x-upsert"), Some("true"));
        assert_eq!(upload.header("content-type"), Some("image/jpeg"));
        assert_eq!(upload.header("apikey"), Some("anon-key"));
        assert_eq!(upload.header("authorization"), Some("Bearer user-token"));
        assert_eq!(&upload.body[..], b"jpeg");
    }

    #[tokio::test]
    async fn remove_sends_prefixes_and_surfaces_status() {
        let backend = StubBackend::start(vec![
            (StatusCode::OK, json!([])),
            (StatusCode::BAD_REQUEST, json!({ "message": "bucket not found" })),
        ])
        .await;
        let storage = RemoteObjectStorage::new(backend.client());
        let keys = vec!["abc/main.jpg".to_string(), "abc/1_0.jpg".to_string()];

        storage.remove("listing-images", &keys).await.unwrap();
        let err = storage.remove("missing", &keys).await.unwrap_err();
        assert!(matches!(err, StorageError::Status { status: 400, ref bucket, .. } if bucket == "missing"));
        storage.remove("listing-images", &[]).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, "/storage/v1/object/listing-images");
        assert_eq!(
            requests[0].json(),
            json!({ "prefixes": ["abc/main.jpg", "abc/1_0.jpg"] })
        );
    }

    #[tokio::test]
    async fn public_urls_point_at_the_backend() {
        let backend = StubBackend::start(Vec::new()).await;
        let storage = RemoteObjectStorage::new(backend.client());
        assert_eq!(
            storage.public_url("avatars", "u1/main.jpg"),
            format!("{}/storage/v1/object/public/avatars/u1/main.jpg", backend.base_url())
        );
    }
}
