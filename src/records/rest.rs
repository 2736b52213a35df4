use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{EntityRecord, RecordStore, TableSchema};
use crate::assets::EntityKind;
use crate::client::BackendClient;
use crate::error::{RecordError, RecordResult};

#[derive(Debug, Default, Deserialize)]
struct TableErrorBody {
    message: Option<String>,
    details: Option<String>,
}

/// Pull the column name out of a unique-violation detail such as
/// `Key (username)=(sam) already exists.`
fn conflicting_column(details: &str) -> Option<String> {
    let start = details.find("Key (")? + "Key (".len();
    let end = details[start..].find(')')? + start;
    let column = details[start..end].trim();
    if column.is_empty() { None } else { Some(column.to_string()) }
}

/// Table access through the backend's REST dialect (`/rest/v1/<table>`).
#[derive(Clone, Debug)]
pub struct RestRecordStore {
    client: BackendClient,
}

impl RestRecordStore {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    fn table_url(&self, schema: &TableSchema) -> String {
        self.client.endpoint(&format!("rest/v1/{}", schema.table))
    }

    async fn send(
        &self,
        schema: &TableSchema,
        method: Method,
        filters: &[(&str, String)],
        body: Option<&Map<String, Value>>,
    ) -> RecordResult<Vec<Map<String, Value>>> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for (column, value) in filters {
            query.push((column.to_string(), format!("eq.{value}")));
        }
        debug!(table = schema.table, %method, filters = filters.len(), "table request");
        let mut request = self
            .client
            .http()
            .request(method, self.table_url(schema))
            .query(&query)
            .header("Prefer", "return=representation");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.client.authorize(request).await.send().await?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            let text = response.text().await.unwrap_or_default();
            let parsed: TableErrorBody = serde_json::from_str(&text).unwrap_or_default();
            let field = parsed
                .details
                .as_deref()
                .and_then(conflicting_column)
                .unwrap_or_else(|| schema.id_column.to_string());
            return Err(RecordError::Conflict {
                field,
                message: parsed.message.unwrap_or(text),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RecordError::Status {
                table: schema.table.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn current_user(&self, schema: &TableSchema) -> RecordResult<String> {
        self.client
            .user_id()
            .await
            .ok_or_else(|| RecordError::Unauthenticated(schema.table.to_string()))
    }

    fn single(
        kind: EntityKind,
        schema: &TableSchema,
        id: &str,
        rows: Vec<Map<String, Value>>,
    ) -> RecordResult<EntityRecord> {
        let row = rows.into_iter().next().ok_or_else(|| RecordError::NotFound {
            table: schema.table.to_string(),
            id: id.to_string(),
        })?;
        EntityRecord::from_row(kind, row)
    }

    /// Row-level security already pins writes to the signed-in user; refuse
    /// to send a write on behalf of anyone else.
    async fn ensure_owner(&self, schema: &TableSchema, owner_id: &str) -> RecordResult<()> {
        let user = self.current_user(schema).await?;
        if user != owner_id {
            return Err(RecordError::Unauthenticated(schema.table.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn select(&self, kind: EntityKind, id: &str) -> RecordResult<Option<EntityRecord>> {
        let schema = TableSchema::for_kind(kind);
        let rows = self
            .send(&schema, Method::GET, &[(schema.id_column, id.to_string())], None)
            .await?;
        rows.into_iter()
            .next()
            .map(|row| EntityRecord::from_row(kind, row))
            .transpose()
    }

    async fn select_owned(&self, kind: EntityKind, owner_id: &str) -> RecordResult<Vec<EntityRecord>> {
        let schema = TableSchema::for_kind(kind);
        let rows = self
            .send(
                &schema,
                Method::GET,
                &[(schema.owner_column, owner_id.to_string())],
                None,
            )
            .await?;
        rows.into_iter()
            .map(|row| EntityRecord::from_row(kind, row))
            .collect()
    }

    async fn insert(
        &self,
        kind: EntityKind,
        owner_id: &str,
        mut fields: Map<String, Value>,
    ) -> RecordResult<EntityRecord> {
        let schema = TableSchema::for_kind(kind);
        self.ensure_owner(&schema, owner_id).await?;
        fields.insert(schema.owner_column.to_string(), Value::String(owner_id.to_string()));
        let rows = self.send(&schema, Method::POST, &[], Some(&fields)).await?;
        Self::single(kind, &schema, owner_id, rows)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner_id: &str,
        mut patch: Map<String, Value>,
    ) -> RecordResult<EntityRecord> {
        let schema = TableSchema::for_kind(kind);
        self.ensure_owner(&schema, owner_id).await?;
        patch.remove(schema.id_column);
        patch.remove(schema.owner_column);
        let mut filters = vec![(schema.id_column, id.to_string())];
        if schema.owner_column != schema.id_column {
            filters.push((schema.owner_column, owner_id.to_string()));
        }
        let rows = self
            .send(&schema, Method::PATCH, &filters, Some(&patch))
            .await?;
        Self::single(kind, &schema, id, rows)
    }

    async fn delete(&self, kind: EntityKind, id: &str, owner_id: &str) -> RecordResult<()> {
        let schema = TableSchema::for_kind(kind);
        self.ensure_owner(&schema, owner_id).await?;
        let mut filters = vec![(schema.id_column, id.to_string())];
        if schema.owner_column != schema.id_column {
            filters.push((schema.owner_column, owner_id.to_string()));
        }
        let rows = self.send(&schema, Method::DELETE, &filters, None).await?;
        if rows.is_empty() {
            return Err(RecordError::NotFound {
                table: schema.table.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::client::Session;
    use crate::stub_backend::StubBackend;

    async fn signed_in(backend: &StubBackend, user_id: &str) -> RestRecordStore {
        let client = backend.client();
        client
            .set_session(Some(Session {
                access_token: format!("token-{user_id}"),
                user_id: user_id.to_string(),
            }))
            .await;
        RestRecordStore::new(client)
    }

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn extracts_unique_violation_column() {
        assert_eq!(
            conflicting_column("Key (username)=(sam) already exists.").as_deref(),
            Some("username")
        );
        assert_eq!(conflicting_column("no key here"), None);
        assert_eq!(conflicting_column("Key ()=(x)"), None);
    }

    #[tokio::test]
    async fn writes_require_matching_session() {
        let client = BackendClient::new("http://127.0.0.1:9", "anon");
        let store = RestRecordStore::new(client);
        let err = store
            .delete(EntityKind::Sale, "abc", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn select_filters_by_id() {
        let backend = StubBackend::start(vec![
            (
                StatusCode::OK,
                json!([{ "id": "abc", "user_id": "u1", "title": "Bike", "main_image_url": "abc/main.jpg" }]),
            ),
            (StatusCode::OK, json!([])),
        ])
        .await;
        let store = RestRecordStore::new(backend.client());

        let record = store.select(EntityKind::Sale, "abc").await.unwrap().unwrap();
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.main_image.as_deref(), Some("abc/main.jpg"));
        assert!(store.select(EntityKind::Sale, "gone").await.unwrap().is_none());

        let requests = backend.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].path, "/rest/v1/listings");
        assert_eq!(
            requests[0].query_pairs(),
            vec![pair("select", "*"), pair("id", "eq.abc")]
        );
        assert_eq!(requests[0].header("prefer"), Some("return=representation"));
        assert_eq!(requests[1].query_pairs()[1], pair("id", "eq.gone"));
    }

    #[tokio::test]
    async fn update_is_scoped_to_owner_and_strips_key_columns() {
        let backend = StubBackend::start(vec![(
            StatusCode::OK,
            json!([{ "id": "abc", "user_id": "u1", "title": "New" }]),
        )])
        .await;
        let store = signed_in(&backend, "u1").await;
        let patch = json!({ "id": "other", "user_id": "u2", "title": "New" })
            .as_object()
            .cloned()
            .unwrap();

        let record = store.update(EntityKind::Sale, "abc", "u1", patch).await.unwrap();
        assert_eq!(record.fields["title"], json!("New"));

        let requests = backend.requests();
        assert_eq!(requests[0].method, Method::PATCH);
        assert_eq!(
            requests[0].query_pairs(),
            vec![pair("select", "*"), pair("id", "eq.abc"), pair("user_id", "eq.u1")]
        );
        assert_eq!(requests[0].json(), json!({ "title": "New" }));
        assert_eq!(requests[0].header("authorization"), Some("Bearer token-u1"));
    }

    #[tokio::test]
    async fn profile_conflict_names_the_taken_column() {
        let backend = StubBackend::start(vec![
            (
                StatusCode::CONFLICT,
                json!({
                    "code": "23505",
                    "message": "duplicate key value violates unique constraint",
                    "details": "Key (username)=(sam) already exists.",
                }),
            ),
            (StatusCode::CONFLICT, json!({ "message": "duplicate key" })),
        ])
        .await;
        let store = signed_in(&backend, "u1").await;
        let fields = json!({ "username": "sam" }).as_object().cloned().unwrap();

        let err = store
            .insert(EntityKind::Avatar, "u1", fields.clone())
            .await
            .unwrap_err();
        match err {
            RecordError::Conflict { field, message } => {
                assert_eq!(field, "username");
                assert_eq!(message, "duplicate key value violates unique constraint");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let err = store.insert(EntityKind::Avatar, "u1", fields).await.unwrap_err();
        assert!(matches!(err, RecordError::Conflict { ref field, .. } if field == "id"));

        let requests = backend.requests();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].path, "/rest/v1/profiles");
        assert_eq!(requests[0].json(), json!({ "username": "sam", "id": "u1" }));
    }

    #[tokio::test]
    async fn delete_of_missing_row_is_not_found() {
        let backend = StubBackend::start(vec![(StatusCode::OK, json!([]))]).await;
        let store = signed_in(&backend, "u1").await;
        let err = store.delete(EntityKind::WantToBuy, "abc", "u1").await.unwrap_err();
        assert!(matches!(err, RecordError::NotFound { .. }));
        let requests = backend.requests();
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, "/rest/v1/want_to_buy");
    }
}
