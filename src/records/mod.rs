//! Record CRUD over the entity tables.
//!
//! Writes are always scoped by the owner id. One remote call per operation,
//! no retries; errors go back to the caller unchanged.

mod memory;
mod rest;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::assets::EntityKind;
use crate::error::{RecordError, RecordResult};

pub use memory::MemoryRecordStore;
pub use rest::RestRecordStore;

/// Table and column names for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: &'static str,
    pub id_column: &'static str,
    pub owner_column: &'static str,
    pub main_image_column: &'static str,
    pub additional_images_column: Option<&'static str>,
}

impl TableSchema {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Sale => TableSchema {
                table: "listings",
                id_column: "id",
                owner_column: "user_id",
                main_image_column: "main_image_url",
                additional_images_column: Some("additional_images"),
            },
            EntityKind::WantToBuy => TableSchema {
                table: "want_to_buy",
                id_column: "id",
                owner_column: "user_id",
                main_image_column: "main_image_url",
                additional_images_column: Some("additional_images"),
            },
            // A profile row is keyed by, and owned by, the user id.
            EntityKind::Avatar => TableSchema {
                table: "profiles",
                id_column: "id",
                owner_column: "id",
                main_image_column: "avatar_url",
                additional_images_column: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub kind: EntityKind,
    pub id: String,
    pub owner_id: String,
    pub main_image: Option<String>,
    pub additional_images: Vec<String>,
    /// Every column as returned by the table, image columns included.
    pub fields: Map<String, Value>,
}

fn column_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

impl EntityRecord {
    pub fn from_row(kind: EntityKind, row: Map<String, Value>) -> RecordResult<Self> {
        let schema = TableSchema::for_kind(kind);
        let missing = |column: &str| RecordError::MissingColumn {
            table: schema.table.to_string(),
            column: column.to_string(),
        };
        let id = column_text(row.get(schema.id_column)).ok_or_else(|| missing(schema.id_column))?;
        let owner_id = column_text(row.get(schema.owner_column))
            .ok_or_else(|| missing(schema.owner_column))?;
        let main_image = column_text(row.get(schema.main_image_column));
        let additional_images = schema
            .additional_images_column
            .and_then(|column| row.get(column))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|item| !item.trim().is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            kind,
            id,
            owner_id,
            main_image,
            additional_images,
            fields: row,
        })
    }
}

/// Build the column patch that stores image references.
pub fn image_patch(
    kind: EntityKind,
    main_image: Option<Option<&str>>,
    additional_images: Option<&[String]>,
) -> Map<String, Value> {
    let schema = TableSchema::for_kind(kind);
    let mut patch = Map::new();
    if let Some(main) = main_image {
        patch.insert(
            schema.main_image_column.to_string(),
            main.map(|value| Value::String(value.to_string()))
                .unwrap_or(Value::Null),
        );
    }
    if let (Some(column), Some(images)) = (schema.additional_images_column, additional_images) {
        patch.insert(
            column.to_string(),
            Value::Array(images.iter().cloned().map(Value::String).collect()),
        );
    }
    patch
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, kind: EntityKind, id: &str) -> RecordResult<Option<EntityRecord>>;

    async fn select_owned(&self, kind: EntityKind, owner_id: &str) -> RecordResult<Vec<EntityRecord>>;

    /// Insert a row owned by `owner_id`. The store assigns the id unless
    /// `fields` carries one.
    async fn insert(
        &self,
        kind: EntityKind,
        owner_id: &str,
        fields: Map<String, Value>,
    ) -> RecordResult<EntityRecord>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner_id: &str,
        patch: Map<String, Value>,
    ) -> RecordResult<EntityRecord>;

    async fn delete(&self, kind: EntityKind, id: &str, owner_id: &str) -> RecordResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_listing_row() {
        let row = json!({
            "id": 7,
            "user_id": "u1",
            "title": "Bike",
            "main_image_url": "u1/main.jpg",
            "additional_images": ["7/1_0.jpg", "", null],
        });
        let record =
            EntityRecord::from_row(EntityKind::Sale, row.as_object().cloned().unwrap()).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.main_image.as_deref(), Some("u1/main.jpg"));
        assert_eq!(record.additional_images, vec!["7/1_0.jpg".to_string()]);
    }

    #[test]
    fn missing_owner_is_an_error() {
        let row = json!({ "id": "a" });
        let err = EntityRecord::from_row(EntityKind::WantToBuy, row.as_object().cloned().unwrap())
            .unwrap_err();
        assert!(matches!(err, RecordError::MissingColumn { .. }));
    }

    #[test]
    fn profile_patch_has_no_additional_column() {
        let patch = image_patch(
            EntityKind::Avatar,
            Some(Some("u1/main.jpg")),
            Some(&["x".to_string()]),
        );
        assert_eq!(patch.len(), 1);
        assert_eq!(patch["avatar_url"], json!("u1/main.jpg"));

        let cleared = image_patch(EntityKind::Sale, Some(None), None);
        assert_eq!(cleared["main_image_url"], Value::Null);
    }
}
