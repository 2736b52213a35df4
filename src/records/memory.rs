use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{EntityRecord, RecordStore, TableSchema};
use crate::assets::EntityKind;
use crate::error::{RecordError, RecordResult};

/// Columns that must stay unique per table, like the hosted schema's
/// unique constraints.
const UNIQUE_COLUMNS: &[(&str, &str)] = &[("profiles", "username")];

/// Process-local table store for local mode and tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    rows: Mutex<BTreeMap<(EntityKind, String), Map<String, Value>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(kind: EntityKind, id: &str) -> RecordError {
        RecordError::NotFound {
            table: TableSchema::for_kind(kind).table.to_string(),
            id: id.to_string(),
        }
    }

    fn check_unique(
        rows: &BTreeMap<(EntityKind, String), Map<String, Value>>,
        kind: EntityKind,
        id: &str,
        candidate: &Map<String, Value>,
    ) -> RecordResult<()> {
        let table = TableSchema::for_kind(kind).table;
        for (unique_table, column) in UNIQUE_COLUMNS {
            if *unique_table != table {
                continue;
            }
            let Some(value) = candidate.get(*column).filter(|value| !value.is_null()) else {
                continue;
            };
            let taken = rows.iter().any(|((row_kind, row_id), row)| {
                *row_kind == kind && row_id != id && row.get(*column) == Some(value)
            });
            if taken {
                return Err(RecordError::Conflict {
                    field: column.to_string(),
                    message: format!("duplicate key value violates unique constraint on {column}"),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn select(&self, kind: EntityKind, id: &str) -> RecordResult<Option<EntityRecord>> {
        let rows = self.rows.lock().await;
        rows.get(&(kind, id.to_string()))
            .cloned()
            .map(|row| EntityRecord::from_row(kind, row))
            .transpose()
    }

    async fn select_owned(&self, kind: EntityKind, owner_id: &str) -> RecordResult<Vec<EntityRecord>> {
        let rows = self.rows.lock().await;
        let mut records = Vec::new();
        for ((row_kind, _), row) in rows.iter() {
            if *row_kind != kind {
                continue;
            }
            let record = EntityRecord::from_row(kind, row.clone())?;
            if record.owner_id == owner_id {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn insert(
        &self,
        kind: EntityKind,
        owner_id: &str,
        mut fields: Map<String, Value>,
    ) -> RecordResult<EntityRecord> {
        let schema = TableSchema::for_kind(kind);
        fields.insert(schema.owner_column.to_string(), Value::String(owner_id.to_string()));
        let id = match fields.get(schema.id_column).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        fields.insert(schema.id_column.to_string(), Value::String(id.clone()));

        let mut rows = self.rows.lock().await;
        if rows.contains_key(&(kind, id.clone())) {
            return Err(RecordError::Conflict {
                field: schema.id_column.to_string(),
                message: format!("{} `{id}` already exists", schema.table),
            });
        }
        Self::check_unique(&rows, kind, &id, &fields)?;
        rows.insert((kind, id), fields.clone());
        EntityRecord::from_row(kind, fields)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner_id: &str,
        patch: Map<String, Value>,
    ) -> RecordResult<EntityRecord> {
        let schema = TableSchema::for_kind(kind);
        let mut rows = self.rows.lock().await;
        let mut row = match rows.get(&(kind, id.to_string())) {
            Some(row) if EntityRecord::from_row(kind, row.clone())?.owner_id == owner_id => {
                row.clone()
            }
            _ => return Err(Self::not_found(kind, id)),
        };
        for (column, value) in patch {
            if column == schema.id_column || column == schema.owner_column {
                continue;
            }
            row.insert(column, value);
        }
        Self::check_unique(&rows, kind, id, &row)?;
        rows.insert((kind, id.to_string()), row.clone());
        EntityRecord::from_row(kind, row)
    }

    async fn delete(&self, kind: EntityKind, id: &str, owner_id: &str) -> RecordResult<()> {
        let mut rows = self.rows.lock().await;
        let key = (kind, id.to_string());
        let owned = match rows.get(&key) {
            Some(row) => EntityRecord::from_row(kind, row.clone())?.owner_id == owner_id,
            None => false,
        };
        if !owned {
            return Err(Self::not_found(kind, id));
        }
        rows.remove(&key);
        Ok(())
    }
}
