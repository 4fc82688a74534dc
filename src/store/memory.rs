use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::{ BTreeMap, HashMap };
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::store::{ split_path, Document, DocumentStore, Fields, StoreError };

/// Process-local store, used for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
}

impl MemoryStore {
    pub async fn insert(&self, collection: &str, id: &str, fields: Fields) {
        self.collections
            .write().await
            .entry(collection.trim_matches('/').to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        Ok(
            collections
                .get(collection.trim_matches('/'))
                .map(|docs| {
                    docs.iter()
                        .map(|(id, fields)| Document { id: id.clone(), fields: fields.clone() })
                        .collect()
                })
                .unwrap_or_default()
        )
    }

    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let (collection, id) = split_path(path)?;
        let collections = self.collections.read().await;
        Ok(
            collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .map(|fields| Document { id: id.to_string(), fields: fields.clone() })
        )
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.insert(collection, &id, fields).await;
        Ok(id)
    }

    async fn update_field(&self, path: &str, field: &str, value: JsonValue) -> Result<(), StoreError> {
        let (collection, id) = split_path(path)?;
        self.collections
            .write().await
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }
}
