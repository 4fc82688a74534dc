mod firestore;
mod memory;
pub mod value;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use serde_json::{ Map, Value as JsonValue };
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;

pub type Fields = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("document store returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid document path '{0}'")]
    InvalidPath(String),

    #[error("failed to decode document '{id}': {message}")]
    Decode {
        id: String,
        message: String,
    },

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error("unsupported document store type: {0}")]
    UnsupportedType(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Deserializes the fields into `T`, exposing the document id as `id`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.entry("id").or_insert_with(|| JsonValue::String(self.id.clone()));
        serde_json::from_value(JsonValue::Object(fields)).map_err(|e| StoreError::Decode {
            id: self.id.clone(),
            message: e.to_string(),
        })
    }
}

/// Hosted document database, addressed by slash-separated paths
/// (`customers/{id}/payments`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Adds a document with a generated id and returns that id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Sets one top-level field, creating the document when needed.
    async fn update_field(&self, path: &str, field: &str, value: JsonValue) -> Result<(), StoreError>;
}

/// Splits `collection/.../id` into its collection path and document id.
pub fn split_path(path: &str) -> Result<(&str, &str), StoreError> {
    let trimmed = path.trim_matches('/');
    let (collection, id) = trimmed
        .rsplit_once('/')
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    if collection.is_empty() || id.is_empty() || collection.split('/').count() % 2 == 0 {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok((collection, id))
}

pub async fn create_document_store(args: &Args) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match args.store_type.to_lowercase().as_str() {
        "firestore" => {
            let project_id = args.firestore_project_id
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    StoreError::MissingConfig(
                        "FIRESTORE_PROJECT_ID is required for the firestore store".to_string()
                    )
                })?;
            let store = FirestoreStore::connect(
                project_id,
                args.firestore_sa_key_path.as_deref(),
                args.firestore_emulator_host.as_deref()
            ).await?;
            info!("Document store: firestore project '{}'", project_id);
            Ok(Arc::new(store))
        }
        "memory" => {
            info!("Document store: in-memory (data is lost on restart)");
            Ok(Arc::new(MemoryStore::default()))
        }
        other => Err(StoreError::UnsupportedType(other.to_string())),
    }
}
