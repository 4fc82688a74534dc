mod document;
mod memory;
mod redis;
pub mod trim;

pub use document::DocumentHistoryStore;
pub use memory::MemoryHistoryStore;
pub use redis::RedisHistoryStore;
pub use trim::{ trim_history, MAX_HISTORY_PAIRS };

use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation, Role };
use crate::store::{ DocumentStore, StoreError };

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("document store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed transcript for '{id}': {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported history store type: {0}")]
    UnsupportedType(String),
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get_conversation(&self, document_id: &str) -> Result<Conversation, HistoryError>;

    /// Replaces the stored transcript with `conversation.messages`.
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), HistoryError>;

    async fn add_message(
        &self,
        document_id: &str,
        role: Role,
        content: &str
    ) -> Result<(), HistoryError> {
        let mut conversation = self.get_conversation(document_id).await?;
        conversation.messages.push(ChatMessage::new(role, content));
        self.save_conversation(&conversation).await
    }
}

pub fn create_history_store(
    args: &Args,
    documents: Arc<dyn DocumentStore>
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match args.history_type.to_lowercase().as_str() {
        "document" => Ok(Arc::new(DocumentHistoryStore::new(documents, &args.history_collection))),
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryHistoryStore::default())),
        other => Err(HistoryError::UnsupportedType(other.to_string())),
    }
}

pub fn initialize_history_store(
    args: &Args,
    documents: Arc<dyn DocumentStore>
) -> Result<Arc<dyn HistoryStore>, HistoryError> {
    match args.history_type.to_lowercase().as_str() {
        "redis" => info!("Chat history will be stored in redis at {}", args.history_host),
        "document" =>
            info!(
                "Chat history will be stored on '{}' documents in the {} store",
                args.history_collection,
                args.store_type
            ),
        other => info!("Chat history will be stored in: {}", other),
    }
    create_history_store(args, documents)
}
