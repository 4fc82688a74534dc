use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, Conversation };
use crate::store::DocumentStore;

pub const CHAT_HISTORY_FIELD: &str = "chat_history";

/// Keeps each transcript in the `chat_history` field of its document.
pub struct DocumentHistoryStore {
    documents: Arc<dyn DocumentStore>,
    collection: String,
}

impl DocumentHistoryStore {
    pub fn new(documents: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            documents,
            collection: collection.trim_matches('/').to_string(),
        }
    }

    fn path(&self, document_id: &str) -> String {
        format!("{}/{}", self.collection, document_id)
    }
}

#[async_trait]
impl HistoryStore for DocumentHistoryStore {
    async fn get_conversation(&self, document_id: &str) -> Result<Conversation, HistoryError> {
        let document = self.documents.get(&self.path(document_id)).await?;
        let raw = document.and_then(|mut doc| doc.fields.remove(CHAT_HISTORY_FIELD));

        let messages = match raw {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(value) =>
                serde_json::from_value::<Vec<ChatMessage>>(value).map_err(|source| {
                    HistoryError::Malformed { id: document_id.to_string(), source }
                })?,
        };

        Ok(Conversation {
            id: document_id.to_string(),
            messages,
        })
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), HistoryError> {
        let value = serde_json::to_value(&conversation.messages).map_err(|source| {
            HistoryError::Malformed { id: conversation.id.clone(), source }
        })?;
        self.documents.update_field(&self.path(&conversation.id), CHAT_HISTORY_FIELD, value).await?;
        Ok(())
    }
}
