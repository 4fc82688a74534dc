use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::Conversation;

#[derive(Default)]
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_conversation(&self, document_id: &str) -> Result<Conversation, HistoryError> {
        Ok(
            self.conversations
                .read().await
                .get(document_id)
                .cloned()
                .unwrap_or_else(|| Conversation::empty(document_id))
        )
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), HistoryError> {
        self.conversations.write().await.insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }
}
