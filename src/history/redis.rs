use async_trait::async_trait;
use crate::models::chat::{ ChatMessage, Conversation };
use crate::history::{ HistoryError, HistoryStore };
use redis::{ AsyncCommands, Client };

pub struct RedisHistoryStore {
    client: Client,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, HistoryError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn key(&self, document_id: &str) -> String {
        format!("{}{}", self.key_prefix, document_id)
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

/// Parses the stored list. One bad entry fails the whole read.
fn decode_entries(document_id: &str, entries: &[String]) -> Result<Vec<ChatMessage>, HistoryError> {
    entries
        .iter()
        .map(|entry| {
            serde_json::from_str::<ChatMessage>(entry).map_err(|source| HistoryError::Malformed {
                id: document_id.to_string(),
                source,
            })
        })
        .collect()
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn get_conversation(&self, document_id: &str) -> Result<Conversation, HistoryError> {
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn.lrange(self.key(document_id), 0, -1).await?;
        let messages = decode_entries(document_id, &json_entries)?;

        Ok(Conversation {
            id: document_id.to_string(),
            messages,
        })
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), HistoryError> {
        let mut conn = self.get_connection().await?;
        let key = self.key(&conversation.id);

        let mut entries = Vec::with_capacity(conversation.messages.len());
        for msg in &conversation.messages {
            entries.push(
                serde_json::to_string(msg).map_err(|source| HistoryError::Malformed {
                    id: conversation.id.clone(),
                    source,
                })?
            );
        }

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !entries.is_empty() {
            pipe.rpush(&key, entries).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
