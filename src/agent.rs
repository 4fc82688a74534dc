use crate::accumulator::{ accumulate_with_timeout, DEFAULT_RESPONSE_TIMEOUT };
use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError };
use crate::history::{ trim_history, HistoryError, HistoryStore, MAX_HISTORY_PAIRS };
use crate::llm::chat::{ new_client as new_chat_client, ChatClient };
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::{ ChatMessage, ChatReply, Conversation };

use chrono::Utc;
use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::{ Duration, Instant };
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("AI request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("AI response stream failed: {0}")]
    Stream(#[source] LlmError),

    #[error("AI response timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("message content is empty")]
    EmptyMessage,
}

pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn HistoryStore>,
    prompt_config: RwLock<Arc<PromptConfig>>,
    prompts_path: Option<String>,
    max_pairs: usize,
    response_timeout: Duration,
}

impl ChatAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        prompt_config: Arc<PromptConfig>
    ) -> Self {
        Self {
            chat_client,
            history_store,
            prompt_config: RwLock::new(prompt_config),
            prompts_path: None,
            max_pairs: MAX_HISTORY_PAIRS,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, max_pairs: usize, response_timeout: Duration) -> Self {
        self.max_pairs = max_pairs;
        self.response_timeout = response_timeout;
        self
    }

    pub fn with_prompts_path(mut self, path: &str) -> Self {
        self.prompts_path = Some(path.to_string());
        self
    }

    pub async fn from_args(
        args: &Args,
        history_store: Arc<dyn HistoryStore>
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_config = LlmConfig::from_args(args).map_err(|e|
            format!("Invalid chat LLM type: {}", e)
        )?;
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, Endpoint={}",
            chat_config.llm_type,
            chat_config.model(),
            chat_config.endpoint()
        );

        let prompt_config = prompt::load_prompts(&args.prompts_path).map_err(|e|
            format!("Failed to load prompts file '{}': {}", args.prompts_path, e)
        )?;

        Ok(
            Self::new(chat_client, history_store, prompt_config)
                .with_limits(
                    args.history_max_pairs,
                    Duration::from_secs(args.response_timeout_secs)
                )
                .with_prompts_path(&args.prompts_path)
        )
    }

    pub async fn history(&self, document_id: &str) -> Result<Conversation, AgentError> {
        Ok(self.history_store.get_conversation(document_id).await?)
    }

    /// Appends the user's message, streams the model's answer and stores it.
    ///
    /// The user message is persisted before the model is called; if that
    /// write fails nothing is sent. A failure to store the reply is logged
    /// and reported through `ChatReply::persisted`.
    pub async fn send_message<F>(
        &self,
        document_id: &str,
        content: &str,
        document_context: Option<&str>,
        mut on_fragment: F
    ) -> Result<ChatReply, AgentError>
        where F: FnMut(&str) + Send
    {
        let content = content.trim();
        if content.is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let mut conversation = self.history_store.get_conversation(document_id).await?;
        if !conversation.has_system_message() {
            let system_prompt = self.prompt_config.read().await.render_system_prompt(document_context);
            if !system_prompt.is_empty() {
                conversation.messages.insert(0, ChatMessage::system(system_prompt));
            }
        }

        conversation.messages.push(ChatMessage::user(content));
        conversation.messages = trim_history(&conversation.messages, self.max_pairs);
        self.history_store.save_conversation(&conversation).await?;

        info!(
            "Requesting reply for document {} ({} messages, model {})",
            document_id,
            conversation.messages.len(),
            self.chat_client.get_model()
        );
        // One deadline covers both the request and draining its stream.
        let started = Instant::now();
        let request = self.chat_client.stream_chat(&conversation.messages);
        let stream = match tokio::time::timeout(self.response_timeout, request).await {
            Ok(stream) => stream?,
            Err(_) => {
                warn!(
                    "No response from model for document {} within {:?}",
                    document_id,
                    self.response_timeout
                );
                return Err(AgentError::Timeout(self.response_timeout));
            }
        };
        let remaining = self.response_timeout.saturating_sub(started.elapsed());
        let reply = accumulate_with_timeout(stream, remaining, |fragment, _| {
            on_fragment(fragment)
        }).await.map_err(|e| match e {
            AgentError::Timeout(_) => AgentError::Timeout(self.response_timeout),
            other => other,
        })?;

        if reply.trim().is_empty() {
            warn!("Model returned an empty reply for document {}", document_id);
        }

        conversation.messages.push(ChatMessage::assistant(reply.clone()));
        conversation.messages = trim_history(&conversation.messages, self.max_pairs);

        let persisted = match self.history_store.save_conversation(&conversation).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist reply for document {}: {}", document_id, e);
                false
            }
        };

        Ok(ChatReply {
            document_id: document_id.to_string(),
            content: reply,
            timestamp: Utc::now().timestamp(),
            persisted,
            history_len: conversation.messages.len(),
        })
    }

    pub async fn reload_prompts_if_changed(&self) -> Result<bool, AgentError> {
        let Some(path) = &self.prompts_path else {
            return Ok(false);
        };

        let current = Arc::clone(&*self.prompt_config.read().await);
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *self.prompt_config.write().await = new_config;
                info!("Prompts successfully reloaded from {}", path);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::llm::chat::{ create_streaming_response, FragmentStream };
    use crate::models::chat::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Mutex;

    struct ScriptedClient {
        fragments: Vec<&'static str>,
        gap: Duration,
        calls: AtomicUsize,
        seen: Mutex<Vec<ChatMessage>>,
    }

    impl ScriptedClient {
        fn new(fragments: Vec<&'static str>) -> Self {
            Self {
                fragments,
                gap: Duration::ZERO,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(self.fragments.concat())
        }

        async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock().unwrap() = messages.to_vec();
            let fragments = self.fragments.clone();
            let gap = self.gap;
            Ok(
                create_streaming_response(move |tx| async move {
                    for fragment in fragments {
                        tokio::time::sleep(gap).await;
                        if tx.send(Ok(fragment.to_string())).await.is_err() {
                            return;
                        }
                    }
                })
            )
        }

        fn get_model(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Accepts the first `ok_saves` writes, then fails.
    struct FlakyStore {
        inner: MemoryHistoryStore,
        ok_saves: usize,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for FlakyStore {
        async fn get_conversation(&self, id: &str) -> Result<Conversation, HistoryError> {
            self.inner.get_conversation(id).await
        }

        async fn save_conversation(&self, conversation: &Conversation) -> Result<(), HistoryError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) >= self.ok_saves {
                return Err(HistoryError::UnsupportedType("offline".into()));
            }
            self.inner.save_conversation(conversation).await
        }
    }

    fn prompts() -> Arc<PromptConfig> {
        Arc::new(PromptConfig {
            system_prompt: "sys".into(),
            document_context: "doc: {document}".into(),
            last_loaded: None,
        })
    }

    #[tokio::test]
    async fn reply_is_streamed_and_stored() {
        let client = Arc::new(ScriptedClient::new(vec!["Hi", " there"]));
        let store = Arc::new(MemoryHistoryStore::default());
        let agent = ChatAgent::new(client.clone(), store.clone(), prompts());

        let mut fragments = Vec::new();
        let reply = agent
            .send_message("doc", "hello", Some("body"), |f| fragments.push(f.to_string())).await
            .unwrap();

        assert_eq!(reply.content, "Hi there");
        assert!(reply.persisted);
        assert_eq!(fragments, vec!["Hi", " there"]);

        let sent = client.seen.lock().unwrap().clone();
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, "sys\n\ndoc: body");
        assert_eq!(sent.last().unwrap().content, "hello");

        let stored = store.get_conversation("doc").await.unwrap();
        let roles: Vec<Role> = stored.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn system_prompt_is_added_once() {
        let client = Arc::new(ScriptedClient::new(vec!["ok"]));
        let store = Arc::new(MemoryHistoryStore::default());
        let agent = ChatAgent::new(client, store.clone(), prompts());

        agent.send_message("doc", "one", None, |_| {}).await.unwrap();
        agent.send_message("doc", "two", None, |_| {}).await.unwrap();

        let stored = store.get_conversation("doc").await.unwrap();
        let systems = stored.messages
            .iter()
            .filter(|m| m.role == Role::System)
            .count();
        assert_eq!(systems, 1);
        assert_eq!(stored.messages.len(), 5);
    }

    #[tokio::test]
    async fn history_is_trimmed_to_pair_budget() {
        let client = Arc::new(ScriptedClient::new(vec!["ok"]));
        let store = Arc::new(MemoryHistoryStore::default());
        let agent = ChatAgent::new(client, store.clone(), prompts()).with_limits(
            2,
            Duration::from_secs(2)
        );

        for i in 0..4 {
            agent.send_message("doc", &format!("q{}", i), None, |_| {}).await.unwrap();
        }

        let stored = store.get_conversation("doc").await.unwrap();
        let contents: Vec<&str> = stored.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["sys", "q2", "ok", "q3", "ok"]);
    }

    #[tokio::test]
    async fn user_message_is_persisted_before_request() {
        let client = Arc::new(ScriptedClient::new(vec!["never"]));
        let store = Arc::new(FlakyStore {
            inner: MemoryHistoryStore::default(),
            ok_saves: 0,
            saves: AtomicUsize::new(0),
        });
        let agent = ChatAgent::new(client.clone(), store, prompts());

        let err = agent.send_message("doc", "hello", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, AgentError::History(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_reply_write_is_reported() {
        let client = Arc::new(ScriptedClient::new(vec!["answer"]));
        let store = Arc::new(FlakyStore {
            inner: MemoryHistoryStore::default(),
            ok_saves: 1,
            saves: AtomicUsize::new(0),
        });
        let agent = ChatAgent::new(client, store.clone(), prompts());

        let reply = agent.send_message("doc", "hello", None, |_| {}).await.unwrap();
        assert_eq!(reply.content, "answer");
        assert!(!reply.persisted);

        // The pending user message made it to storage.
        let stored = store.get_conversation("doc").await.unwrap();
        assert_eq!(stored.messages.last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn timeout_keeps_pending_user_message() {
        let mut scripted = ScriptedClient::new(vec!["slow"]);
        scripted.gap = Duration::from_millis(300);
        let store = Arc::new(MemoryHistoryStore::default());
        let agent = ChatAgent::new(Arc::new(scripted), store.clone(), prompts()).with_limits(
            MAX_HISTORY_PAIRS,
            Duration::from_millis(50)
        );

        let err = agent.send_message("doc", "hello", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));

        let stored = store.get_conversation("doc").await.unwrap();
        assert_eq!(stored.messages.last().unwrap().content, "hello");
    }

    /// Never produces a response, as if the provider accepted the
    /// connection and then went quiet.
    struct SilentClient;

    #[async_trait]
    impl ChatClient for SilentClient {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            futures::future::pending().await
        }

        async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
            futures::future::pending().await
        }

        fn get_model(&self) -> String {
            "silent".to_string()
        }
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let store = Arc::new(MemoryHistoryStore::default());
        let agent = ChatAgent::new(Arc::new(SilentClient), store.clone(), prompts()).with_limits(
            MAX_HISTORY_PAIRS,
            Duration::from_millis(100)
        );

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            agent.send_message("doc", "hello", None, |_| {})
        ).await.expect("send_message must give up on its own");

        assert!(matches!(result, Err(AgentError::Timeout(t)) if t == Duration::from_millis(100)));
        let stored = store.get_conversation("doc").await.unwrap();
        assert_eq!(stored.messages.last().unwrap().content, "hello");
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let agent = ChatAgent::new(
            Arc::new(ScriptedClient::new(vec![])),
            Arc::new(MemoryHistoryStore::default()),
            prompts()
        );
        let err = agent.send_message("doc", "   ", None, |_| {}).await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyMessage));
    }
}
