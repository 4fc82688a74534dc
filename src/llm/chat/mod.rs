pub mod openai;

use async_trait::async_trait;
use futures::{ Future, Stream };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use self::openai::OpenAIChatClient;
use super::{ LlmConfig, LlmError };
use crate::models::chat::ChatMessage;

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// Streams the reply as text fragments in arrival order.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError>;

    fn get_model(&self) -> String;
}

/// Runs `response_fn` on its own task and exposes what it sends as a
/// stream. Dropping the stream closes the channel, so the producer's next
/// send fails and the task winds down.
pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
    where
        F: FnOnce(mpsc::Sender<Result<String, LlmError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left once the body ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        Some(rest).filter(|s| !s.is_empty())
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn line_buffer_joins_split_lines() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.push(b":1}\r\n\ndata: [DO"), vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert_eq!(buf.push(b"NE]\n"), vec!["data: [DONE]".to_string()]);
        assert_eq!(buf.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_chars_intact() {
        let mut buf = SseLineBuffer::default();
        let text = "data: héllo\n".as_bytes();
        let (a, b) = text.split_at(8);
        assert!(buf.push(a).is_empty());
        assert_eq!(buf.push(b), vec!["data: héllo".to_string()]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut buf = SseLineBuffer::default();
        buf.push(b"data: tail");
        assert_eq!(buf.finish().as_deref(), Some("data: tail"));
    }

    #[tokio::test]
    async fn streaming_response_forwards_sends() {
        let mut stream = create_streaming_response(|tx| async move {
            let _ = tx.send(Ok("a".to_string())).await;
            let _ = tx.send(Ok("b".to_string())).await;
        });
        let mut out = String::new();
        while let Some(item) = stream.next().await {
            out.push_str(&item.unwrap());
        }
        assert_eq!(out, "ab");
    }
}
