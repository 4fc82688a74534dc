use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, warn };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ create_streaming_response, ChatClient, FragmentStream, SseLineBuffer };
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::ChatMessage;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OpenAIMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAIDelta {
    content: Option<String>,
}

/// One decoded server-sent-event line.
#[derive(Debug, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    if data.is_empty() {
        return SseEvent::Skip;
    }

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(resp) => {
            let mut content = String::new();
            let mut stopped = false;
            for choice in resp.choices {
                if let Some(text) = choice.delta.content {
                    content.push_str(&text);
                }
                if choice.finish_reason.as_deref() == Some("stop") {
                    stopped = true;
                }
            }
            if !content.is_empty() {
                SseEvent::Fragment(content)
            } else if stopped {
                SseEvent::Done
            } else {
                SseEvent::Skip
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            SseEvent::Skip
        }
    }
}

impl OpenAIChatClient {
    pub fn new(api_key: &str, model: String, url: String) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                LlmError::InvalidApiKey(e.to_string())
            )?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self { http, model, url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey(config.llm_type))?;

        Self::new(api_key, config.model(), config.endpoint())
    }

    fn request(&self, messages: &[ChatMessage], stream: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            stream: stream.then_some(true),
        }
    }
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(LlmError::Status { status, body })
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let req = self.request(messages, false);
        let resp = self.http.post(&self.url).json(&req).send().await?;
        let resp: OpenAIResponse = error_for_status(resp).await?.json().await?;

        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }

    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream, LlmError> {
        let req = self.request(messages, true);
        let resp = self.http.post(&self.url).json(&req).send().await?;
        let resp = error_for_status(resp).await?;

        Ok(
            create_streaming_response(move |tx| async move {
                let mut body = resp.bytes_stream();
                let mut lines = SseLineBuffer::default();

                while let Some(chunk) = body.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            warn!("Stream body error: {}", e);
                            let _ = tx.send(Err(LlmError::Http(e))).await;
                            return;
                        }
                    };
                    for line in lines.push(&chunk) {
                        match parse_sse_line(&line) {
                            SseEvent::Fragment(text) => {
                                if tx.send(Ok(text)).await.is_err() {
                                    debug!("Fragment receiver dropped, abandoning stream");
                                    return;
                                }
                            }
                            SseEvent::Done => {
                                return;
                            }
                            SseEvent::Skip => {}
                        }
                    }
                }

                if let Some(SseEvent::Fragment(text)) = lines.finish().map(|l| parse_sse_line(&l)) {
                    let _ = tx.send(Ok(text)).await;
                }
            })
        )
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}
