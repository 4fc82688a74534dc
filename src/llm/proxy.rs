use log::info;
use reqwest::{ header::CONTENT_TYPE, Client as HttpClient };
use serde_json::Value as JsonValue;

use super::retry::{ send_with_retry, RetryPolicy };
use super::{ LlmConfig, LlmError };

/// Upstream answer relayed verbatim to the caller.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Forwards chat-completion payloads to the provider, retrying on 429.
pub struct CompletionProxy {
    http: HttpClient,
    url: String,
    api_key: String,
    default_model: String,
    policy: RetryPolicy,
}

impl CompletionProxy {
    pub fn new(url: String, api_key: String, default_model: String, policy: RetryPolicy) -> Self {
        Self {
            http: HttpClient::new(),
            url,
            api_key,
            default_model,
            policy,
        }
    }

    pub fn from_config(config: &LlmConfig, policy: RetryPolicy) -> Result<Self, LlmError> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey(config.llm_type))?;
        Ok(Self::new(config.endpoint(), api_key, config.model(), policy))
    }

    pub async fn forward(&self, mut payload: JsonValue) -> Result<ProxyResponse, LlmError> {
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("model").or_insert_with(|| JsonValue::String(self.default_model.clone()));
        }

        let resp = send_with_retry(&self.policy, || {
            self.http.post(&self.url).bearer_auth(&self.api_key).json(&payload).send()
        }).await?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = resp.text().await?;
        info!("Proxied completion request, upstream status {}", status);

        Ok(ProxyResponse { status, content_type, body })
    }
}
