pub mod chat;
pub mod proxy;
pub mod retry;

use crate::cli::Args;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Providers speaking the OpenAI chat-completion protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    OpenAI,
    Groq,
    XAI,
}

impl LlmType {
    pub fn default_url(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "https://api.openai.com/v1/chat/completions",
            LlmType::Groq => "https://api.groq.com/openai/v1/chat/completions",
            LlmType::XAI => "https://api.x.ai/v1/chat/completions",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmType::OpenAI => "gpt-4o",
            LlmType::Groq => "llama-3.1-8b-instant",
            LlmType::XAI => "grok-3-latest",
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::OpenAI => "openai",
            LlmType::Groq => "groq",
            LlmType::XAI => "xai",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAI),
            "groq" => Ok(LlmType::Groq),
            "xai" => Ok(LlmType::XAI),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::OpenAI,
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Result<Self, ParseLlmTypeError> {
        Ok(Self {
            llm_type: args.chat_llm_type.parse()?,
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
        })
    }

    pub fn endpoint(&self) -> String {
        self.base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.llm_type.default_url().to_string())
    }

    pub fn model(&self) -> String {
        self.completion_model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.llm_type.default_model().to_string())
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("{0} API key is required")]
    MissingApiKey(LlmType),

    #[error("invalid API key format: {0}")]
    InvalidApiKey(String),

    #[error("no content in provider response")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!("OpenAI".parse::<LlmType>().unwrap(), LlmType::OpenAI);
        assert_eq!("groq".parse::<LlmType>().unwrap(), LlmType::Groq);
        assert!("ollama".parse::<LlmType>().is_err());
    }

    #[test]
    fn blank_overrides_fall_back_to_defaults() {
        let config = LlmConfig {
            llm_type: LlmType::XAI,
            completion_model: Some("  ".into()),
            base_url: None,
            ..Default::default()
        };
        assert_eq!(config.model(), "grok-3-latest");
        assert_eq!(config.endpoint(), "https://api.x.ai/v1/chat/completions");
    }
}
