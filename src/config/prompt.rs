use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

#[derive(Debug)]
pub enum PromptError {
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PromptConfig {
    #[serde(default)]
    pub system_prompt: String,
    /// Appended to the system prompt when the client sends document text.
    /// `{document}` is replaced with that text.
    #[serde(default)]
    pub document_context: String,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

impl PromptConfig {
    pub fn render_system_prompt(&self, document: Option<&str>) -> String {
        let mut prompt = self.system_prompt.trim().to_string();
        let document = document.map(str::trim).filter(|d| !d.is_empty());

        if let Some(text) = document {
            if !self.document_context.is_empty() {
                if !prompt.is_empty() {
                    prompt.push_str("\n\n");
                }
                prompt.push_str(&self.document_context.replace("{document}", text));
            }
        }
        prompt
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<Arc<PromptConfig>, PromptError> {
    let mut config: PromptConfig = serde_json::from_str(json)?;
    config.last_loaded = Some(SystemTime::now());
    Ok(Arc::new(config))
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path)?;
    load_prompts_from_str(&file_content)
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        match current_config.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Prompts file changed, reloading...");
                return Ok(Some(load_prompts(path)?));
            }
            None => {
                info!("No last_loaded timestamp, reloading prompts...");
                return Ok(Some(load_prompts(path)?));
            }
        }
    }
    Ok(None)
}
