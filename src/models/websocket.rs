use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        document_id: String,
        content: String,
        #[serde(default)]
        context: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "done")] Done {
        content: String,
        timestamp: i64,
        persisted: bool,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Every variant is a flat struct of strings and scalars.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","message":"encoding failed"}"#.to_string())
    }
}
