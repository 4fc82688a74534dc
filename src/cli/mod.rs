use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Document Store Args ---
    /// Document database backing users, billing and chat history (firestore, memory)
    #[arg(long, env = "STORE_TYPE", default_value = "firestore")]
    pub store_type: String,

    /// Firestore project id.
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub firestore_project_id: Option<String>,

    /// Path to the Google service account key (JSON) used to obtain Firestore tokens.
    #[arg(long, env = "FIRESTORE_SA_KEY_PATH")]
    pub firestore_sa_key_path: Option<String>,

    /// Firestore emulator host (e.g., localhost:8080). Requests are sent unauthenticated.
    #[arg(long, env = "FIRESTORE_EMULATOR_HOST")]
    pub firestore_emulator_host: Option<String>,

    // --- History Store Args ---
    /// Chat history store type (document, redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "document")]
    pub history_type: String,

    /// Collection holding the documents whose `chat_history` field stores transcripts.
    #[arg(long, env = "HISTORY_COLLECTION", default_value = "documents")]
    pub history_collection: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "history:")]
    pub history_redis_prefix: String,

    /// Number of user/assistant pairs kept in each transcript.
    #[arg(long, env = "HISTORY_MAX_PAIRS", default_value = "15")]
    pub history_max_pairs: usize,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, groq, xai)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Chat-completion endpoint URL. Defaults to the provider's public endpoint.
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Seconds to wait for a streamed reply before giving up on it.
    #[arg(long, env = "RESPONSE_TIMEOUT_SECS", default_value = "11")]
    pub response_timeout_secs: u64,

    // --- Completion Proxy Args ---
    /// Attempts made by the completion proxy when upstream answers HTTP 429.
    #[arg(long, env = "PROXY_MAX_ATTEMPTS", default_value = "3")]
    pub proxy_max_attempts: u32,

    /// Delay before the first proxy retry, in milliseconds. Doubles on each retry.
    #[arg(long, env = "PROXY_INITIAL_DELAY_MS", default_value = "1000")]
    pub proxy_initial_delay_ms: u64,

    // --- Admin Args ---
    /// Comma separated identities allowed to use the admin dashboard.
    #[arg(long, env = "ADMIN_IDS", default_value = "")]
    pub admin_ids: String,

    // --- General App Args ---
    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Port for the HTTP API. The API is disabled when unset.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional secret for WebSocket HMAC handshake authentication. If set, clients must sign requests.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format) for enabling WSS/HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling WSS/HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
