pub mod accumulator;
pub mod admin;
pub mod agent;
pub mod cli;
pub mod config;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod store;

use admin::{ AdminGate, AdminService };
use agent::ChatAgent;
use cli::Args;
use llm::proxy::CompletionProxy;
use llm::retry::RetryPolicy;
use llm::LlmConfig;
use log::{ info, warn };
use server::{ AppState, Server };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP Port: {:?}", args.http_port);
    info!("Document Store Type: {}", args.store_type);
    if let Some(project) = &args.firestore_project_id {
        info!("Firestore Project: {}", project);
    }
    info!("History Store Type: {}", args.history_type);
    info!("History Max Pairs: {}", args.history_max_pairs);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Response Timeout: {}s", args.response_timeout_secs);
    info!(
        "Proxy Retry: {} attempts, {}ms initial delay",
        args.proxy_max_attempts,
        args.proxy_initial_delay_ms
    );
    info!("Prompts Path: {}", args.prompts_path);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let documents = store::create_document_store(&args).await?;
    let history_store = history::initialize_history_store(&args, Arc::clone(&documents))?;
    let agent = Arc::new(ChatAgent::from_args(&args, history_store).await?);

    let gate = AdminGate::from_csv(&args.admin_ids);
    if gate.is_empty() {
        warn!("ADMIN_IDS is empty; the admin dashboard will reject every identity");
    } else {
        info!("Admin dashboard open to {} identities", gate.len());
    }

    let policy = RetryPolicy {
        max_attempts: args.proxy_max_attempts.max(1),
        initial_delay: Duration::from_millis(args.proxy_initial_delay_ms),
        ..Default::default()
    };
    let chat_config = LlmConfig::from_args(&args)?;
    let proxy = CompletionProxy::from_config(&chat_config, policy)?;

    let state = AppState {
        agent,
        admin: Arc::new(AdminService::new(documents)),
        gate: Arc::new(gate),
        proxy: Arc::new(proxy),
    };

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
