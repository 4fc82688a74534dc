pub mod api;
pub mod websocket;

use crate::admin::{ AdminGate, AdminService };
use crate::agent::ChatAgent;
use crate::cli::Args;
use crate::llm::proxy::CompletionProxy;
use std::error::Error;
use std::sync::Arc;

/// Everything request handlers need, shared by the HTTP and WebSocket sides.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
    pub admin: Arc<AdminService>,
    pub gate: Arc<AdminGate>,
    pub proxy: Arc<CompletionProxy>,
}

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.args.http_port {
            api::start_http_server(http_port, self.state.clone(), self.args.clone()).await?;
        }

        websocket::start_ws_server(
            &self.addr,
            Arc::clone(&self.state.agent),
            self.args.server_api_key.clone(),
            self.args.clone()
        ).await
    }
}
