use crate::admin::export::Dataset;
use crate::admin::AdminError;
use crate::agent::AgentError;
use crate::cli::Args;
use crate::server::AppState;
use std::error::Error;
use std::net::SocketAddr;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ Path, State },
    response::{ IntoResponse, Redirect, Response },
    http::{ header, HeaderMap, StatusCode },
};
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use tower_http::cors::{ Any, CorsLayer };
use log::{ info, warn, error };

pub const IDENTITY_HEADER: &str = "x-user-id";

#[derive(Deserialize)]
pub struct ChatRequest {
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Deserialize)]
pub struct ConversionRequest {
    pub user_id: String,
    pub file_name: String,
    #[serde(default)]
    pub conversion_type: String,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { success: false, message: message.into() })).into_response()
}

fn agent_error_response(e: AgentError) -> Response {
    let status = match &e {
        AgentError::EmptyMessage => StatusCode::BAD_REQUEST,
        AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        AgentError::Llm(_) | AgentError::Stream(_) => StatusCode::BAD_GATEWAY,
        AgentError::History(_) | AgentError::Prompt(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("Chat request failed: {}", e);
    error_response(status, e.to_string())
}

fn admin_error_response(e: AdminError) -> Response {
    let status = match &e {
        AdminError::UnknownDataset(_) => StatusCode::NOT_FOUND,
        AdminError::MissingField(_) => StatusCode::BAD_REQUEST,
        AdminError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    error!("Admin request failed: {}", e);
    error_response(status, e.to_string())
}

/// Non-admins are bounced to the application root.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let identity = headers.get(IDENTITY_HEADER).and_then(|v| v.to_str().ok());
    if state.gate.is_admin(identity) {
        return Ok(());
    }
    warn!("Rejected admin access for identity {:?}", identity);
    Err(Redirect::to("/").into_response())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/documents/{id}/history", get(history_handler))
        .route("/api/documents/{id}/chat", post(chat_handler))
        .route("/api/completions", post(completions_handler))
        .route("/api/conversions", post(conversion_handler))
        .route("/api/admin/stats", get(admin_stats_handler))
        .route("/api/admin/export/{dataset}", get(admin_export_handler))
        .route("/api/reload-prompts", get(reload_prompts_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    http_port: u16,
    state: AppState,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = format!("0.0.0.0:{}", http_port).parse::<SocketAddr>()?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app = router(state);

    match (args.enable_tls, &args.tls_cert_path, &args.tls_key_path) {
        (true, Some(cert_path), Some(key_path)) => {
            let tls_config = axum_server::tls_rustls::RustlsConfig
                ::from_pem_file(cert_path, key_path).await?;

            tokio::spawn(async move {
                let result = axum_server
                    ::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service()).await;

                if let Err(e) = result {
                    error!("HTTPS server error: {}", e);
                }
            });

            info!("HTTPS server started with TLS enabled");
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
            })?;

            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    error!("HTTP server error: {}", e);
                }
            });

            info!("HTTP server started");
        }
    }

    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn history_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.agent.history(&id).await {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => agent_error_response(e),
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>
) -> Response {
    match state.agent.send_message(&id, &req.content, req.context.as_deref(), |_| {}).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => agent_error_response(e),
    }
}

async fn completions_handler(State(state): State<AppState>, Json(payload): Json<JsonValue>) -> Response {
    match state.proxy.forward(payload).await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, [(header::CONTENT_TYPE, upstream.content_type)], upstream.body).into_response()
        }
        Err(e) => {
            error!("Completion proxy failed: {}", e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

async fn conversion_handler(State(state): State<AppState>, Json(req): Json<ConversionRequest>) -> Response {
    match state.admin.record_conversion(&req.user_id, &req.file_name, &req.conversion_type).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => admin_error_response(e),
    }
}

async fn admin_stats_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(redirect) = require_admin(&state, &headers) {
        return redirect;
    }
    match state.admin.dashboard_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => admin_error_response(e),
    }
}

async fn admin_export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(dataset): Path<String>
) -> Response {
    if let Err(redirect) = require_admin(&state, &headers) {
        return redirect;
    }
    let dataset = match dataset.parse::<Dataset>() {
        Ok(d) => d,
        Err(msg) => {
            return admin_error_response(AdminError::UnknownDataset(msg));
        }
    };

    match state.admin.export(dataset).await {
        Ok(export) => {
            let disposition = format!("attachment; filename=\"{}\"", export.file_name);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                export.body,
            ).into_response()
        }
        Err(e) => admin_error_response(e),
    }
}

async fn reload_prompts_handler(State(state): State<AppState>) -> Response {
    match state.agent.reload_prompts_if_changed().await {
        Ok(changed) => {
            let message = if changed { "Prompts reloaded" } else { "Prompts unchanged" };
            Json(ReloadResponse { success: true, message: message.into() }).into_response()
        }
        Err(e) => {
            let body = ReloadResponse { success: false, message: format!("Reload error: {}", e) };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        }
    }
}
