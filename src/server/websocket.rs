use crate::agent::ChatAgent;
use crate::cli::Args;
use crate::models::websocket::{ ClientMessage, ServerMessage };

use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::collections::HashMap;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::mpsc;

use tokio_tungstenite::{ accept_hdr_async, WebSocketStream };
use tokio_tungstenite::tungstenite::handshake::server::{ Request, Response, ErrorResponse };
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_rustls::TlsAcceptor;

use rustls::ServerConfig;
use rustls::pki_types::{ CertificateDer, PrivateKeyDer };
use rustls_pemfile::{ certs, pkcs8_private_keys };

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use hmac::{ Hmac, Mac };
use sha2::Sha256;
use chrono::Utc;
use url::form_urlencoded;

use log::{ info, warn, error };
use futures::{ SinkExt, StreamExt };

type HmacSha256 = Hmac<Sha256>;

const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
const MAX_CLOCK_SKEW_SECS: u64 = 300;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)));
}

fn load_tls_config(
    cert_path: &str,
    key_path: &str
) -> Result<Arc<ServerConfig>, Box<dyn Error + Send + Sync>> {
    let cert_file = File::open(cert_path).map_err(|e|
        format!("Failed to open TLS certificate file '{}': {}", cert_path, e)
    )?;
    let key_file = File::open(key_path).map_err(|e|
        format!("Failed to open TLS key file '{}': {}", key_path, e)
    )?;

    let mut cert_reader = BufReader::new(cert_file);
    let mut key_reader = BufReader::new(key_file);
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(|e| format!("Failed to read certificate(s): {}", e))?;

    let key = match pkcs8_private_keys(&mut key_reader).next() {
        Some(Ok(k)) => PrivateKeyDer::Pkcs8(k),
        Some(Err(e)) => {
            return Err(format!("Error reading private key: {}", e).into());
        }
        None => {
            return Err("No PKCS8 private key found in key file".into());
        }
    };

    let config = ServerConfig::builder().with_no_client_auth().with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

pub fn sign_timestamp(secret: &str, ts: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(ts.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks the `ts`/`sig` pair of a handshake against the shared secret.
pub fn verify_signature(
    secret: &str,
    ts: Option<&str>,
    sig: Option<&str>,
    now: i64
) -> Result<(), &'static str> {
    let (Some(ts), Some(sig)) = (ts, sig) else {
        return Err("missing ts/sig");
    };

    let ts_i: i64 = ts.parse().map_err(|_| "timestamp out of range")?;
    if now.abs_diff(ts_i) > MAX_CLOCK_SKEW_SECS {
        return Err("timestamp out of range");
    }

    let sig_bytes = hex::decode(sig).map_err(|_| "bad signature")?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| "bad signature")?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&sig_bytes).map_err(|_| "bad signature")
}

fn unauthorized(message: &str) -> ErrorResponse {
    let mut res = ErrorResponse::new(Some(message.to_string()));
    *res.status_mut() = StatusCode::UNAUTHORIZED;
    res
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<ChatAgent>,
    api_key: Option<String>,
    args: Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    let protocol = if args.enable_tls && args.tls_cert_path.is_some() && args.tls_key_path.is_some() {
        "wss"
    } else {
        "ws"
    };
    info!("{} server listening on: {}", protocol.to_uppercase(), addr);

    let tls_acceptor = if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let config = load_tls_config(cert_path, key_path)?;
                Some(TlsAcceptor::from(config))
            }
            (Some(_), None) | (None, Some(_)) => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("Missing TLS certificate or key path".into());
            }
            (None, None) => {
                error!("--enable-tls was set but no certificate/key paths provided.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        info!("TLS not enabled. Running plain WebSocket (WS) server.");
        None
    };

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);
        let required_api_key = api_key.clone();
        let tls_acceptor_clone = tls_acceptor.clone();

        tokio::spawn(async move {
            let process_result = if let Some(acceptor) = tls_acceptor_clone {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        info!("TLS handshake successful for {}", peer);
                        process_connection(peer, tls_stream, agent_clone, required_api_key).await
                    }
                    Err(e) => {
                        error!("TLS handshake error for {}: {}", peer, e);
                        Err(Box::new(e) as Box<dyn Error + Send + Sync>)
                    }
                }
            } else {
                process_connection(peer, stream, agent_clone, required_api_key).await
            };

            if let Err(e) = process_result {
                error!("Failed to process connection for {}: {}", peer, e);
            }
        });
    }
}

async fn process_connection<S>(
    peer: SocketAddr,
    stream: S,
    agent: Arc<ChatAgent>,
    required_api_key: Option<String>
) -> Result<(), Box<dyn Error + Send + Sync>>
    where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
{
    let auth_callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let secret = match &required_api_key {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Ok(response);
            }
        };

        let qs = req.uri().query().unwrap_or("");
        let params: HashMap<String, String> = form_urlencoded
            ::parse(qs.as_bytes())
            .into_owned()
            .collect();

        let ts = params
            .get("ts")
            .or_else(|| params.get("X-Api-Ts"))
            .map(|s| s.as_str());
        let sig = params
            .get("sig")
            .or_else(|| params.get("X-Api-Sign"))
            .map(|s| s.as_str());

        match verify_signature(secret, ts, sig, Utc::now().timestamp()) {
            Ok(()) => Ok(response),
            Err(reason) => {
                warn!("Rejected handshake from {}: {}", peer, reason);
                Err(unauthorized(reason))
            }
        }
    };

    match accept_hdr_async(stream, auth_callback).await {
        Ok(ws) => {
            handle_connection(peer, ws, agent).await;
            Ok(())
        }
        Err(e) => {
            error!("Handshake failed for {}: {}", peer, e);
            Err(Box::new(e) as _)
        }
    }
}

pub async fn handle_connection<S>(peer: SocketAddr, websocket: WebSocketStream<S>, agent: Arc<ChatAgent>)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();

    while let Some(msg) = rx.next().await {
        let message = match msg {
            Ok(message) => message,
            Err(e) => {
                error!("WebSocket error from {}: {}", peer, e);
                break;
            }
        };

        if message.len() > MAX_MESSAGE_SIZE {
            warn!(
                "Message from {} exceeds size limit ({} > {})",
                peer,
                message.len(),
                MAX_MESSAGE_SIZE
            );
            let error_msg = ServerMessage::Error { message: "Message too large".to_string() };
            if tx.send(Message::Text(error_msg.to_json())).await.is_err() {
                error!("Failed to send size limit error to {}", peer);
            }
            break;
        }

        match message {
            Message::Text(text) => {
                let (document_id, content, context) = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Chat { document_id, content, context }) => (
                        document_id,
                        content,
                        context,
                    ),
                    Err(e) => {
                        warn!("Invalid message from {}: {}", peer, e);
                        let error_msg = ServerMessage::Error {
                            message: format!("Invalid message format: {}", e),
                        };
                        if tx.send(Message::Text(error_msg.to_json())).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                if tx.send(Message::Text(ServerMessage::Processing.to_json())).await.is_err() {
                    error!("Error sending processing status to {}", peer);
                    break;
                }

                let (updates_tx, mut updates_rx) = mpsc::unbounded_channel::<ServerMessage>();
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    let fragments = updates_tx.clone();
                    let result = agent.send_message(
                        &document_id,
                        &content,
                        context.as_deref(),
                        move |fragment| {
                            let _ = fragments.send(ServerMessage::Partial {
                                content: fragment.to_string(),
                            });
                        }
                    ).await;

                    let last = match result {
                        Ok(reply) =>
                            ServerMessage::Done {
                                content: reply.content,
                                timestamp: reply.timestamp,
                                persisted: reply.persisted,
                            },
                        Err(e) => {
                            error!("Chat for document {} failed: {}", document_id, e);
                            ServerMessage::Error { message: e.to_string() }
                        }
                    };
                    let _ = updates_tx.send(last);
                });

                let mut client_gone = false;
                while let Some(update) = updates_rx.recv().await {
                    if let Err(e) = tx.send(Message::Text(update.to_json())).await {
                        error!("Error sending update to {}: {}", peer, e);
                        client_gone = true;
                        break;
                    }
                }
                if client_gone {
                    break;
                }
            }
            Message::Ping(data) => {
                if tx.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => {
                info!("Client {} disconnected", peer);
                break;
            }
            _ => {}
        }
    }

    info!("Connection closed: {}", peer);
}
