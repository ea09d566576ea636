//! HTTP and WebSocket transport.
//!
//! `GET {api_path}` serves the API descriptor, `POST {api_path}` takes one
//! call, a batch, or an encrypted block holding either, and `{ws_path}`
//! upgrades to the instruction protocol. All three share one dispatcher,
//! envelope codec and session store.

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        DefaultBodyLimit, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::future::join_all;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};
use wiregate_core::config::{BindMode, Config, SecurityConfig};
use wiregate_crypto::KeyStore;

use crate::api::{ApiDescriptor, SignedApi};
use crate::connections::{ConnectionEntry, ConnectionRegistry, Outbound};
use crate::dispatcher::Dispatcher;
use crate::envelope::EnvelopeCodec;
use crate::error::{ErrorCode, GatewayError};
use crate::handler::CallContext;
use crate::handlers;
use crate::protocol::{CallRequest, CallResponse, CallResult, Command, Instruction, WS_TYPE};
use crate::registry::HandlerRegistry;
use crate::session::{HttpSession, HttpSessionStore};
use crate::Result;

/// WebSocket subprotocol offered to clients.
pub const WS_PROTOCOL: &str = "ws4is";

/// Header carrying the client challenge on `GET {api_path}`.
pub const CHALLENGE_HEADER: &str = "x-time";

/// Origins allowed when bound to loopback (any port).
const LOOPBACK_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://127.0.0.1",
    "https://localhost",
    "https://127.0.0.1",
];

/// Shared gateway state.
pub struct GatewayState {
    /// Configuration.
    pub config: Config,

    /// Call dispatcher.
    pub dispatcher: Dispatcher,

    /// Envelope codec.
    pub codec: EnvelopeCodec,

    /// Process key store.
    pub keys: Arc<KeyStore>,

    /// HTTP sessions.
    pub sessions: Arc<HttpSessionStore>,

    /// Open WebSocket connections.
    pub connections: Arc<ConnectionRegistry>,
}

impl GatewayState {
    /// The descriptor with both public keys, signed when `challenge` is set.
    fn published_api(&self, challenge: Option<&str>) -> Result<SignedApi> {
        ApiDescriptor::build(self.dispatcher.registry()).signed(&self.keys, challenge)
    }

    /// Session named by the session cookie, or a new one.
    fn http_session(&self, headers: &HeaderMap) -> Arc<HttpSession> {
        let existing = cookie_value(headers, &self.config.session.cookie_name)
            .and_then(|id| self.sessions.get(&id));
        let session = existing.unwrap_or_else(|| self.sessions.create());
        session.touch();
        session
    }

    /// Session a WebSocket upgrade belongs to: by cookie, then by token.
    fn ws_session(&self, headers: &HeaderMap, query: &HashMap<String, String>) -> Option<Arc<HttpSession>> {
        let session_cfg = &self.config.session;
        if let Some(session) = cookie_value(headers, &session_cfg.cookie_name)
            .and_then(|id| self.sessions.get(&id))
        {
            return Some(session);
        }
        cookie_value(headers, &session_cfg.token_cookie)
            .or_else(|| query.get(&session_cfg.token_query).cloned())
            .and_then(|token| self.connections.resolve_by_token(&token))
    }

    fn session_cookies(&self, session: &HttpSession) -> [(header::HeaderName, String); 2] {
        let session_cfg = &self.config.session;
        [
            (
                header::SET_COOKIE,
                format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Lax",
                    session_cfg.cookie_name,
                    session.id()
                ),
            ),
            (
                header::SET_COOKIE,
                format!(
                    "{}={}; Path=/; SameSite=Lax",
                    session_cfg.token_cookie,
                    session.token()
                ),
            ),
        ]
    }
}

/// The gateway server.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway over `registry`.
    ///
    /// `connections` must be the registry any built-in handlers were given.
    pub fn new(
        config: Config,
        keys: Arc<KeyStore>,
        registry: HandlerRegistry,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::new(registry))
            .with_encryption_required(config.security.encryption_required)
            .with_expose_errors(config.security.expose_errors);
        let sessions = Arc::clone(connections.sessions());

        let state = Arc::new(GatewayState {
            codec: EnvelopeCodec::new(Arc::clone(&keys)),
            dispatcher,
            keys,
            sessions,
            connections,
            config,
        });

        Self { state }
    }

    /// Create a gateway with the built-in handlers, the demo one under `namespace`.
    pub fn with_builtin_handlers(config: Config, keys: Arc<KeyStore>, namespace: &str) -> Result<Self> {
        let connections = Arc::new(ConnectionRegistry::new(Arc::new(HttpSessionStore::new())));
        let paths = [config.gateway.api_path.as_str(), config.gateway.ws_path.as_str()];
        let registry = handlers::builtin_registry(namespace, &paths, Arc::clone(&connections))?;
        Ok(Self::new(config, keys, registry, connections))
    }

    /// Create a gateway from configuration alone: keys per the security
    /// section, built-in handlers in the default namespace.
    pub fn from_config(config: Config) -> Result<Self> {
        let keys = Arc::new(load_keys(&config.security)?);
        Self::with_builtin_handlers(config, keys, handlers::DEFAULT_NAMESPACE)
    }

    /// Shared state.
    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Open WebSocket connections.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.state.connections
    }

    /// Send `instruction` to every open connection.
    pub fn broadcast(&self, instruction: &Instruction) -> usize {
        self.state.connections.broadcast(instruction)
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();

        if self.state.config.gateway.bind != BindMode::Loopback {
            warn!("Gateway binding to {}; it is reachable from the network", addr);
            if !self.state.config.security.encryption_required {
                warn!("Encryption is not required; plain calls are accepted");
            }
        }

        let listener = TcpListener::bind(addr).await?;
        self.serve_with_shutdown(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve on an already bound listener until the task is dropped.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Starting gateway server on {}", listener.local_addr()?);
        let sweeper = self.spawn_sweeper();

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()));

        sweeper.abort();
        info!("Gateway server stopped");
        served
    }

    /// Invalidate idle HTTP sessions in the background.
    fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let sessions = Arc::clone(&self.state.sessions);
        let session_cfg = &self.state.config.session;
        let idle = Duration::from_secs(session_cfg.idle_timeout_secs);
        let every = Duration::from_secs(session_cfg.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = sessions.sweep_expired(idle);
                if swept > 0 {
                    debug!("Swept {} idle sessions", swept);
                }
            }
        })
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let gateway_cfg = &self.state.config.gateway;

        let mut router = Router::new()
            .route(&gateway_cfg.api_path, get(api_handler).post(rpc_handler))
            .route(&gateway_cfg.ws_path, get(ws_handler))
            .route("/health", get(health_handler))
            .layer(DefaultBodyLimit::max(gateway_cfg.max_body_bytes))
            .with_state(Arc::clone(&self.state));

        if gateway_cfg.cors {
            router = router.layer(cors_layer(gateway_cfg.bind));
        }

        router
    }

    /// Address to bind for the configured mode.
    pub fn bind_address(&self) -> SocketAddr {
        bind_address(self.state.config.gateway.bind, self.state.config.gateway.port)
    }
}

/// Load the encryption keypair from the configured files, or generate one.
pub fn load_keys(security: &SecurityConfig) -> Result<KeyStore> {
    match (&security.public_key_file, &security.private_key_file) {
        (Some(public), Some(private)) => {
            info!("Loading encryption keys from {}", public.display());
            let public = std::fs::read_to_string(public)?;
            let private = std::fs::read_to_string(private)?;
            Ok(KeyStore::from_pem(&public, &private)?)
        }
        _ => {
            info!("Generating {}-bit encryption keypair", security.rsa_key_bits);
            Ok(KeyStore::initialize(security.rsa_key_bits)?)
        }
    }
}

fn bind_address(mode: BindMode, port: u16) -> SocketAddr {
    let ip = match mode {
        BindMode::Loopback => [127, 0, 0, 1],
        BindMode::Lan | BindMode::Auto => [0, 0, 0, 0],
    };
    SocketAddr::from((ip, port))
}

fn cors_layer(bind: BindMode) -> CorsLayer {
    let origins = match bind {
        BindMode::Loopback => AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|o| LOOPBACK_ORIGINS.iter().any(|allowed| o.starts_with(allowed)))
                .unwrap_or(false)
        }),
        BindMode::Lan | BindMode::Auto => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(CHALLENGE_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Find a cookie by name across all `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn json_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn failure_response(status: StatusCode, err: &GatewayError, expose: bool) -> Response {
    let body = serde_json::to_string(&CallResult::from_error(err, expose))
        .unwrap_or_else(|_| r#"{"success":false}"#.to_string());
    json_response(status, body)
}

/// `GET {api_path}`: the descriptor, signed over the `x-time` challenge.
async fn api_handler(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let challenge = headers
        .get(CHALLENGE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.published_api(challenge.as_deref()) {
        Ok(api) => Json(api).into_response(),
        Err(e) => {
            error!("Failed to publish API descriptor: {}", e);
            failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &e,
                state.dispatcher.expose_errors(),
            )
        }
    }
}

/// `POST {api_path}`: one call, a batch, or an encrypted block.
async fn rpc_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = state.http_session(&headers);
    let cookies = AppendHeaders(state.session_cookies(&session));
    let expose = state.dispatcher.expose_errors();

    let decoded = std::str::from_utf8(&body)
        .map_err(|e| GatewayError::Protocol(e.to_string()))
        .and_then(|text| state.codec.decode_http(text, session.crypto()));
    let calls = match decoded {
        Ok(calls) => calls,
        Err(e) => {
            debug!("Rejected HTTP request body: {}", e);
            return (cookies, failure_response(StatusCode::BAD_REQUEST, &e, expose)).into_response();
        }
    };

    let ctx = CallContext::new(state.config.gateway.api_path.clone()).with_session(Some(Arc::clone(&session)));
    let responses = state.dispatcher.dispatch_batch(&calls.calls, &ctx).await;

    let encoded = if calls.batch {
        state.codec.encode(&responses, session.crypto())
    } else {
        match responses.first() {
            Some(response) => state.codec.encode(response, session.crypto()),
            None => Err(GatewayError::Protocol("no call in request".to_string())),
        }
    };

    match encoded {
        Ok(body) => (cookies, json_response(StatusCode::OK, body)).into_response(),
        Err(e) => {
            error!("Failed to encode response: {}", e);
            (cookies, failure_response(StatusCode::INTERNAL_SERVER_ERROR, &e, expose)).into_response()
        }
    }
}

/// `GET {ws_path}`: upgrade to the instruction protocol.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    if state.connections.len() >= state.config.gateway.max_connections {
        warn!(
            "Max connections ({}) reached, rejecting upgrade",
            state.config.gateway.max_connections
        );
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let session = state.ws_session(&headers, &query);
    let challenge = query
        .get(&state.config.session.challenge_query)
        .filter(|c| !c.is_empty())
        .cloned();

    ws.protocols([WS_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state, session, challenge))
}

/// Drive one WebSocket connection until either side closes it.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<GatewayState>,
    session: Option<Arc<HttpSession>>,
    challenge: Option<String>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let entry = state.connections.on_open(
        ConnectionEntry::new(state.config.gateway.ws_path.clone(), tx)
            .with_session(session)
            .with_challenge(challenge),
    );

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Outbound::Text(text) => {
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        debug!("WebSocket send failed: {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    if let Some(challenge) = entry.pending_challenge() {
        send_api(&state, &entry, Some(&challenge));
    }

    let recv_state = Arc::clone(&state);
    let recv_entry = Arc::clone(&entry);
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if !handle_frame(&recv_state, &recv_entry, &text).await {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Connection {} closed by peer", recv_entry.id());
                    break;
                }
                Err(e) => {
                    warn!("WebSocket error on {}: {}", recv_entry.id(), e);
                    break;
                }
                _ => {}
            }
        }
    });

    let _ = recv_task.await;
    state.connections.on_close(entry.id());
    drop(entry);
    // Let a queued close frame go out
    let _ = tokio::time::timeout(Duration::from_secs(1), send_task).await;
}

fn send_api(state: &GatewayState, entry: &ConnectionEntry, challenge: Option<&str>) {
    let instruction = match state.published_api(challenge) {
        Ok(api) => serde_json::to_value(api)
            .map(|data| Instruction::new(Command::Api).with_data(data))
            .unwrap_or_else(|e| Instruction::error(ErrorCode::GeneralError, e.to_string())),
        Err(e) => {
            error!("Failed to publish API descriptor: {}", e);
            Instruction::error(e.code(), e.client_message(state.dispatcher.expose_errors()))
        }
    };
    reply(entry, &instruction);
}

fn reply(entry: &ConnectionEntry, instruction: &Instruction) -> bool {
    match entry.send(instruction) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to reply on {}: {}", entry.id(), e);
            false
        }
    }
}

/// Handle one inbound text frame. Returns false once the connection should close.
async fn handle_frame(state: &GatewayState, entry: &ConnectionEntry, text: &str) -> bool {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Malformed frame on {}: {}", entry.id(), e);
            return reply(entry, &Instruction::error(ErrorCode::GeneralError, "Malformed instruction"));
        }
    };

    if value.get("type").and_then(Value::as_str).unwrap_or(WS_TYPE) != WS_TYPE {
        debug!("Ignoring non-ws frame on {}", entry.id());
        return true;
    }

    let instruction: Instruction = match serde_json::from_value(value) {
        Ok(instruction) => instruction,
        Err(e) => {
            debug!("Unknown instruction on {}: {}", entry.id(), e);
            return reply(entry, &Instruction::error(ErrorCode::GeneralError, "Unknown instruction"));
        }
    };

    match instruction.cmd {
        Command::Welcome | Command::Echo => {
            reply(entry, &Instruction::new(instruction.cmd).with_data(instruction.data))
        }
        Command::Api => {
            let challenge = entry.pending_challenge();
            send_api(state, entry, challenge.as_deref());
            true
        }
        Command::Bye => {
            reply(entry, &Instruction::new(Command::Bye));
            let _ = entry.send_raw(Outbound::Close);
            false
        }
        Command::Data | Command::Enc => {
            let calls = match instruction.calls() {
                Ok(calls) => calls,
                Err(e) => {
                    debug!("Bad call list on {}: {}", entry.id(), e);
                    return reply(entry, &Instruction::error(e.code(), "Malformed call list"));
                }
            };
            let responses = dispatch_calls(state, entry, calls, instruction.cmd == Command::Enc).await;
            match Instruction::responses(&responses) {
                Ok(data) => reply(entry, &data),
                Err(e) => {
                    error!("Failed to encode responses on {}: {}", entry.id(), e);
                    reply(
                        entry,
                        &Instruction::error(e.code(), e.client_message(state.dispatcher.expose_errors())),
                    )
                }
            }
        }
        Command::Error => {
            warn!(
                "Client on {} reported error {}: {}",
                entry.id(),
                instruction.err_id.as_deref().unwrap_or("-"),
                instruction.err_msg.as_deref().unwrap_or("")
            );
            true
        }
    }
}

/// Dispatch a WebSocket batch. With `encrypted`, each call's first argument is
/// an encrypted block opened with the connection's crypto state.
async fn dispatch_calls(
    state: &GatewayState,
    entry: &ConnectionEntry,
    mut calls: Vec<CallRequest>,
    encrypted: bool,
) -> Vec<CallResponse> {
    let ctx = CallContext::new(entry.path())
        .with_session(entry.session().cloned())
        .with_connection(entry.id());
    let expose = state.dispatcher.expose_errors();

    if let Some(session) = entry.session() {
        session.touch();
    }

    let opened: Vec<Result<()>> = calls
        .iter_mut()
        .map(|call| {
            if encrypted && call.malformed.is_none() {
                state.codec.decrypt_call(call, entry.crypto())
            } else {
                Ok(())
            }
        })
        .collect();

    let ctx = &ctx;
    join_all(calls.iter().zip(opened).map(|(call, opened)| async move {
        match opened {
            Ok(()) => state.dispatcher.dispatch(call, ctx).await,
            Err(e) => {
                debug!("Could not open call {}.{}: {}", call.action, call.method, e);
                CallResponse::for_request(call, CallResult::from_error(&e, expose))
            }
        }
    }))
    .await
}

/// Health check.
async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.connections.len(),
        "sessions": state.sessions.len(),
    }))
}
