//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the collection. All endpoints share
//! application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                   | Description                          |
//! |--------|------------------------|--------------------------------------|
//! | GET    | `/health`              | Liveness probe                       |
//! | GET    | `/status`              | Collection snapshot                  |
//! | POST   | `/rpc`                 | JSON-RPC 2.0 gateway (see `rpc`)     |
//! | GET    | `/ws`                  | WebSocket stream of registry events  |
//! | GET    | `/tokens/:id`          | Token owner and metadata URI         |
//! | GET    | `/accounts/:address`   | Token balance and ids of an address  |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use veilmint_contracts::{CollectionStatus, Event, EventSink, Registry, RegistryError, TokenId};
use veilmint_protocol::identity::Address;
use veilmint_protocol::time::ManualClock;

use crate::metrics::SharedMetrics;
use crate::rpc::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Clones share the same registry, clock and channel.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The hosted collection.
    pub registry: Arc<Registry>,
    /// Set in devnet mode; the same clock the registry reads.
    pub devnet_clock: Option<Arc<ManualClock>>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<StreamEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Brings the supply and sale gauges in line with the registry.
    pub fn refresh_gauges(&self) {
        let total = i64::try_from(self.registry.total_supply()).unwrap_or(i64::MAX);
        self.metrics.total_supply.set(total);
        self.metrics
            .sale_active
            .set(i64::from(self.registry.sale_active()));
    }
}

/// Feeds committed registry events to the WebSocket broadcast channel.
///
/// Attached to the registry with [`Registry::with_event_sink`], so it runs
/// under the registry lock and subscribers receive events in `sequence`
/// order. `broadcast::Sender::send` never blocks.
pub struct StreamPublisher {
    tx: broadcast::Sender<StreamEvent>,
    metrics: SharedMetrics,
}

impl StreamPublisher {
    /// Publishes into `tx`, counting events in `metrics`.
    pub fn new(tx: broadcast::Sender<StreamEvent>, metrics: SharedMetrics) -> Self {
        Self { tx, metrics }
    }
}

impl EventSink for StreamPublisher {
    fn emit(&self, sequence: u64, timestamp: DateTime<Utc>, event: &Event) {
        match event {
            Event::Transfer { .. } => self.metrics.mints_total.inc(),
            Event::WithdrawExecuted { .. } => self.metrics.withdrawals_executed_total.inc(),
            _ => {}
        }
        // No subscribers is not an error.
        let _ = self.tx.send(StreamEvent {
            sequence,
            timestamp,
            event: event.clone(),
        });
        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();
    }
}

/// A registry event as pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Sequence number of the call that emitted the event.
    pub sequence: u64,
    /// When that call was evaluated.
    pub timestamp: DateTime<Utc>,
    /// The event itself, flattened with its `type` tag.
    #[serde(flatten)]
    pub event: Event,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/tokens/:id", get(token_handler))
        .route("/accounts/:address", get(account_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Whether the node runs on a manual devnet clock.
    pub devnet: bool,
    /// Successful mutations so far.
    pub sequence: u64,
    /// The registry clock's current reading.
    pub now: DateTime<Utc>,
    /// The collection snapshot.
    pub collection: CollectionStatus,
}

/// Response payload for `GET /tokens/:id`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_id: TokenId,
    pub owner: Address,
    pub token_uri: String,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: u64,
    pub tokens: Vec<TokenId>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — the collection snapshot plus node metadata.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        version: state.version.clone(),
        devnet: state.devnet_clock.is_some(),
        sequence: state.registry.sequence(),
        now: state.registry.now(),
        collection: state.registry.status(),
    })
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse::new(
            req.id,
            Err(JsonRpcError::new(
                rpc::INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            )),
        ));
    }

    let started = Instant::now();
    let outcome = rpc::dispatch(&state, &req.method, req.params.as_ref());
    state
        .metrics
        .rpc_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    let label = match &outcome {
        Err(e) if e.code == rpc::METHOD_NOT_FOUND => "unknown",
        _ => req.method.as_str(),
    };
    state
        .metrics
        .rpc_requests_total
        .with_label_values(&[label])
        .inc();

    if let Err(e) = &outcome {
        let kind = e.kind().map(|k| k.as_str()).unwrap_or("rpc");
        state.metrics.rpc_errors_total.with_label_values(&[kind]).inc();
        tracing::debug!(method = %req.method, code = e.code, error = %e.message, "rpc call failed");
    }

    Json(JsonRpcResponse::new(req.id, outcome))
}

/// `GET /tokens/:id` — owner and metadata URI of a minted token.
async fn token_handler(
    Path(token_id): Path<TokenId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let lookup = state
        .registry
        .owner_of(token_id)
        .and_then(|owner| Ok((owner, state.registry.token_uri(token_id)?)));

    match lookup {
        Ok((owner, token_uri)) => (
            StatusCode::OK,
            Json(TokenResponse {
                token_id,
                owner,
                token_uri,
            }),
        )
            .into_response(),
        Err(err @ RegistryError::TokenNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// `GET /accounts/:address` — token holdings of an address. Unknown
/// addresses hold nothing.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let address: Address = match address.parse() {
        Ok(a) => a,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let account = AccountResponse {
        address,
        balance: state.registry.balance_of(&address),
        tokens: state.registry.tokens_of(&address),
    };
    (StatusCode::OK, Json(account)).into_response()
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive one JSON [`StreamEvent`] per registry event. The
/// connection is push-only; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
