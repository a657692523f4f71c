//! HTTP API Server
//!
//! REST access to the local database plus health and status queries.

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::id::NodeId;
use crate::network::ChunkReply;
use crate::store::{Chunk, Database};
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: NodeId,
    /// Local database
    pub database: Arc<Database>,
    /// Peers this node gossips with
    pub peers: Vec<String>,
    /// Gossip interval in milliseconds
    pub gossip_interval_ms: u64,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, database: Arc<Database>, peers: Vec<String>, gossip_interval_ms: u64) -> Self {
        let state = Arc::new(AppState {
            node_id: database.local_id(),
            database,
            peers,
            gossip_interval_ms,
        });

        Self { config, state }
    }

    /// Get the state for sharing with other components
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router
    pub fn create_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
        let router = Router::new()
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .route("/keys/:key", get(handle_get).put(handle_put))
            .with_state(state);

        let router = router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        if cors_enabled {
            router.layer(
                CorsLayer::new()
                    .allow_methods([Method::GET, Method::PUT])
                    .allow_origin(cors::Any),
            )
        } else {
            router
        }
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = Self::create_router(Arc::clone(&self.state), self.config.cors_enabled);

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Request/Response Types ============

/// One chunk of a key, as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkView {
    pub version: u64,
    /// Payload, decoded as UTF-8 (lossy)
    pub data: String,
    pub node_id: NodeId,
    pub write_time: DateTime<Utc>,
}

impl From<&Chunk> for ChunkView {
    fn from(chunk: &Chunk) -> Self {
        Self {
            version: chunk.origin_version(),
            data: String::from_utf8_lossy(chunk.payload()).into_owned(),
            node_id: chunk.origin_node(),
            write_time: chunk.write_time(),
        }
    }
}

impl From<&ChunkReply> for ChunkView {
    fn from(reply: &ChunkReply) -> Self {
        Self {
            version: reply.version,
            data: String::from_utf8_lossy(&reply.data).into_owned(),
            node_id: reply.node_id,
            write_time: i64::try_from(reply.write_time_millis)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_default(),
        }
    }
}

/// Put response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutResponse {
    pub node_id: NodeId,
    pub version: u64,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub node_id: NodeId,
    pub keys: usize,
    pub peers: Vec<String>,
    pub gossip_interval_ms: u64,
}

/// Health response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: NodeId,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id,
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id,
        keys: state.database.len().await,
        peers: state.peers.clone(),
        gossip_interval_ms: state.gossip_interval_ms,
    })
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.database.get(&key).await {
        Some(record) => {
            let chunks: Vec<ChunkView> = record.chunks().iter().map(ChunkView::from).collect();
            Json(chunks).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: Error::NotFound(key).to_string(),
                code: "NOT_FOUND".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn handle_put(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let version = state.database.put(&key, body.to_vec(), Utc::now()).await;
    tracing::debug!("HTTP put {} at version {}", key, version);

    Json(PutResponse {
        node_id: state.node_id,
        version,
    })
}
