//! HTTP API Module
//!
//! Provides a REST API over the local database and node status.

mod http;

pub use http::{AppState, ChunkView, HttpServer, PutResponse, StatusResponse};
