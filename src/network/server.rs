//! Network Server
//!
//! TCP server accepting calls from peers and clients. Each accepted
//! connection carries one call; the first message is handed to the
//! configured `CallHandler`, which owns the rest of the conversation.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use super::Connection;
use crate::replication::Message;
use crate::error::Result;

/// Server side of a call, selected by its opening message
#[async_trait::async_trait]
pub trait CallHandler: Send + Sync {
    /// Serve one call. An error is reported to the caller and ends the call.
    async fn handle(&self, opening: Message, conn: &mut Connection) -> Result<()>;
}

/// Network server for cluster communication
pub struct NetworkServer {
    /// Bind address
    bind_address: String,
    /// Call handler
    handler: Arc<dyn CallHandler>,
    /// TLS acceptor, when serving TLS
    tls: Option<TlsAcceptor>,
    /// Shutdown signal
    shutdown: CancellationToken,
}

impl NetworkServer {
    /// Create a new network server
    pub fn new(bind_address: String, handler: Arc<dyn CallHandler>, shutdown: CancellationToken) -> Self {
        Self {
            bind_address,
            handler,
            tls: None,
            shutdown,
        }
    }

    /// Terminate TLS on accepted connections
    pub fn with_tls(mut self, acceptor: Option<TlsAcceptor>) -> Self {
        self.tls = acceptor;
        self
    }

    /// Bind the listener
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!(
            "Network server listening on {}{}",
            listener.local_addr()?,
            if self.tls.is_some() { " (TLS)" } else { "" }
        );
        Ok(listener)
    }

    /// Serve an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let handler = Arc::clone(&self.handler);
                            let tls = self.tls.clone();
                            let shutdown = self.shutdown.clone();

                            tokio::spawn(async move {
                                tokio::select! {
                                    result = handle_connection(socket, addr, tls, handler) => {
                                        if let Err(e) = result {
                                            tracing::warn!("Connection error from {}: {}", addr, e);
                                        }
                                    }
                                    _ = shutdown.cancelled() => {}
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    break;
                }
            }
        }

        tracing::info!("Network server stopped");
        Ok(())
    }
}

/// Handle a single connection
async fn handle_connection(
    socket: TcpStream,
    addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    handler: Arc<dyn CallHandler>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let mut conn = match tls {
        Some(acceptor) => Connection::new(acceptor.accept(socket).await?, addr.to_string()),
        None => Connection::new(socket, addr.to_string()),
    };

    let opening = match conn.recv().await? {
        Some(message) => message,
        // Connected and left without a call
        None => return Ok(()),
    };
    let call = opening.type_name();

    if let Err(e) = handler.handle(opening, &mut conn).await {
        tracing::warn!("{} from {} failed: {}", call, addr, e);
        // Best effort: the peer may already be gone
        let _ = conn.send(&Message::error(&e)).await;
    }

    let _ = conn.shutdown().await;
    Ok(())
}
