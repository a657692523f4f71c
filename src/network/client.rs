//! Network Client
//!
//! Dials peers and clients' target nodes. Every call opens its own
//! connection, mirroring how the server accepts them.

use std::path::Path;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use super::{tls, Connection};
use crate::id::NodeId;
use crate::replication::Message;
use crate::store::{Chunk, VectorClock};
use crate::error::{Error, Result};

/// Network client for calling peer nodes
pub struct NetworkClient {
    /// Connection timeout
    connect_timeout: Duration,
    /// Request timeout
    request_timeout: Duration,
    /// TLS connector, when dialing securely
    tls: Option<TlsConnector>,
}

impl NetworkClient {
    /// Create a new plaintext network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
            tls: None,
        }
    }

    /// Create a client that dials over TLS when `secure` is set
    pub fn with_security(
        connect_timeout: Duration,
        request_timeout: Duration,
        secure: bool,
        ca_file: Option<&Path>,
    ) -> Result<Self> {
        let mut client = Self::new(connect_timeout, request_timeout);
        if secure {
            client.tls = Some(tls::build_connector(ca_file)?);
        }
        Ok(client)
    }

    /// Upper bound for one whole call
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Connect to an address
    pub async fn connect(&self, address: &str) -> Result<Connection> {
        let result = timeout(self.connect_timeout, TcpStream::connect(address)).await;

        let stream = match result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(Error::ConnectionTimeout(address.to_string())),
        };
        stream.set_nodelay(true)?;

        match &self.tls {
            Some(connector) => {
                let name = tls::server_name(address)?;
                let stream = connector.connect(name, stream).await.map_err(|e| Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: format!("TLS handshake: {}", e),
                })?;
                Ok(Connection::new(stream, address))
            }
            None => Ok(Connection::new(stream, address)),
        }
    }

    /// Write a value; returns the serving node and its new version for the key
    pub async fn put(&self, address: &str, key: &str, data: Vec<u8>) -> Result<(NodeId, u64)> {
        within(self.request_timeout, address, async {
            let mut conn = self.connect(address).await?;
            conn.send(&Message::PutRequest {
                key: key.to_string(),
                data,
            })
            .await?;

            match conn.recv_reply().await? {
                Message::PutResponse { node_id, version } => Ok((node_id, version)),
                other => Err(Error::UnexpectedMessage(other.type_name())),
            }
        })
        .await
    }

    /// Open a read of every chunk of a key
    pub async fn get(&self, address: &str, key: &str) -> Result<GetStream> {
        let conn = within(self.request_timeout, address, async {
            let mut conn = self.connect(address).await?;
            conn.send(&Message::GetRequest { key: key.to_string() }).await?;
            Ok(conn)
        })
        .await?;
        Ok(GetStream {
            conn,
            request_timeout: self.request_timeout,
        })
    }

    /// Open a push stream
    pub async fn publish(&self, address: &str) -> Result<PublishStream> {
        let conn = self.connect(address).await?;
        Ok(PublishStream { conn, sent: 0 })
    }

    /// Open a pull of the peer's per-key clocks
    pub async fn ack(&self, address: &str) -> Result<AckStream> {
        let conn = within(self.request_timeout, address, async {
            let mut conn = self.connect(address).await?;
            conn.send(&Message::AckRequest).await?;
            Ok(conn)
        })
        .await?;
        Ok(AckStream {
            conn,
            request_timeout: self.request_timeout,
        })
    }
}

/// Run one step of a call, failing with `ConnectionTimeout` if it outlasts `limit`
async fn within<T>(
    limit: Duration,
    address: &str,
    step: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
    }
}

/// One chunk returned by a Get call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReply {
    pub data: Vec<u8>,
    pub write_time_millis: u64,
    pub version: u64,
    pub node_id: NodeId,
}

/// Server stream of a key's chunks
pub struct GetStream {
    conn: Connection,
    request_timeout: Duration,
}

impl GetStream {
    /// Next chunk, or `None` once the server finished
    pub async fn next(&mut self) -> Result<Option<ChunkReply>> {
        let peer = self.conn.peer().to_string();
        match within(self.request_timeout, &peer, self.conn.recv_reply()).await? {
            Message::GetResponse {
                data,
                write_time_millis,
                version,
                node_id,
            } => Ok(Some(ChunkReply {
                data,
                write_time_millis,
                version,
                node_id,
            })),
            Message::StreamEnd => Ok(None),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

/// Client stream of key deltas
pub struct PublishStream {
    conn: Connection,
    sent: usize,
}

impl PublishStream {
    /// Send one delta message for a key.
    ///
    /// A message over the frame limit fails with `FrameTooLarge` before
    /// anything is written, leaving the stream usable.
    pub async fn send(&mut self, key: String, clock: VectorClock, chunks: Vec<Chunk>) -> Result<()> {
        self.conn
            .send(&Message::PublishRequest { key, clock, chunks })
            .await?;
        self.sent += 1;
        Ok(())
    }

    /// Finish the stream and wait for the peer to confirm the merge; returns
    /// the number of messages sent
    pub async fn close(mut self) -> Result<usize> {
        self.conn.send(&Message::PublishClose).await?;
        match self.conn.recv_reply().await? {
            Message::PublishResponse => Ok(self.sent),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

/// Server stream of a peer's per-key clocks
pub struct AckStream {
    conn: Connection,
    request_timeout: Duration,
}

impl AckStream {
    /// Next `(key, clock)`, or `None` once the peer finished
    pub async fn next(&mut self) -> Result<Option<(String, VectorClock)>> {
        let peer = self.conn.peer().to_string();
        match within(self.request_timeout, &peer, self.conn.recv_reply()).await? {
            Message::AckResponse { key, clock } => Ok(Some((key, clock))),
            Message::StreamEnd => Ok(None),
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_failure() {
        let client = NetworkClient::new(Duration::from_millis(100), Duration::from_millis(500));

        // Nothing listens on the discard port in test environments
        let result = client.put("127.0.0.1:9", "k", Vec::new()).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let client = NetworkClient::new(Duration::from_millis(100), Duration::from_millis(500));
        assert!(client.ack("127.0.0.1:99999").await.is_err());
    }

    /// Accepts connections and reads requests but never answers
    async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        address
    }

    #[tokio::test]
    async fn test_get_times_out_on_silent_server() {
        let address = silent_server().await;
        let client = NetworkClient::new(Duration::from_secs(1), Duration::from_millis(200));

        let mut stream = client.get(&address, "k").await.unwrap();
        let result = timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionTimeout(_))));
    }

    #[tokio::test]
    async fn test_ack_times_out_on_silent_server() {
        let address = silent_server().await;
        let client = NetworkClient::new(Duration::from_secs(1), Duration::from_millis(200));

        let mut stream = client.ack(&address).await.unwrap();
        let result = timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionTimeout(_))));
    }

    #[test]
    fn test_plaintext_by_default() {
        let client = NetworkClient::with_security(Duration::from_secs(1), Duration::from_secs(1), false, None)
            .unwrap();
        assert!(client.tls.is_none());
        assert_eq!(client.request_timeout(), Duration::from_secs(1));
    }
}
