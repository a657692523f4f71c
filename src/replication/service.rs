//! Replica Service
//!
//! Server side of every call: client Put/Get, inbound Publish streams that
//! merge into the database, and Ack streams that report our clocks.

use std::sync::Arc;
use chrono::Utc;

use super::protocol::Message;
use crate::network::{CallHandler, Connection};
use crate::store::{Database, VectorClock};
use crate::error::{Error, Result};

/// Serves the local database to clients and peers
pub struct ReplicaService {
    database: Arc<Database>,
}

impl ReplicaService {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    async fn put(&self, key: String, data: Vec<u8>, conn: &mut Connection) -> Result<()> {
        let version = self.database.put(&key, data, Utc::now()).await;
        tracing::debug!("Put {} at version {}", key, version);
        conn.send(&Message::PutResponse {
            node_id: self.database.local_id(),
            version,
        })
        .await
    }

    async fn get(&self, key: String, conn: &mut Connection) -> Result<()> {
        let record = self.database.get(&key).await.ok_or(Error::NotFound(key))?;

        for chunk in record.chunks() {
            conn.send(&Message::GetResponse {
                data: chunk.payload().to_vec(),
                write_time_millis: chunk.write_time_millis(),
                version: chunk.origin_version(),
                node_id: chunk.origin_node(),
            })
            .await?;
        }
        conn.send(&Message::StreamEnd).await
    }

    /// Merge every published key until the sender closes, then confirm.
    ///
    /// The first merge fault aborts the stream; keys merged before it stay
    /// merged.
    async fn publish(&self, opening: Message, conn: &mut Connection) -> Result<()> {
        let mut next = Some(opening);
        let mut merged = 0usize;

        loop {
            let message = match next.take() {
                Some(message) => message,
                None => conn.recv().await?.ok_or_else(|| {
                    Error::Network(format!("{} closed the publish stream without closing it", conn.peer()))
                })?,
            };

            match message {
                Message::PublishRequest { key, clock, chunks } => {
                    self.database.merge(&key, &clock, &chunks).await?;
                    merged += 1;
                }
                Message::PublishClose => break,
                other => return Err(Error::UnexpectedMessage(other.type_name())),
            }
        }

        tracing::debug!("Merged {} keys published by {}", merged, conn.peer());
        conn.send(&Message::PublishResponse).await
    }

    /// Stream our clock for every key.
    ///
    /// Clocks are copied out under the database lock and sent after it is
    /// released.
    async fn ack(&self, conn: &mut Connection) -> Result<()> {
        let mut clocks: Vec<(String, VectorClock)> = Vec::new();
        self.database
            .range(|key, record| {
                clocks.push((key.to_string(), record.clock().clone()));
                Ok(())
            })
            .await?;

        for (key, clock) in clocks {
            conn.send(&Message::AckResponse { key, clock }).await?;
        }
        conn.send(&Message::StreamEnd).await
    }
}

#[async_trait::async_trait]
impl CallHandler for ReplicaService {
    async fn handle(&self, opening: Message, conn: &mut Connection) -> Result<()> {
        match opening {
            Message::PutRequest { key, data } => self.put(key, data, conn).await,
            Message::GetRequest { key } => self.get(key, conn).await,
            message @ (Message::PublishRequest { .. } | Message::PublishClose) => {
                self.publish(message, conn).await
            }
            Message::AckRequest => self.ack(conn).await,
            other => Err(Error::UnexpectedMessage(other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;
    use crate::replication::ErrorCode;
    use crate::store::Chunk;

    const LOCAL: NodeId = NodeId(1);
    const REMOTE: NodeId = NodeId(2);

    /// Run one call against the service over an in-memory pipe
    async fn call(service: Arc<ReplicaService>, messages: Vec<Message>) -> Vec<Message> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut client = Connection::new(client, "client");
        let mut server = Connection::new(server, "server");

        let handle = tokio::spawn(async move {
            let opening = server.recv().await.unwrap().unwrap();
            if let Err(e) = service.handle(opening, &mut server).await {
                let _ = server.send(&Message::error(&e)).await;
            }
        });

        for message in &messages {
            client.send(message).await.unwrap();
        }
        handle.await.unwrap();

        let mut replies = Vec::new();
        while let Some(message) = client.recv().await.unwrap() {
            replies.push(message);
        }
        replies
    }

    fn service() -> (Arc<Database>, Arc<ReplicaService>) {
        let database = Arc::new(Database::new(LOCAL));
        (Arc::clone(&database), Arc::new(ReplicaService::new(database)))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_, svc) = service();

        let replies = call(Arc::clone(&svc), vec![Message::PutRequest { key: "k".into(), data: b"v1".to_vec() }]).await;
        assert!(matches!(replies[..], [Message::PutResponse { node_id: LOCAL, version: 1 }]));

        call(Arc::clone(&svc), vec![Message::PutRequest { key: "k".into(), data: b"v2".to_vec() }]).await;

        let replies = call(svc, vec![Message::GetRequest { key: "k".into() }]).await;
        assert_eq!(replies.len(), 3);
        match (&replies[0], &replies[1], &replies[2]) {
            (
                Message::GetResponse { data: first, version: 1, node_id: LOCAL, .. },
                Message::GetResponse { data: second, version: 2, .. },
                Message::StreamEnd,
            ) => {
                assert_eq!(first, b"v1");
                assert_eq!(second, b"v2");
            }
            other => panic!("unexpected replies: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let (_, svc) = service();
        let replies = call(svc, vec![Message::GetRequest { key: "nope".into() }]).await;

        assert!(matches!(replies[..], [Message::Error { code: ErrorCode::NotFound, .. }]));
    }

    #[tokio::test]
    async fn test_publish_merges_and_confirms() {
        let (db, svc) = service();
        let clock = VectorClock::single(REMOTE, 1);
        let replies = call(
            svc,
            vec![
                Message::PublishRequest {
                    key: "a".into(),
                    clock: clock.clone(),
                    chunks: vec![Chunk::new(REMOTE, 1, Utc::now(), "x")],
                },
                Message::PublishRequest {
                    key: "b".into(),
                    clock: clock.clone(),
                    chunks: vec![Chunk::new(REMOTE, 1, Utc::now(), "y")],
                },
                Message::PublishClose,
            ],
        )
        .await;

        assert!(matches!(replies[..], [Message::PublishResponse]));
        assert_eq!(db.len().await, 2);
        assert_eq!(db.get("a").await.unwrap().clock(), &clock);
    }

    #[tokio::test]
    async fn test_empty_publish_is_confirmed() {
        let (_, svc) = service();
        let replies = call(svc, vec![Message::PublishClose]).await;
        assert!(matches!(replies[..], [Message::PublishResponse]));
    }

    #[tokio::test]
    async fn test_publish_aborts_on_merge_fault() {
        let (db, svc) = service();
        let replies = call(
            svc,
            vec![
                Message::PublishRequest {
                    key: "good".into(),
                    clock: VectorClock::single(REMOTE, 1),
                    chunks: vec![Chunk::new(REMOTE, 1, Utc::now(), "x")],
                },
                Message::PublishRequest {
                    key: "bad".into(),
                    clock: VectorClock::single(REMOTE, 1),
                    chunks: vec![Chunk::new(REMOTE, 9, Utc::now(), "y")],
                },
                Message::PublishClose,
            ],
        )
        .await;

        assert!(matches!(replies[..], [Message::Error { code: ErrorCode::CausalMerge, .. }]));
        assert!(db.get("good").await.is_some());
        assert!(db.get("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_ack_streams_every_clock() {
        let (db, svc) = service();
        db.put("a", "1", Utc::now()).await;
        db.put("b", "2", Utc::now()).await;
        db.put("b", "3", Utc::now()).await;

        let replies = call(svc, vec![Message::AckRequest]).await;

        assert_eq!(replies.len(), 3);
        let mut clocks: Vec<(String, u64)> = replies
            .iter()
            .filter_map(|m| match m {
                Message::AckResponse { key, clock } => Some((key.clone(), clock.get(LOCAL))),
                _ => None,
            })
            .collect();
        clocks.sort();
        assert_eq!(clocks, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
        assert!(matches!(replies.last(), Some(Message::StreamEnd)));
    }

    #[tokio::test]
    async fn test_unexpected_opening_message() {
        let (_, svc) = service();
        let replies = call(svc, vec![Message::StreamEnd]).await;
        assert!(matches!(replies[..], [Message::Error { code: ErrorCode::BadRequest, .. }]));
    }
}
