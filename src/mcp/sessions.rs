//! Session directory for push-stream clients
//!
//! Every open push stream owns an outbound queue. The directory maps the
//! session id announced in the handshake to the sending half of that queue;
//! request handlers look the id up and enqueue responses without ever touching
//! the HTTP connection that carries them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};
use uuid::Uuid;

/// Sending half of a session's outbound queue.
pub type SessionSink = mpsc::Sender<Value>;

struct SessionEntry {
    sink: SessionSink,
    attached_at: DateTime<Utc>,
    permits: Arc<Semaphore>,
}

/// What a dispatch borrows from the directory for the duration of one call.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: String,
    pub sink: SessionSink,
    pub attached_at: DateTime<Utc>,
    /// Bounds concurrently running dispatches for this session.
    pub permits: Arc<Semaphore>,
}

pub struct SessionDirectory {
    sessions: DashMap<String, SessionEntry>,
    max_inflight: usize,
}

impl SessionDirectory {
    pub fn new(max_inflight: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_inflight: max_inflight.max(1),
        }
    }

    /// Records `sink` under a fresh random (v4, 122-bit) session id.
    pub fn attach(&self, sink: SessionSink) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            sink,
            attached_at: Utc::now(),
            permits: Arc::new(Semaphore::new(self.max_inflight)),
        };
        self.sessions.insert(id.clone(), entry);
        info!(session_id = %id, active_sessions = self.sessions.len(), "session attached");
        id
    }

    /// Removes the session. Detaching an unknown id is a no-op.
    pub fn detach(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session_id = %id, active_sessions = self.sessions.len(), "session detached");
        } else {
            debug!(session_id = %id, "detach of unknown session ignored");
        }
        removed
    }

    pub fn lookup(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| SessionHandle {
            id: id.to_string(),
            sink: entry.sink.clone(),
            attached_at: entry.attached_at,
            permits: Arc::clone(&entry.permits),
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session sink, which ends the corresponding push streams
    /// once in-flight dispatches have released their clones.
    pub fn close_all(&self) {
        let count = self.sessions.len();
        self.sessions.clear();
        info!(closed_sessions = count, "all sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    fn sink() -> (SessionSink, mpsc::Receiver<Value>) {
        mpsc::channel(4)
    }

    #[tokio::test]
    async fn attach_lookup_detach() {
        let directory = SessionDirectory::new(2);
        let (tx, mut rx) = sink();
        let id = directory.attach(tx);

        let handle = directory.lookup(&id).expect("attached session");
        assert_eq!(handle.id, id);
        assert_eq!(handle.permits.available_permits(), 2);
        handle.sink.send(json!({"hello": "world"})).await.expect("send");
        assert_eq!(rx.recv().await, Some(json!({"hello": "world"})));

        assert!(directory.detach(&id));
        assert!(directory.lookup(&id).is_none());
        assert!(directory.is_empty());
    }

    #[test]
    fn detach_is_idempotent() {
        let directory = SessionDirectory::new(1);
        let (tx, _rx) = sink();
        let id = directory.attach(tx);

        assert!(directory.detach(&id));
        assert!(!directory.detach(&id));
        assert!(!directory.detach("never-attached"));
        assert_eq!(directory.len(), 0);
    }

    #[test]
    fn ids_are_unique_uuids() {
        let directory = SessionDirectory::new(1);
        let ids: HashSet<String> = (0..100)
            .map(|_| {
                let (tx, _rx) = sink();
                directory.attach(tx)
            })
            .collect();

        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[tokio::test]
    async fn close_all_ends_receivers() {
        let directory = SessionDirectory::new(1);
        let (tx, mut rx) = sink();
        directory.attach(tx);

        directory.close_all();
        assert!(directory.is_empty());
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attach_and_detach_lose_no_updates() {
        let directory = Arc::new(SessionDirectory::new(1));
        let mut tasks = Vec::new();

        for index in 0..200 {
            let directory = Arc::clone(&directory);
            tasks.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(1);
                let id = directory.attach(tx);
                assert!(directory.lookup(&id).is_some());
                if index % 2 == 0 {
                    assert!(directory.detach(&id));
                    assert!(directory.lookup(&id).is_none());
                    None
                } else {
                    Some(id)
                }
            }));
        }

        let mut kept = Vec::new();
        for task in tasks {
            if let Some(id) = task.await.expect("session task") {
                kept.push(id);
            }
        }

        assert_eq!(directory.len(), 100);
        assert!(kept.iter().all(|id| directory.lookup(id).is_some()));
    }
}
