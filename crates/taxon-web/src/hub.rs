//! Connection Hub (C9, §4.9): a live-session table keyed by user ID, with
//! personal send, conversation broadcast, and a per-connection heartbeat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taxon_store::ConversationStore;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::protocol::ServerFrame;

/// What a connection's write half is told to do. Kept distinct from
/// `ServerFrame` because closing a superseded connection is a WebSocket
/// control action, not a JSON payload (§4 C9 clarification: send a close
/// frame, never drop the old socket unclosed).
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(ServerFrame),
    Close,
}

struct Connection {
    sender: mpsc::UnboundedSender<Outbound>,
    last_pong_millis: Arc<AtomicI64>,
}

pub struct Hub {
    connections: Mutex<HashMap<Uuid, Connection>>,
    store: Arc<dyn ConversationStore>,
    ping_interval: Duration,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Hub {
    pub fn new(store: Arc<dyn ConversationStore>, ping_interval: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            store,
            ping_interval,
        }
    }

    /// Registers `user_id`'s new connection, superseding and closing any
    /// previous one for the same user (§4.9 "latest connection wins").
    /// Returns the receiver the caller's write task must drain and a pong
    /// clock the caller's read task updates on every inbound `pong`.
    #[instrument(skip(self))]
    pub fn register(&self, user_id: Uuid) -> (mpsc::UnboundedReceiver<Outbound>, Arc<AtomicI64>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let last_pong_millis = Arc::new(AtomicI64::new(now_millis()));

        let previous = self.connections.lock().unwrap().insert(
            user_id,
            Connection {
                sender,
                last_pong_millis: last_pong_millis.clone(),
            },
        );
        if let Some(previous) = previous {
            info!(%user_id, "superseding existing connection");
            let _ = previous.sender.send(Outbound::Close);
        }

        (receiver, last_pong_millis)
    }

    /// Removes `user_id` from the table iff its current entry matches the
    /// one this connection registered (guards against a just-registered
    /// superseding connection cleaning itself up on the old one's disconnect).
    pub fn unregister(&self, user_id: Uuid, last_pong_millis: &Arc<AtomicI64>) {
        let mut guard = self.connections.lock().unwrap();
        if let Some(entry) = guard.get(&user_id) {
            if Arc::ptr_eq(&entry.last_pong_millis, last_pong_millis) {
                guard.remove(&user_id);
            }
        }
    }

    pub fn record_pong(&self, user_id: Uuid) {
        if let Some(entry) = self.connections.lock().unwrap().get(&user_id) {
            entry.last_pong_millis.store(now_millis(), Ordering::SeqCst);
        }
    }

    /// Best-effort personal send; on failure, log and drop (§4.9).
    pub fn send(&self, user_id: Uuid, frame: ServerFrame) {
        let sender = self
            .connections
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|c| c.sender.clone());
        if let Some(sender) = sender {
            if sender.send(Outbound::Frame(frame)).is_err() {
                warn!(%user_id, "dropping frame for disconnected session");
            }
        }
    }

    /// Resolves participants from the store and sends to each connected
    /// one except `exclude` (§4.9).
    #[instrument(skip(self, frame))]
    pub async fn broadcast(&self, conversation_id: Uuid, frame: ServerFrame, exclude: Option<Uuid>) {
        let conversation = match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, %conversation_id, "broadcast: conversation lookup failed");
                return;
            }
        };
        for participant in conversation.participants {
            if Some(participant) == exclude {
                continue;
            }
            self.send(participant, frame.clone());
        }
    }

    /// Sends `frame` to every currently connected user (used when a group
    /// conversation is created via the HTTP side channel, so open sessions
    /// learn about it without polling).
    pub fn broadcast_all(&self, frame: ServerFrame) {
        let senders: Vec<_> = self
            .connections
            .lock()
            .unwrap()
            .values()
            .map(|c| c.sender.clone())
            .collect();
        for sender in senders {
            let _ = sender.send(Outbound::Frame(frame.clone()));
        }
    }

    fn is_current(&self, user_id: Uuid, last_pong_millis: &Arc<AtomicI64>) -> bool {
        self.connections
            .lock()
            .unwrap()
            .get(&user_id)
            .is_some_and(|entry| Arc::ptr_eq(&entry.last_pong_millis, last_pong_millis))
    }

    /// Spawns the one keepalive task per connection (§5): pings every
    /// `ping_interval`, closes the connection if no pong lands within
    /// `2 * ping_interval` (§4.9, S8).
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        user_id: Uuid,
        last_pong_millis: Arc<AtomicI64>,
    ) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        let timeout_millis = hub.ping_interval.as_millis() as i64 * 2;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(hub.ping_interval);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                if !hub.is_current(user_id, &last_pong_millis) {
                    break;
                }
                let elapsed = now_millis() - last_pong_millis.load(Ordering::SeqCst);
                if elapsed > timeout_millis {
                    info!(%user_id, "keepalive timeout, closing connection");
                    hub.send(user_id, ServerFrame::Error { message: "keepalive timeout".into() });
                    let sender = hub
                        .connections
                        .lock()
                        .unwrap()
                        .get(&user_id)
                        .map(|c| c.sender.clone());
                    if let Some(sender) = sender {
                        let _ = sender.send(Outbound::Close);
                    }
                    hub.unregister(user_id, &last_pong_millis);
                    break;
                }
                hub.send(user_id, ServerFrame::Ping { timestamp: now_millis() });
            }
        })
    }
}
