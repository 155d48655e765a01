use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Outbound handle for one connected peer channel.
///
/// `channel_id` identifies the underlying connection, independent of any
/// identifier the peer registers. Sends go through the connection's writer
/// task; a closed peer simply drops the message.
#[derive(Clone)]
pub struct PeerChannel {
    channel_id: Uuid,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl PeerChannel {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            channel_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn channel_id(&self) -> Uuid {
        self.channel_id
    }

    /// Queue a message for this peer. Failures are tolerated by design:
    /// the channel may have closed between lookup and send.
    pub fn send(&self, message: ServerMessage) {
        if self.tx.send(message).is_err() {
            debug!(channel_id = %self.channel_id, "dropping message for closed channel");
        }
    }
}

/// Live identifier → channel map.
///
/// Registration is last-writer-wins: a later `register` for the same
/// identifier replaces the earlier binding, even from a different channel.
/// Unbinding goes by channel identity, so a stale channel closing cannot
/// evict an identifier that has since re-registered elsewhere.
#[derive(Default)]
pub struct ConnectionRegistry {
    peers: DashMap<String, PeerChannel>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, channel: PeerChannel) {
        info!(user_id, channel_id = %channel.channel_id(), "client registered");
        self.peers.insert(user_id.to_string(), channel);
    }

    pub fn lookup(&self, user_id: &str) -> Option<PeerChannel> {
        self.peers.get(user_id).map(|entry| entry.value().clone())
    }

    /// Remove the binding held by a closing channel, if any. A channel that
    /// never registered (or was displaced by a re-registration) matches
    /// nothing and this is a no-op.
    pub fn unbind(&self, channel_id: Uuid) {
        // Collect the key first so no map guard is held during removal.
        let bound = self.peers.iter().find_map(|entry| {
            (entry.value().channel_id() == channel_id).then(|| entry.key().clone())
        });

        if let Some(user_id) = bound {
            self.peers.remove(&user_id);
            info!(user_id, %channel_id, "client disconnected");
        }
    }
}
