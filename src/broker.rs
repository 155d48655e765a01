use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::SignalError;
use crate::protocol::ServerMessage;
use crate::registry::ConnectionRegistry;

pub const RECEIVER_UNAVAILABLE: &str = "Receiver not available";
pub const RECEIVER_DECLINED: &str = "Receiver declined the request";

/// One connection request awaiting the receiver's answer.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request_id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub created_at: DateTime<Utc>,
}

/// Correlates connection-request/response pairs between registered peers.
///
/// A request lives in the pending set from creation until exactly one
/// resolution removes it. There is no server-side timeout: a sender that
/// stops waiting is a client concern, the entry stays until answered.
#[derive(Default)]
pub struct RequestBroker {
    pending: DashMap<Uuid, PendingRequest>,
}

impl RequestBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending request and make the single delivery attempt.
    ///
    /// If the receiver has no live binding the sender (if bound) gets an
    /// immediate rejection and the request is never stored — it can never
    /// be resolved later. No retry, no queuing for receivers that connect
    /// after the fact.
    pub fn create_request(
        &self,
        registry: &ConnectionRegistry,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<Uuid, SignalError> {
        let request_id = Uuid::new_v4();
        info!(%request_id, sender_id, receiver_id, "connection request");

        let Some(receiver) = registry.lookup(receiver_id) else {
            if let Some(sender) = registry.lookup(sender_id) {
                sender.send(ServerMessage::ConnectionRejected {
                    reason: RECEIVER_UNAVAILABLE.to_string(),
                });
            }
            return Err(SignalError::UnknownRecipient(receiver_id.to_string()));
        };

        let created_at = Utc::now();
        self.pending.insert(
            request_id,
            PendingRequest {
                request_id,
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                created_at,
            },
        );

        receiver.send(ServerMessage::ConnectionRequest {
            request_id,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            timestamp: created_at,
        });

        Ok(request_id)
    }

    /// Resolve a pending request and notify the original sender.
    ///
    /// Unknown or already-resolved tokens are stale: the entry was removed
    /// by the first resolution, so duplicates land here and resolve nothing.
    /// A sender that disconnected while waiting just misses the verdict.
    pub fn resolve(
        &self,
        registry: &ConnectionRegistry,
        request_id: Uuid,
        accepted: bool,
        receiver_id: &str,
    ) -> Result<(), SignalError> {
        let Some((_, request)) = self.pending.remove(&request_id) else {
            return Err(SignalError::StaleRequest(request_id));
        };

        debug!(%request_id, accepted, "connection request resolved");

        if let Some(sender) = registry.lookup(&request.sender_id) {
            let verdict = if accepted {
                ServerMessage::ConnectionAccepted {
                    receiver_id: receiver_id.to_string(),
                }
            } else {
                ServerMessage::ConnectionRejected {
                    reason: RECEIVER_DECLINED.to_string(),
                }
            };
            sender.send(verdict);
        }

        Ok(())
    }
}
