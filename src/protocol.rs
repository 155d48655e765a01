use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Descriptor for one file moving through the relay.
///
/// The payload travels as base64 text end to end; the server never decodes
/// it or looks inside. `file_index`/`total_files` let clients batch several
/// files over one approved connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub sender_id: String,
    pub receiver_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub file_data: String,
    pub file_index: u32,
    pub total_files: u32,
}

/// Messages sent from client to the relay server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Claim an identifier for this channel. Clients re-send this
    /// periodically; the binding is overwritten every time.
    Register { user_id: String },
    /// Legacy alias some clients still send; handled exactly like `register`.
    RegisterReceiver { user_id: String },
    /// Ask a receiver to approve a connection
    ConnectionRequest {
        sender_id: String,
        receiver_id: String,
        timestamp: DateTime<Utc>,
    },
    /// Receiver's verdict on a pending connection request
    ConnectionResponse {
        request_id: Uuid,
        sender_id: String,
        receiver_id: String,
        accepted: bool,
    },
    /// Submit a file for relay to an approved receiver
    File(FileTransfer),
}

/// Messages sent from the relay server to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Forwarded approval request, delivered to the receiver
    ConnectionRequest {
        request_id: Uuid,
        sender_id: String,
        receiver_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The receiver approved; delivered to the original sender
    ConnectionAccepted { receiver_id: String },
    /// The receiver declined or was unreachable; delivered to the sender
    ConnectionRejected { reason: String },
    /// One synthetic progress tick. The copy sent to the sender omits
    /// `senderId` — the sender already knows who they are.
    FileProgress {
        file_index: u32,
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_id: Option<String>,
    },
    /// The full descriptor, delivered to the receiver on the final tick
    File {
        #[serde(flatten)]
        transfer: FileTransfer,
        progress: u8,
    },
}
