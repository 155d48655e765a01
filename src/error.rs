use thiserror::Error;
use uuid::Uuid;

/// Failures absorbed inside the signaling core.
///
/// None of these close a channel or terminate the process; the router logs
/// them and keeps handling messages. One peer's bad input never affects
/// another peer's session.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The named identifier has no live channel binding
    #[error("recipient {0} is not connected")]
    UnknownRecipient(String),
    /// A connection-response referenced an unknown or already-resolved request
    #[error("no pending request matches {0}")]
    StaleRequest(Uuid),
}
