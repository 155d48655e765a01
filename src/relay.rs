use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::SignalError;
use crate::protocol::{FileTransfer, ServerMessage};
use crate::registry::ConnectionRegistry;

/// Cadence and step for the synthetic progress sequence.
///
/// Progress is a fixed animation on a timer, not a measure of bytes moved:
/// the payload reaches the receiver whole on the final tick regardless of
/// its size.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSettings {
    pub step: u8,
    pub tick: Duration,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            step: 10,
            tick: Duration::from_millis(300),
        }
    }
}

/// Moves file descriptors between peer channels and drives one progress
/// sequence per transfer.
///
/// The engine holds no state of its own beyond the registry handle; each
/// relay operation owns its timer for its lifetime only. Once started, a
/// sequence runs to 100 even if either peer disconnects mid-way — sends to
/// closed channels are tolerated, not surfaced.
pub struct RelayEngine {
    registry: Arc<ConnectionRegistry>,
    settings: ProgressSettings,
}

impl RelayEngine {
    pub fn new(registry: Arc<ConnectionRegistry>, settings: ProgressSettings) -> Self {
        // A zero step would never reach 100.
        let settings = ProgressSettings {
            step: settings.step.max(1),
            tick: settings.tick,
        };
        Self { registry, settings }
    }

    /// Start relaying one transfer. Returns once the tick task is scheduled;
    /// nothing waits for the receiver to confirm anything.
    pub fn relay(&self, transfer: FileTransfer) -> Result<(), SignalError> {
        let Some(receiver) = self.registry.lookup(&transfer.receiver_id) else {
            return Err(SignalError::UnknownRecipient(transfer.receiver_id.clone()));
        };

        info!(
            sender_id = %transfer.sender_id,
            receiver_id = %transfer.receiver_id,
            file_name = %transfer.file_name,
            file_size = transfer.file_size,
            file_index = transfer.file_index,
            "relaying file"
        );

        let registry = Arc::clone(&self.registry);
        let settings = self.settings;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(settings.tick);
            // The first interval tick completes immediately; consume it so
            // the sequence starts one cadence after the descriptor arrived.
            ticker.tick().await;

            let mut progress: u8 = 0;
            while progress < 100 {
                ticker.tick().await;
                progress = progress.saturating_add(settings.step).min(100);

                receiver.send(ServerMessage::FileProgress {
                    file_index: transfer.file_index,
                    progress,
                    sender_id: Some(transfer.sender_id.clone()),
                });

                // The sender is re-resolved per tick; it may have
                // re-registered on a new channel or gone away entirely.
                if let Some(sender) = registry.lookup(&transfer.sender_id) {
                    sender.send(ServerMessage::FileProgress {
                        file_index: transfer.file_index,
                        progress,
                        sender_id: None,
                    });
                }
            }

            debug!(file_index = transfer.file_index, "delivering payload");
            receiver.send(ServerMessage::File {
                transfer,
                progress: 100,
            });
        });

        Ok(())
    }
}
