use super::types::SignalMessage;
use super::{Relay, RelayError};
use crate::ws::broadcast::send_event;
use crate::ws::protocol::ServerEvent;
use crate::ws::ConnectionHandle;

impl Relay {
    /// Forward a signaling message to its recipient.
    ///
    /// The payload is passed through untouched and the sender gets no
    /// acknowledgement. An unknown recipient is reported back to the sender
    /// as `signal-error`.
    pub fn route(&self, message: SignalMessage, sender: &ConnectionHandle) {
        if let Err(err) = self.forward(message, sender) {
            match &err {
                RelayError::UnknownRecipient { to } => {
                    tracing::debug!(
                        handle_id = %sender.id(),
                        to = %to,
                        "Signal target not connected"
                    );
                    send_event(
                        sender,
                        &ServerEvent::SignalError {
                            error: err.to_string(),
                            to: to.clone(),
                        },
                    );
                }
            }
        }
    }

    /// Resolve `message.to` and deliver exactly one `signal` event to it.
    pub fn forward(
        &self,
        message: SignalMessage,
        sender: &ConnectionHandle,
    ) -> Result<(), RelayError> {
        let target = self
            .connections
            .resolve(&message.to)
            .ok_or_else(|| RelayError::UnknownRecipient {
                to: message.to.clone(),
            })?;

        if let Some(sender_user) = self.connections.reverse_resolve(sender.id()) {
            if sender_user != message.from {
                tracing::debug!(
                    handle_id = %sender.id(),
                    registered_as = %sender_user,
                    claimed_from = %message.from,
                    "Signal sender differs from registered user"
                );
            }
        }

        send_event(
            &target,
            &ServerEvent::Signal {
                kind: message.kind,
                data: message.data,
                from: message.from,
            },
        );
        Ok(())
    }
}
