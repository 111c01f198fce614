//! Side effects the client asks the UI layer to perform.
//!
//! The client never sleeps or navigates itself; it emits these and whoever
//! holds the receiving end (see [`crate::ui`]) owns timing and cancellation.

use std::time::Duration;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Short-lived, non-blocking notification
    Toast(Toast),
    /// Replace the current view with `to` once `delay` has elapsed
    Navigate { to: String, delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub message: String,
    pub duration: Duration,
}

impl Toast {
    pub fn new(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            message: message.into(),
            duration,
        }
    }
}
