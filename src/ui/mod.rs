//! Consumer side of the client event channel.
//!
//! The HTTP layer only emits [`ClientEvent`]s. The pump spawned here shows
//! toasts as they arrive and performs delayed navigations, which stay
//! cancellable until they fire.

use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{ClientEvent, EventReceiver, Toast};
use crate::router::Router;

pub trait Toaster: Send + Sync {
    fn show(&self, toast: &Toast);
}

/// Prints toasts to stderr so they never mix with command output
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleToaster;

impl Toaster for ConsoleToaster {
    fn show(&self, toast: &Toast) {
        eprintln!("! {}", toast.message);
    }
}

pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &str);
}

impl Navigator for Router {
    fn redirect(&self, to: &str) {
        let navigation = self.replace(to);
        info!(to = %navigation.location, "Redirected");
    }
}

pub struct EventPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl EventPump {
    /// Spawn the pump on the current runtime.
    pub fn spawn(
        events: EventReceiver,
        toaster: Arc<dyn Toaster>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(events, toaster, navigator, cancel.clone()));
        Self { cancel, handle }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the pump. Toasts still queued are shown; a pending navigation is
    /// dropped.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Event pump task failed");
        }
    }
}

async fn run(
    mut events: EventReceiver,
    toaster: Arc<dyn Toaster>,
    navigator: Arc<dyn Navigator>,
    cancel: CancellationToken,
) {
    debug!("Event pump started");
    let mut pending: Option<CancellationToken> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(ClientEvent::Toast(toast)) => toaster.show(&toast),
                Some(ClientEvent::Navigate { to, delay }) => {
                    // A newer navigation supersedes one still waiting
                    if let Some(previous) = pending.take() {
                        previous.cancel();
                    }
                    let token = cancel.child_token();
                    pending = Some(token.clone());

                    let navigator = navigator.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => debug!(to = %to, "Navigation cancelled"),
                            _ = tokio::time::sleep(delay) => navigator.redirect(&to),
                        }
                    });
                }
                None => break,
            },
        }
    }

    loop {
        match events.try_recv() {
            Ok(ClientEvent::Toast(toast)) => toaster.show(&toast),
            Ok(ClientEvent::Navigate { to, .. }) => debug!(to = %to, "Dropping navigation on shutdown"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    debug!("Event pump stopped");
}
