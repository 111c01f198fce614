pub mod api;
pub mod cli;
pub mod config;
pub mod logs;
pub mod router;
pub mod session;
pub mod ui;

#[cfg(test)]
pub(crate) mod test_support;

use config::Config;
use std::sync::Arc;

use crate::api::{ApiError, EventReceiver, HttpClient, WorkLogApi};
use crate::logs::{Clock, LogStore};
use crate::router::Router;
use crate::session::{CredentialStore, SessionStore};

/// Everything a view needs, shared behind `Arc`s.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub credentials: Arc<dyn CredentialStore>,
    pub api: Arc<WorkLogApi>,
    pub session: Arc<SessionStore>,
    pub logs: Arc<LogStore>,
    pub router: Arc<Router>,
}

impl AppContext {
    /// Wire the stores together. The returned receiver carries the toasts and
    /// navigations produced by the HTTP layer and must be drained by the UI.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, EventReceiver), ApiError> {
        let (events_tx, events_rx) = api::channel();

        let client = HttpClient::new(
            &config.api,
            config.session.redirect_delay(),
            credentials.clone(),
            events_tx,
        )?;
        let api = Arc::new(WorkLogApi::new(client));
        let session = Arc::new(SessionStore::new(api.clone(), credentials.clone()));
        let logs = Arc::new(LogStore::new(api.clone(), clock));
        let router = Arc::new(Router::new(session.clone()));

        Ok((
            Self {
                config,
                credentials,
                api,
                session,
                logs,
                router,
            },
            events_rx,
        ))
    }
}
