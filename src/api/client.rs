//! Request pipeline shared by every API call.
//!
//! Outgoing: bearer credential (except for the login call, which is sent
//! form-encoded), query string, body. Incoming: HTTP 401 drops the session,
//! other transport failures are reported generically, and the envelope
//! `code` decides between success and business error.

use reqwest::header::AUTHORIZATION;
use reqwest::{multipart, Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::envelope::Envelope;
use super::error::{ApiError, UNAUTHORIZED_CODE};
use super::events::{ClientEvent, EventSender, Toast};
use crate::config::ApiConfig;
use crate::session::CredentialStore;

/// Endpoint exchanging username/password for a token
pub const LOGIN_PATH: &str = "/login";

/// View the user is sent to once the session has expired
pub const LOGIN_VIEW: &str = "/login";

pub const DEFAULT_BUSINESS_MESSAGE: &str = "Operation failed";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired";
pub const REQUEST_FAILED_MESSAGE: &str = "Network request failed";

const BUSINESS_TOAST: Duration = Duration::from_millis(2000);
const EXPIRED_TOAST: Duration = Duration::from_millis(1500);
const TRANSPORT_TOAST: Duration = Duration::from_millis(2000);

#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart(multipart::Form),
}

impl RequestBody {
    /// Flatten a JSON object into form fields. Other bodies pass through.
    fn into_form(self) -> Self {
        match self {
            RequestBody::Json(Value::Object(map)) => RequestBody::Form(
                map.into_iter()
                    .map(|(key, value)| (key, form_value(value)))
                    .collect(),
            ),
            other => other,
        }
    }
}

fn form_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Per-request knobs
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    anonymous: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Never attach the stored credential to this request
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

#[derive(Debug)]
pub struct HttpClient {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    events: EventSender,
    redirect_delay: Duration,
}

impl HttpClient {
    pub fn new(
        config: &ApiConfig,
        redirect_delay: Duration,
        credentials: Arc<dyn CredentialStore>,
        events: EventSender,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            events,
            redirect_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Envelope, ApiError> {
        self.send(Method::GET, path, RequestBody::Empty, options).await
    }

    pub async fn post(&self, path: &str, body: RequestBody) -> Result<Envelope, ApiError> {
        self.send(Method::POST, path, body, RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: RequestBody) -> Result<Envelope, ApiError> {
        self.send(Method::PUT, path, body, RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Envelope, ApiError> {
        self.send(
            Method::DELETE,
            path,
            RequestBody::Empty,
            RequestOptions::default(),
        )
        .await
    }

    /// Dispatch one request and classify the outcome.
    ///
    /// Toasts, credential clearing and the login redirect happen here; the
    /// caller only sees the returned error.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        options: RequestOptions,
    ) -> Result<Envelope, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let is_login = path == LOGIN_PATH;

        let mut request = self.http.request(method.clone(), &url);
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if !is_login && !options.anonymous {
            if let Some(token) = self.credentials.load() {
                request = request.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }

        let body = if is_login { body.into_form() } else { body };
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Form(fields) => request.form(&fields),
            RequestBody::Multipart(form) => request.multipart(form),
        };

        debug!(%method, path, "Sending request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.transport_failure(ApiError::Http(err))),
        };

        self.classify(response).await
    }

    async fn classify(&self, response: Response) -> Result<Envelope, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(self.session_expired());
        }
        if !status.is_success() {
            return Err(self.transport_failure(ApiError::Status(status)));
        }

        let envelope: Envelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(err) => return Err(self.transport_failure(ApiError::Http(err))),
        };

        if envelope.is_success() {
            return Ok(envelope);
        }

        let message = envelope
            .message()
            .unwrap_or(DEFAULT_BUSINESS_MESSAGE)
            .to_string();
        warn!(code = envelope.code, %message, "Request rejected by server");
        self.emit(ClientEvent::Toast(Toast::new(message.clone(), BUSINESS_TOAST)));

        Err(ApiError::Business {
            code: envelope.code,
            message,
            envelope: Box::new(envelope),
        })
    }

    fn session_expired(&self) -> ApiError {
        if let Err(err) = self.credentials.clear() {
            warn!(error = %err, "Failed to clear stored credential");
        }
        warn!("Session expired, redirecting to {}", LOGIN_VIEW);

        self.emit(ClientEvent::Toast(Toast::new(
            SESSION_EXPIRED_MESSAGE,
            EXPIRED_TOAST,
        )));
        self.emit(ClientEvent::Navigate {
            to: LOGIN_VIEW.to_string(),
            delay: self.redirect_delay,
        });

        ApiError::Unauthorized {
            code: UNAUTHORIZED_CODE,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
        }
    }

    fn transport_failure(&self, err: ApiError) -> ApiError {
        error!(error = %err, "Request failed");
        self.emit(ClientEvent::Toast(Toast::new(
            REQUEST_FAILED_MESSAGE,
            TRANSPORT_TOAST,
        )));
        err
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("No UI listener for client event");
        }
    }
}
