use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::credential::CredentialStore;
use super::profile::{PermissionSet, UserProfile};
use crate::api::{ApiError, Envelope, LoginForm, WorkLogApi};

#[derive(Debug, Default)]
struct SessionState {
    profile: Option<UserProfile>,
    permissions: Option<PermissionSet>,
}

/// Who is logged in and what they may see.
///
/// The credential itself lives in the shared [`CredentialStore`]; the client
/// may clear it on its own when the server answers 401. Profile and
/// permissions are only reported while a credential is held.
#[derive(Debug)]
pub struct SessionStore {
    api: Arc<WorkLogApi>,
    credentials: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(api: Arc<WorkLogApi>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Exchange credentials for a token, persist it, then load the profile.
    ///
    /// The token is kept even if the profile fetch fails afterwards.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        code: Option<&str>,
        uuid: Option<&str>,
    ) -> Result<Envelope, ApiError> {
        let form = LoginForm {
            username: username.to_string(),
            password: password.to_string(),
            code: code.unwrap_or_default().to_string(),
            uuid: uuid.unwrap_or_default().to_string(),
        };

        let envelope = self.api.login(&form).await?;
        let token = envelope
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::decode("login response carried no token"))?;

        self.credentials.store(token).map_err(ApiError::Storage)?;
        *self.state.write() = SessionState::default();
        info!(username, "Logged in");

        self.fetch_profile().await?;
        Ok(envelope)
    }

    /// Replace profile and permissions with what `/getInfo` reports. Both are
    /// cleared when the fetch fails.
    pub async fn fetch_profile(&self) -> Result<Envelope, ApiError> {
        let envelope = match self.api.get_info().await {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(error = %err, "Failed to fetch user profile");
                *self.state.write() = SessionState::default();
                return Err(err);
            }
        };

        let profile = envelope.user.as_ref().and_then(UserProfile::from_value);
        let permissions = PermissionSet::new(envelope.permissions.clone().unwrap_or_default());
        debug!(
            has_profile = profile.is_some(),
            permissions = permissions.len(),
            "Loaded user profile"
        );

        let mut state = self.state.write();
        state.profile = profile;
        state.permissions = Some(permissions);
        drop(state);

        Ok(envelope)
    }

    /// Load the profile for a credential restored from storage.
    ///
    /// Does nothing when no credential is held.
    pub async fn restore(&self) -> Result<bool, ApiError> {
        if !self.is_logged_in() {
            return Ok(false);
        }
        self.fetch_profile().await?;
        Ok(true)
    }

    /// Tell the server, then forget everything locally no matter what it said.
    pub async fn logout(&self) {
        if let Err(err) = self.api.logout().await {
            warn!(error = %err, "Remote logout failed");
        }

        if let Err(err) = self.credentials.clear() {
            warn!(error = %err, "Failed to clear stored credential");
        }
        *self.state.write() = SessionState::default();
        info!("Logged out");
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_present()
    }

    pub fn token(&self) -> Option<String> {
        self.credentials.load()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        if !self.is_logged_in() {
            return None;
        }
        self.state.read().profile.clone()
    }

    pub fn permissions(&self) -> Option<PermissionSet> {
        if !self.is_logged_in() {
            return None;
        }
        self.state.read().permissions.clone()
    }

    pub fn can_view_others(&self) -> bool {
        self.is_logged_in()
            && self
                .state
                .read()
                .permissions
                .as_ref()
                .is_some_and(PermissionSet::can_view_others)
    }

    pub fn is_admin(&self) -> bool {
        self.is_logged_in()
            && self
                .state
                .read()
                .profile
                .as_ref()
                .is_some_and(UserProfile::is_admin)
    }

    pub fn nick_name(&self) -> String {
        self.profile().map(|p| p.nick_name).unwrap_or_default()
    }

    pub fn avatar(&self) -> String {
        self.profile().map(|p| p.avatar).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use crate::session::CredentialStore;
    use crate::test_support::{drain_events, TestApp};
    use axum::http::StatusCode;
    use serde_json::json;

    fn info_body() -> serde_json::Value {
        json!({
            "code": 200,
            "user": {
                "userId": 1,
                "userName": "alice",
                "nickName": "Alice",
                "avatar": "/a.png",
                "roles": [{ "roleKey": "team_leader", "roleSort": 2 }]
            },
            "permissions": ["work-log:view"]
        })
    }

    #[tokio::test]
    async fn test_login_then_profile() {
        let app = TestApp::start().await;
        app.backend
            .on("POST", "/login", json!({ "code": 200, "token": "tok-9" }));
        app.backend.on("GET", "/getInfo", info_body());

        let session = &app.ctx.session;
        session.login("u", "p", None, None).await.unwrap();

        assert!(session.is_logged_in());
        assert_eq!(session.token().as_deref(), Some("tok-9"));
        assert_eq!(session.nick_name(), "Alice");
        assert_eq!(session.avatar(), "/a.png");
        assert!(session.is_admin());
        assert!(session.can_view_others());

        let info = &app.backend.requests_to("/getInfo")[0];
        assert_eq!(info.header("authorization"), Some("Bearer tok-9"));
    }

    #[tokio::test]
    async fn test_profile_failure_keeps_token() {
        let app = TestApp::start().await;
        app.backend
            .on("POST", "/login", json!({ "code": 200, "token": "tok-9" }));
        app.backend
            .on("GET", "/getInfo", json!({ "code": 500, "msg": "boom" }));

        let session = &app.ctx.session;
        let err = session.login("u", "p", None, None).await.unwrap_err();

        assert_eq!(err.code(), Some(500));
        assert!(session.is_logged_in());
        assert_eq!(session.profile(), None);
    }

    #[tokio::test]
    async fn test_failed_login_stores_nothing() {
        let app = TestApp::start().await;
        app.backend
            .on("POST", "/login", json!({ "code": 500, "msg": "bad password" }));

        let session = &app.ctx.session;
        assert!(session.login("u", "x", None, None).await.is_err());
        assert!(!session.is_logged_in());
        assert!(app.backend.requests_to("/getInfo").is_empty());
    }

    #[tokio::test]
    async fn test_login_without_token_is_an_error() {
        let app = TestApp::start().await;
        app.backend.on("POST", "/login", json!({ "code": 200 }));

        let session = &app.ctx.session;
        assert!(session.login("u", "p", None, None).await.is_err());
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn test_missing_permissions_become_empty_set() {
        let app = TestApp::start().await;
        app.credentials.store("tok").unwrap();
        app.backend.on(
            "GET",
            "/getInfo",
            json!({ "code": 200, "user": { "userName": "carol", "admin": true } }),
        );

        let session = &app.ctx.session;
        session.fetch_profile().await.unwrap();

        assert!(session.is_admin());
        assert!(!session.can_view_others());
        assert_eq!(session.permissions().map(|p| p.len()), Some(0));
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let mut app = TestApp::start().await;
        app.credentials.store("tok").unwrap();
        app.backend.on("GET", "/getInfo", info_body());
        app.backend.on_status(
            "POST",
            "/logout",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({}),
        );

        let session = &app.ctx.session;
        session.fetch_profile().await.unwrap();
        session.logout().await;

        assert!(!session.is_logged_in());
        assert_eq!(session.profile(), None);
        assert_eq!(session.permissions(), None);
        assert!(!session.is_admin());
        // The failed remote call still surfaced its notification
        assert_eq!(drain_events(&mut app.events).len(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_hides_profile() {
        let app = TestApp::start().await;
        app.credentials.store("tok").unwrap();
        app.backend.on("GET", "/getInfo", info_body());
        app.backend.on_status(
            "GET",
            "/work-logs/week",
            StatusCode::UNAUTHORIZED,
            json!({}),
        );

        let session = &app.ctx.session;
        session.fetch_profile().await.unwrap();
        assert!(session.can_view_others());

        let _ = app
            .ctx
            .api
            .week_logs(chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .await;

        assert!(!session.is_logged_in());
        assert_eq!(session.profile(), None);
        assert!(!session.can_view_others());
        assert!(!session.is_admin());
    }

    #[tokio::test]
    async fn test_relogin_with_failed_profile_drops_previous_user() {
        let app = TestApp::start().await;
        app.credentials.store("tok-alice").unwrap();
        app.backend.on(
            "GET",
            "/getInfo",
            json!({
                "code": 200,
                "user": { "userName": "alice", "admin": true },
                "permissions": ["*:*:*"]
            }),
        );
        app.backend.on_status(
            "GET",
            "/work-logs/week",
            StatusCode::UNAUTHORIZED,
            json!({}),
        );

        let session = &app.ctx.session;
        session.fetch_profile().await.unwrap();
        assert!(session.is_admin());

        let _ = app
            .ctx
            .api
            .week_logs(chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap())
            .await;
        assert!(!session.is_logged_in());

        app.backend
            .on("POST", "/login", json!({ "code": 200, "token": "tok-bob" }));
        app.backend
            .on("GET", "/getInfo", json!({ "code": 500, "msg": "boom" }));
        assert!(session.login("bob", "p", None, None).await.is_err());

        assert!(session.is_logged_in());
        assert_eq!(session.token().as_deref(), Some("tok-bob"));
        assert_eq!(session.profile(), None);
        assert_eq!(session.permissions(), None);
        assert!(!session.is_admin());
        assert!(!session.can_view_others());
    }

    #[tokio::test]
    async fn test_failed_refresh_forgets_stale_profile() {
        let app = TestApp::start().await;
        app.credentials.store("tok").unwrap();
        app.backend.on("GET", "/getInfo", info_body());

        let session = &app.ctx.session;
        session.fetch_profile().await.unwrap();
        assert_eq!(session.nick_name(), "Alice");

        app.backend
            .on("GET", "/getInfo", json!({ "code": 500, "msg": "boom" }));
        assert!(session.fetch_profile().await.is_err());

        assert!(session.is_logged_in());
        assert_eq!(session.profile(), None);
        assert!(!session.can_view_others());
    }

    #[tokio::test]
    async fn test_restore_without_credential_is_noop() {
        let app = TestApp::start().await;
        assert!(!app.ctx.session.restore().await.unwrap());
        assert!(app.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_restore_with_credential_loads_profile() {
        let app = TestApp::start().await;
        app.credentials.store("tok").unwrap();
        app.backend.on("GET", "/getInfo", info_body());

        assert!(app.ctx.session.restore().await.unwrap());
        assert_eq!(app.ctx.session.nick_name(), "Alice");
    }

    #[tokio::test]
    async fn test_no_profile_means_not_admin() {
        let app = TestApp::start().await;
        assert!(!app.ctx.session.is_admin());
        assert!(!app.ctx.session.can_view_others());
        assert_eq!(app.ctx.session.nick_name(), "");
    }
}
