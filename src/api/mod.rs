//! Typed access to the work-log backend.
//!
//! One method per REST endpoint; every call goes through [`HttpClient`], so
//! authentication, notifications and session expiry behave the same
//! everywhere.

pub mod client;
pub mod envelope;
pub mod error;
pub mod events;
pub mod models;

pub use client::{HttpClient, RequestBody, RequestOptions, LOGIN_PATH, LOGIN_VIEW};
pub use envelope::Envelope;
pub use error::{ApiError, ErrorKind};
pub use events::{channel, ClientEvent, EventReceiver, EventSender, Toast};
pub use models::{
    Captcha, LogDraft, LogEntry, LoginForm, SysUser, UploadedFile, UserPage, UserQuery, WeekLogs,
};

use chrono::NaiveDate;
use reqwest::multipart;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct WorkLogApi {
    client: HttpClient,
}

impl WorkLogApi {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    pub async fn captcha(&self) -> Result<Captcha, ApiError> {
        let envelope = self
            .client
            .get("/captchaImage", RequestOptions::new().anonymous())
            .await?;
        let value = serde_json::Value::Object(envelope.extra);
        Ok(serde_json::from_value(value)?)
    }

    pub async fn login(&self, form: &LoginForm) -> Result<Envelope, ApiError> {
        let body = RequestBody::Json(serde_json::to_value(form)?);
        self.client.post(LOGIN_PATH, body).await
    }

    /// Profile and permissions of the current credential
    pub async fn get_info(&self) -> Result<Envelope, ApiError> {
        self.client.get("/getInfo", RequestOptions::default()).await
    }

    pub async fn logout(&self) -> Result<Envelope, ApiError> {
        self.client.post("/logout", RequestBody::Empty).await
    }

    // ------------------------------------------------------------------
    // Work logs
    // ------------------------------------------------------------------

    pub async fn month_logs(&self, year: i32, month: u32) -> Result<Vec<LogEntry>, ApiError> {
        let path = format!("/work-logs/calendar/{}/{}", year, month);
        let envelope = self.client.get(&path, RequestOptions::default()).await?;
        Ok(envelope.data_as()?.unwrap_or_default())
    }

    pub async fn user_month_logs(
        &self,
        user_id: i64,
        year: i32,
        month: u32,
    ) -> Result<Vec<LogEntry>, ApiError> {
        let path = format!("/work-logs/user/{}/calendar/{}/{}", user_id, year, month);
        let envelope = self.client.get(&path, RequestOptions::default()).await?;
        Ok(envelope.data_as()?.unwrap_or_default())
    }

    pub async fn week_logs(&self, start: NaiveDate) -> Result<WeekLogs, ApiError> {
        self.fetch_week("/work-logs/week", start).await
    }

    pub async fn user_week_logs(
        &self,
        user_id: i64,
        start: NaiveDate,
    ) -> Result<WeekLogs, ApiError> {
        let path = format!("/work-logs/user/{}/week", user_id);
        self.fetch_week(&path, start).await
    }

    async fn fetch_week(&self, path: &str, start: NaiveDate) -> Result<WeekLogs, ApiError> {
        let options = RequestOptions::new().query("start", start.format("%Y-%m-%d"));
        let envelope = self.client.get(path, options).await?;

        let bound = |name: &str| -> Result<Option<NaiveDate>, ApiError> {
            Ok(envelope
                .field_as::<String>(name)?
                .as_deref()
                .and_then(models::day::parse))
        };

        Ok(WeekLogs {
            week_start: bound("weekStart")?,
            week_end: bound("weekEnd")?,
            entries: envelope.data_as()?.unwrap_or_default(),
        })
    }

    pub async fn log_detail(&self, log_id: i64) -> Result<LogEntry, ApiError> {
        let path = format!("/work-logs/{}", log_id);
        let envelope = self.client.get(&path, RequestOptions::default()).await?;
        envelope
            .data_as()?
            .ok_or_else(|| ApiError::decode(format!("log {} came back without data", log_id)))
    }

    pub async fn add_log(&self, draft: &LogDraft) -> Result<Envelope, ApiError> {
        let body = RequestBody::Json(serde_json::to_value(draft)?);
        self.client.post("/work-logs", body).await
    }

    pub async fn update_log(&self, draft: &LogDraft) -> Result<Envelope, ApiError> {
        if draft.id.is_none() {
            return Err(ApiError::decode("cannot update a log entry without an id"));
        }
        let body = RequestBody::Json(serde_json::to_value(draft)?);
        self.client.put("/work-logs", body).await
    }

    pub async fn delete_log(&self, log_id: i64) -> Result<Envelope, ApiError> {
        self.client
            .delete(&format!("/work-logs/{}", log_id))
            .await
    }

    // ------------------------------------------------------------------
    // User directory
    // ------------------------------------------------------------------

    pub async fn user_list(&self, query: &UserQuery) -> Result<UserPage, ApiError> {
        let options = RequestOptions::new()
            .query_opt("pageNum", query.page_num)
            .query_opt("pageSize", query.page_size)
            .query_opt("userName", query.user_name.as_deref())
            .query_opt("phonenumber", query.phonenumber.as_deref())
            .query_opt("status", query.status.as_deref());
        let envelope = self.client.get("/system/user/list", options).await?;

        Ok(UserPage {
            rows: envelope.field_as("rows")?.unwrap_or_default(),
            total: envelope.field_as("total")?.unwrap_or_default(),
        })
    }

    pub async fn user_detail(&self, user_id: i64) -> Result<SysUser, ApiError> {
        let path = format!("/system/user/{}", user_id);
        let envelope = self.client.get(&path, RequestOptions::default()).await?;
        envelope
            .data_as()?
            .ok_or_else(|| ApiError::decode(format!("user {} came back without data", user_id)))
    }

    // ------------------------------------------------------------------
    // Common
    // ------------------------------------------------------------------

    pub async fn upload_file(&self, path: &Path) -> Result<UploadedFile, ApiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::File {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        debug!(file = %file_name, size = bytes.len(), "Uploading file");

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("file", part);
        let envelope = self
            .client
            .post("/common/upload", RequestBody::Multipart(form))
            .await?;

        let value = serde_json::Value::Object(envelope.extra);
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use serde_json::json;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_week_logs_reads_bounds() {
        let h = Harness::start().await;
        h.backend.on(
            "GET",
            "/work-logs/week?start=2024-03-04",
            json!({
                "code": 200,
                "data": [{ "id": 1, "log_date": "2024-03-04", "content": "a" }],
                "weekStart": "2024-03-04",
                "weekEnd": "2024-03-10"
            }),
        );

        let week = h.api.week_logs(date(2024, 3, 4)).await.unwrap();
        assert_eq!(week.entries.len(), 1);
        assert_eq!(week.week_start, Some(date(2024, 3, 4)));
        assert_eq!(week.week_end, Some(date(2024, 3, 10)));
    }

    #[tokio::test]
    async fn test_user_variants_hit_user_paths() {
        let h = Harness::start().await;
        h.backend
            .on("GET", "/work-logs/user/5/week", json!({ "code": 200 }));
        h.backend.on(
            "GET",
            "/work-logs/user/5/calendar/2024/3",
            json!({ "code": 200, "data": [] }),
        );

        let week = h.api.user_week_logs(5, date(2024, 3, 4)).await.unwrap();
        assert!(week.entries.is_empty());
        assert_eq!(week.week_start, None);

        let month = h.api.user_month_logs(5, 2024, 3).await.unwrap();
        assert!(month.is_empty());
    }

    #[tokio::test]
    async fn test_captcha_is_read_from_top_level() {
        let h = Harness::start().await;
        h.backend.on(
            "GET",
            "/captchaImage",
            json!({ "code": 200, "captchaEnabled": true, "uuid": "u-1", "img": "aGk=" }),
        );

        let captcha = h.api.captcha().await.unwrap();
        assert!(captcha.captcha_enabled);
        assert_eq!(captcha.uuid, "u-1");
        assert_eq!(captcha.img, "aGk=");
    }

    #[tokio::test]
    async fn test_user_list_sends_filters_and_reads_rows() {
        let h = Harness::start().await;
        h.backend.on(
            "GET",
            "/system/user/list",
            json!({
                "code": 200,
                "total": 1,
                "rows": [{ "userId": 5, "userName": "bob", "nickName": "Bob" }]
            }),
        );

        let query = UserQuery {
            page_num: Some(1),
            page_size: Some(20),
            user_name: Some("bob".to_string()),
            ..Default::default()
        };
        let page = h.api.user_list(&query).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].display_name(), "Bob");
        assert_eq!(
            h.backend.requests()[0].query.as_deref(),
            Some("pageNum=1&pageSize=20&userName=bob")
        );
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let h = Harness::start().await;
        let draft = LogDraft::new(date(2024, 3, 4), "x");

        let err = h.api.update_log(&draft).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
        assert!(h.backend.requests().is_empty());
    }

    #[tokio::test]
    async fn test_add_log_posts_json() {
        let h = Harness::start().await;
        h.backend.on("POST", "/work-logs", json!({ "code": 200 }));

        let draft = LogDraft::new(date(2024, 3, 4), "shipped it");
        h.api.add_log(&draft).await.unwrap();

        let request = &h.backend.requests()[0];
        assert_eq!(request.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(&request.body_text()).unwrap();
        assert_eq!(body["log_date"], "2024-03-04");
        assert_eq!(body["content"], "shipped it");
    }

    #[tokio::test]
    async fn test_log_detail_without_data_is_decode_error() {
        let h = Harness::start().await;
        h.backend.on("GET", "/work-logs/9", json!({ "code": 200 }));

        let err = h.api.log_detail(9).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_upload_sends_multipart() {
        let h = Harness::start().await;
        h.backend.on(
            "POST",
            "/common/upload",
            json!({
                "code": 200,
                "url": "http://files/a.txt",
                "fileName": "/profile/upload/a.txt",
                "originalFilename": "a.txt"
            }),
        );

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        std::fs::write(&path, "hello").unwrap();

        let uploaded = h.api.upload_file(&path).await.unwrap();
        assert_eq!(uploaded.url, "http://files/a.txt");
        assert_eq!(uploaded.original_filename.as_deref(), Some("a.txt"));

        let request = &h.backend.requests()[0];
        assert!(request
            .header("content-type")
            .unwrap_or_default()
            .starts_with("multipart/form-data"));
        assert!(request.body_text().contains("hello"));
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_before_request() {
        let h = Harness::start().await;
        let err = h
            .api
            .upload_file(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::File { .. }));
        assert!(h.backend.requests().is_empty());
    }
}
