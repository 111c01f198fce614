//! Typed request and response bodies for the work-log backend.
//!
//! Work-log records use snake_case on the wire; the user directory and the
//! auth endpoints use the backend's camelCase.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// One day's log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(with = "day")]
    pub log_date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub remark: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl LogEntry {
    /// Whether the day has any written content
    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Payload for creating (`id == None`) or editing a log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(with = "day")]
    pub log_date: NaiveDate,
    pub content: String,
    pub summary: String,
    pub remark: String,
}

impl LogDraft {
    pub fn new(log_date: NaiveDate, content: impl Into<String>) -> Self {
        Self {
            id: None,
            log_date,
            content: content.into(),
            summary: String::new(),
            remark: String::new(),
        }
    }

    /// Start an edit from an existing entry
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            id: entry.id,
            log_date: entry.log_date,
            content: entry.content.clone(),
            summary: entry.summary.clone(),
            remark: entry.remark.clone(),
        }
    }
}

/// A week of entries plus the bounds the server reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekLogs {
    pub entries: Vec<LogEntry>,
    pub week_start: Option<NaiveDate>,
    pub week_end: Option<NaiveDate>,
}

/// Login form fields; `code` and `uuid` belong to the captcha
#[derive(Debug, Clone, Serialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub code: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Captcha {
    #[serde(default = "enabled_by_default")]
    pub captcha_enabled: bool,
    #[serde(default)]
    pub uuid: String,
    /// Base64-encoded image, without a data-URL prefix
    #[serde(default)]
    pub img: String,
}

fn enabled_by_default() -> bool {
    true
}

/// User directory entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SysUser {
    pub user_id: i64,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nick_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phonenumber: Option<String>,
    /// "0" active, "1" disabled
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub dept: Option<Dept>,
    #[serde(default)]
    pub create_time: Option<String>,
}

impl SysUser {
    pub fn display_name(&self) -> &str {
        if self.nick_name.is_empty() {
            &self.user_name
        } else {
            &self.nick_name
        }
    }

    pub fn dept_name(&self) -> Option<&str> {
        self.dept.as_ref().and_then(|d| d.dept_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dept {
    #[serde(default)]
    pub dept_id: Option<i64>,
    #[serde(default)]
    pub dept_name: Option<String>,
}

/// Filters for `/system/user/list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub page_num: Option<u32>,
    pub page_size: Option<u32>,
    pub user_name: Option<String>,
    pub phonenumber: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPage {
    pub rows: Vec<SysUser>,
    pub total: u64,
}

/// Result of `/common/upload`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub new_file_name: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `YYYY-MM-DD`, tolerating a trailing time part from the server
pub(crate) mod day {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid date: {}", raw)))
    }

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let head = raw.trim().get(..10)?;
        NaiveDate::parse_from_str(head, FORMAT).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_entry_tolerates_nulls_and_datetime() {
        let entry: LogEntry = serde_json::from_value(json!({
            "id": 12,
            "log_date": "2024-03-05 00:00:00",
            "content": null,
            "summary": "standup",
        }))
        .unwrap();

        assert_eq!(entry.log_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(entry.content, "");
        assert_eq!(entry.remark, "");
        assert!(!entry.has_content());
    }

    #[test]
    fn test_blank_content_is_not_content() {
        let entry: LogEntry = serde_json::from_value(json!({
            "log_date": "2024-03-05",
            "content": "   \n",
        }))
        .unwrap();
        assert!(!entry.has_content());
    }

    #[test]
    fn test_draft_serializes_snake_case_date() {
        let mut draft = LogDraft::new(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(), "wrote tests");
        draft.remark = "late".to_string();

        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["log_date"], "2024-01-09");
        assert_eq!(value["content"], "wrote tests");
        assert!(value.get("id").is_none());

        draft.id = Some(4);
        assert_eq!(serde_json::to_value(&draft).unwrap()["id"], 4);
    }

    #[test]
    fn test_sys_user_display_name_falls_back() {
        let user: SysUser = serde_json::from_value(json!({
            "userId": 5,
            "userName": "bob",
            "nickName": null,
            "dept": { "deptName": "R&D" }
        }))
        .unwrap();

        assert_eq!(user.display_name(), "bob");
        assert_eq!(user.dept_name(), Some("R&D"));
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let result: Result<LogEntry, _> =
            serde_json::from_value(json!({ "log_date": "05/03/2024" }));
        assert!(result.is_err());
    }
}
