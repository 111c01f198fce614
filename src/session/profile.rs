//! User profile and permission set, normalized at ingestion.
//!
//! The backend has shipped the role collection under `role`, `roles` or
//! `roleArray`, as an array of role objects or as a single object. All of
//! those collapse into one `Vec<Role>` here so nothing downstream has to
//! care about the wire shape.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Role keys that grant administrative visibility
pub const ADMIN_ROLE_KEY: &str = "admin";
pub const TEAM_LEADER_ROLE_KEY: &str = "team_leader";
/// Sort rank of the most senior role
pub const SENIOR_ROLE_SORT: i64 = 1;

/// Grants every permission
pub const ALL_PERMISSIONS: &str = "*:*:*";
/// Grants reading other users' work logs
pub const VIEW_OTHERS_PERMISSION: &str = "work-log:view";

const ROLE_FIELDS: [&str; 3] = ["role", "roles", "roleArray"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Role {
    pub role_id: Option<i64>,
    pub role_key: Option<String>,
    pub role_name: Option<String>,
    pub role_sort: Option<i64>,
}

impl Role {
    fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            role_id: obj.get("roleId").and_then(Value::as_i64),
            role_key: obj.get("roleKey").and_then(Value::as_str).map(String::from),
            role_name: obj.get("roleName").and_then(Value::as_str).map(String::from),
            role_sort: obj.get("roleSort").and_then(Value::as_i64),
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(
            self.role_key.as_deref(),
            Some(ADMIN_ROLE_KEY) | Some(TEAM_LEADER_ROLE_KEY)
        ) || self.role_sort == Some(SENIOR_ROLE_SORT)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: Option<i64>,
    pub user_name: String,
    pub nick_name: String,
    pub avatar: String,
    pub admin: bool,
    pub roles: Vec<Role>,
}

impl UserProfile {
    /// Build a profile from the `user` object of `/getInfo`.
    ///
    /// Returns `None` when the server sent no user object at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let text = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(Self {
            user_id: obj.get("userId").and_then(Value::as_i64),
            user_name: text("userName"),
            nick_name: text("nickName"),
            avatar: text("avatar"),
            admin: obj.get("admin") == Some(&Value::Bool(true)),
            roles: normalize_roles(obj),
        })
    }

    /// Admin flag first, then any privileged role
    pub fn is_admin(&self) -> bool {
        self.admin || self.roles.iter().any(Role::is_privileged)
    }

    pub fn display_name(&self) -> &str {
        if self.nick_name.is_empty() {
            &self.user_name
        } else {
            &self.nick_name
        }
    }
}

/// Take the first role field that carries a value and flatten it.
///
/// `null`, `false`, `0` and `""` count as "not there" and fall through to
/// the next field name; an empty array or object stops the search.
fn normalize_roles(obj: &Map<String, Value>) -> Vec<Role> {
    let field = ROLE_FIELDS
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|value| is_set(value));

    match field {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(Role::from_object)
            .collect(),
        Some(Value::Object(role)) => vec![Role::from_object(role)],
        _ => Vec::new(),
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    pub fn new<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(permissions.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn can_view_others(&self) -> bool {
        self.contains(ALL_PERMISSIONS) || self.contains(VIEW_OTHERS_PERMISSION)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
