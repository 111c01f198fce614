//! The JSON envelope every backend response is wrapped in.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ApiError, SUCCESS_CODE};

/// `{ code, msg?, data?, token?, user?, permissions?, ... }`
///
/// Fields the backend adds per endpoint (`weekStart`, `rows`, `total`,
/// `img`, `uuid`, `url`, ...) are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    /// Server message, if it sent a non-empty one
    pub fn message(&self) -> Option<&str> {
        self.msg.as_deref().filter(|m| !m.trim().is_empty())
    }

    /// Decode `data`; a missing or null `data` yields `None`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, ApiError> {
        decode_optional(self.data.as_ref())
    }

    /// Decode one of the endpoint-specific top-level fields.
    pub fn field_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ApiError> {
        decode_optional(self.extra.get(name))
    }
}

fn decode_optional<T: DeserializeOwned>(value: Option<&Value>) -> Result<Option<T>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}
