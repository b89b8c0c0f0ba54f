//! Response envelope shared by every Bend endpoint.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Metadata attached to every response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: String,
    pub uri: String,
}

/// `{meta, data, error}` wrapper. A non-null `error` is a failure even on 2xx.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub meta: ResponseMeta,
    pub data: Option<T>,
    pub error: Option<Value>,
}

/// Render an envelope `error` value for a message: strings as-is, anything else as JSON.
pub fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string),
        other => other.to_string(),
    }
}

/// Treat an explicit `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
