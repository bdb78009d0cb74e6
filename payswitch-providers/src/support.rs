//! Header and payload helpers shared by the adapters.

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use payswitch::{Metadata, SwitchError};
use serde_json::Value;

/// `Content-Type` and `Accept` set to JSON.
pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Inserts a header whose value comes from configuration or caller input.
pub fn insert_header(
    headers: &mut HeaderMap,
    name: HeaderName,
    value: &str,
) -> Result<(), SwitchError> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        SwitchError::Configuration(format!("value for header '{name}' is not a valid header value"))
    })?;
    headers.insert(name, value);
    Ok(())
}

/// Top-level object of a response body, for `metadata` fields.
pub fn body_metadata(body: &Value) -> Metadata {
    body.as_object().cloned().unwrap_or_default()
}
