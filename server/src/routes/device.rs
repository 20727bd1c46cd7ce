//! Shared helper for the optional `X-Device-ID` header (§6): an opaque per-client
//! UUID used for per-device single-flight and telemetry.

use axum::http::HeaderMap;

pub fn device_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-device-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
