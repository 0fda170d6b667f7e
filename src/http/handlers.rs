//! Request handlers for the admission service.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::ratelimit::{ClientKey, KeyMode, RateLimiter};

/// Shared application state.
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub key_mode: KeyMode,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, key_mode: KeyMode) -> Self {
        Self { limiter, key_mode }
    }
}

/// Body returned by `/security-check` in every outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityCheckResponse {
    pub blocked: bool,
    pub reason: &'static str,
    pub sanitized_output: Option<String>,
    pub confidence: f64,
}

impl SecurityCheckResponse {
    fn passed(sanitized: String) -> Self {
        Self {
            blocked: false,
            reason: "Input passed all security checks",
            sanitized_output: Some(sanitized),
            confidence: 0.95,
        }
    }

    fn rate_limited() -> Self {
        Self {
            blocked: true,
            reason: "Rate limit exceeded",
            sanitized_output: None,
            confidence: 0.99,
        }
    }

    fn invalid_request() -> Self {
        Self {
            blocked: true,
            reason: "Invalid request",
            sanitized_output: None,
            confidence: 0.5,
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Fields the handler reads from a request body.
#[derive(Debug, Default, PartialEq)]
struct CheckPayload {
    input: String,
    user_id: Option<String>,
}

/// Read the request body leniently.
///
/// Unparseable bodies count as `{}`. Returns `None` for well-formed JSON that
/// is not an object.
fn parse_payload(body: &[u8]) -> Option<CheckPayload> {
    let value: Value =
        serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()));
    let object = value.as_object()?;

    let input = match object.get("input") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let user_id = object
        .get("userId")
        .and_then(Value::as_str)
        .map(str::to_owned);

    Some(CheckPayload { input, user_id })
}

fn invalid_request() -> Response {
    (StatusCode::OK, Json(SecurityCheckResponse::invalid_request())).into_response()
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "turnstile",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Rate limit the caller, then echo its trimmed input.
#[instrument(skip(state, connect_info, body), fields(body_len = body.len()))]
pub async fn security_check(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Response {
    let Some(ConnectInfo(peer)) = connect_info else {
        warn!("Request has no peer address");
        return invalid_request();
    };

    let Some(payload) = parse_payload(&body) else {
        debug!(peer = %peer, "Request body is not a JSON object");
        return invalid_request();
    };

    let key = ClientKey::derive(state.key_mode, peer.ip(), payload.user_id.as_deref());
    let decision = state.limiter.check(key.as_str());

    if !decision.allowed {
        warn!(
            key = %key,
            retry_after_secs = decision.retry_after_secs,
            "Rate limit exceeded"
        );
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, decision.retry_after_secs.to_string())],
            Json(SecurityCheckResponse::rate_limited()),
        )
            .into_response();
    }

    debug!(key = %key, "Request admitted");
    Json(SecurityCheckResponse::passed(payload.input.trim().to_string())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_reads_fields() {
        let payload = parse_payload(br#"{"input": "  hello  ", "userId": "alice"}"#).unwrap();
        assert_eq!(payload.input, "  hello  ");
        assert_eq!(payload.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_parse_payload_malformed_is_empty() {
        assert_eq!(parse_payload(b"{not json"), Some(CheckPayload::default()));
        assert_eq!(parse_payload(b""), Some(CheckPayload::default()));
    }

    #[test]
    fn test_parse_payload_non_object_rejected() {
        assert!(parse_payload(b"[1, 2, 3]").is_none());
        assert!(parse_payload(b"\"text\"").is_none());
    }

    #[test]
    fn test_parse_payload_non_string_input() {
        let payload = parse_payload(br#"{"input": 42, "userId": 7}"#).unwrap();
        assert_eq!(payload.input, "42");
        assert_eq!(payload.user_id, None);
    }

    #[test]
    fn test_response_serialization() {
        let body = serde_json::to_value(SecurityCheckResponse::rate_limited()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "blocked": true,
                "reason": "Rate limit exceeded",
                "sanitizedOutput": null,
                "confidence": 0.99
            })
        );

        let body = serde_json::to_value(SecurityCheckResponse::passed("hi".into())).unwrap();
        assert_eq!(body["sanitizedOutput"], "hi");
        assert_eq!(body["blocked"], false);
    }
}
