use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gate::{Accepted, AdmissionController, PlayReport, Rejection};

/// Key used when a request carries no client address headers.
pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub engagement_duration_ms: Option<f64>,
    #[serde(default)]
    pub content_fingerprint: Option<String>,
}

impl From<PlayRequest> for PlayReport {
    fn from(req: PlayRequest) -> Self {
        // Browsers report fractional or negative durations on clock skew.
        let engagement_duration_ms = req.engagement_duration_ms.map(|ms| {
            if ms.is_finite() && ms > 0.0 {
                ms as u64
            } else {
                0
            }
        });
        PlayReport {
            item_id: req.item_id,
            engagement_duration_ms,
            content_fingerprint: req.content_fingerprint,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayAccepted {
    pub ok: bool,
    pub item_id: String,
    pub play_count: u64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayRejected {
    pub ok: bool,
    pub reason: String,
    pub message: String,
}

pub fn router(controller: Arc<AdmissionController>) -> Router {
    Router::new()
        .route("/api/plays", post(record_play))
        .route("/healthz", get(healthz))
        .with_state(controller)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn record_play(
    State(controller): State<Arc<AdmissionController>>,
    headers: HeaderMap,
    body: Result<Json<PlayRequest>, JsonRejection>,
) -> Response {
    let source = source_key(&headers);
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(%source, error = %rejection, "malformed play report");
            return rejected(
                StatusCode::BAD_REQUEST,
                "INVALID_BODY",
                rejection.body_text(),
            );
        }
    };

    match controller.admit(&source, request.into()) {
        Ok(Accepted {
            item_id,
            play_count,
        }) => (
            StatusCode::OK,
            Json(PlayAccepted {
                ok: true,
                item_id,
                play_count,
            }),
        )
            .into_response(),
        Err(rejection) => rejection_response(rejection),
    }
}

fn rejection_response(rejection: Rejection) -> Response {
    let status = match &rejection {
        Rejection::MissingItemId | Rejection::TooShort { .. } | Rejection::ContentMismatch(_) => {
            StatusCode::BAD_REQUEST
        }
        Rejection::NotFound(_) => StatusCode::NOT_FOUND,
        Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Rejection::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &rejection {
        // Store details stay in the logs.
        Rejection::Store(_) => "failed to record play".to_string(),
        other => other.to_string(),
    };

    let mut response = rejected(status, rejection.reason_code(), message);
    if let Rejection::RateLimited { retry_after } = rejection {
        if let Ok(value) = HeaderValue::from_str(&retry_after_secs(retry_after).to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    response
}

fn rejected(status: StatusCode, reason: &str, message: String) -> Response {
    (
        status,
        Json(PlayRejected {
            ok: false,
            reason: reason.to_string(),
            message,
        }),
    )
        .into_response()
}

/// Whole seconds, rounded up, never zero.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Client address as reported by the fronting proxy.
pub fn source_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    forwarded
        .or_else(real_ip)
        .unwrap_or(UNKNOWN_SOURCE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn source_prefers_first_forwarded_address() {
        let h = headers(&[
            ("x-forwarded-for", "198.51.100.4, 10.0.0.1"),
            ("x-real-ip", "10.0.0.1"),
        ]);
        assert_eq!(source_key(&h), "198.51.100.4");
    }

    #[test]
    fn source_falls_back_to_real_ip_then_unknown() {
        assert_eq!(source_key(&headers(&[("x-real-ip", "192.0.2.9")])), "192.0.2.9");
        assert_eq!(source_key(&headers(&[("x-forwarded-for", " ")])), UNKNOWN_SOURCE);
        assert_eq!(source_key(&HeaderMap::new()), UNKNOWN_SOURCE);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(29_001)), 30);
        assert_eq!(retry_after_secs(Duration::from_secs(30)), 30);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn fractional_and_negative_durations() {
        let report: PlayReport = PlayRequest {
            item_id: Some("a".to_string()),
            engagement_duration_ms: Some(5_000.7),
            content_fingerprint: None,
        }
        .into();
        assert_eq!(report.engagement_duration_ms, Some(5_000));

        let report: PlayReport = PlayRequest {
            engagement_duration_ms: Some(-3.0),
            ..PlayRequest::default()
        }
        .into();
        assert_eq!(report.engagement_duration_ms, Some(0));
    }
}
