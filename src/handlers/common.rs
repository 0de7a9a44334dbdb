use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::HOST, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::ServiceError;
use crate::AppState;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Scheme and authority the shopper used to reach us, e.g. `https://shop.example`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin(String);

impl RequestOrigin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL for `path` on this origin
    pub fn absolute(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }

    /// Derive the origin from proxy and `Host` headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                // proxies may append; the first entry is the client-facing one
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let host = header(FORWARDED_HOST).or_else(|| header(HOST.as_str()))?;
        let scheme = header(FORWARDED_PROTO).unwrap_or("http");
        Some(Self::new(format!("{}://{}", scheme, host)))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for RequestOrigin {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(base) = state.config.public_base_url.as_deref() {
            return Ok(Self::new(base));
        }
        Self::from_headers(&parts.headers).ok_or_else(|| {
            ServiceError::BadRequest("Unable to determine request host".to_string())
        })
    }
}
