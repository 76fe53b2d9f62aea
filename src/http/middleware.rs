use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument as _;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const TRACEPARENT: &str = "traceparent";
pub const X_TRACEPARENT: &str = "x-traceparent";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Request id for this exchange, as stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// The client's `X-Request-ID` if it is 1 to 128 visible ASCII characters,
/// otherwise a fresh UUID v4.
pub fn accept_request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| {
            !v.is_empty()
                && v.len() <= MAX_REQUEST_ID_LEN
                && v.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Tag the request with an id and a span, then stamp correlation headers on
/// whatever response comes back, errors included.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    let request_id = accept_request_id(request.headers());
    let traceparent = request.headers().get(TRACEPARENT).cloned();

    let span = tracing::info_span!(
        "http.request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).instrument(span).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(X_REQUEST_ID, value);
    }
    if let Some(value) = traceparent {
        headers.insert(X_TRACEPARENT, value.clone());
        headers.insert(TRACEPARENT, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_id(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_client_request_id_is_echoed() {
        assert_eq!(accept_request_id(&with_id("req-abc_123")), "req-abc_123");
    }

    #[test]
    fn test_unusable_request_id_is_replaced() {
        let too_long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        for bad in ["", "has space", too_long.as_str()] {
            let id = accept_request_id(&with_id(bad));
            assert_ne!(id, bad);
            assert!(Uuid::parse_str(&id).is_ok(), "{id}");
        }
    }

    #[test]
    fn test_missing_request_id_gets_uuid() {
        let id = accept_request_id(&HeaderMap::new());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_max_length_id_is_kept() {
        let id = "r".repeat(MAX_REQUEST_ID_LEN);
        assert_eq!(accept_request_id(&with_id(&id)), id);
    }
}
