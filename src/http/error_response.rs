//! Mapping of [`PackError`] onto the HTTP error contract.
//!
//! Every error response carries a JSON body
//!
//! ```json
//! {
//!   "code": "VALIDATION_ERROR",
//!   "message": "...",
//!   "error_id": "5f0c...",
//!   "retryable": false,
//!   "retry_strategy": "none",
//!   "classification": "user_action_required"
//! }
//! ```
//!
//! and an `X-Error-ID` header with the same `error_id`. The id is also
//! logged, so a support ticket quoting it can be matched to the server log.

use crate::error::PackError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

pub const X_ERROR_ID: &str = "x-error-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    UserActionRequired,
    SystemTransient,
    DeveloperBug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    None,
    Immediate,
    ExponentialBackoff,
    /// Wait for the `Retry-After` header before retrying.
    AfterRetryAfter,
}

/// How one error class is presented to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    pub code: &'static str,
    pub status: StatusCode,
    pub classification: Classification,
    pub retry_strategy: RetryStrategy,
}

impl ErrorClass {
    const fn user(code: &'static str, status: StatusCode) -> Self {
        Self {
            code,
            status,
            classification: Classification::UserActionRequired,
            retry_strategy: RetryStrategy::None,
        }
    }

    pub fn retryable(self) -> bool {
        self.retry_strategy != RetryStrategy::None
    }
}

const QUERY_ERROR: &str = "QUERY_ERROR";

pub fn classify(err: &PackError) -> ErrorClass {
    match err {
        PackError::Validation(_) => ErrorClass::user("VALIDATION_ERROR", StatusCode::BAD_REQUEST),
        PackError::InvalidFormat(_) => ErrorClass::user("INVALID_FORMAT", StatusCode::BAD_REQUEST),
        PackError::Unauthorized(_) => ErrorClass::user("UNAUTHORIZED", StatusCode::UNAUTHORIZED),
        PackError::Forbidden(_) => ErrorClass::user("FORBIDDEN", StatusCode::FORBIDDEN),
        PackError::NotFound(_) => ErrorClass::user("NOT_FOUND", StatusCode::NOT_FOUND),
        PackError::MethodNotAllowed(_) => {
            ErrorClass::user("METHOD_NOT_ALLOWED", StatusCode::METHOD_NOT_ALLOWED)
        }
        PackError::RunFinalized(_) | PackError::InvalidState(_) => {
            ErrorClass::user("CONFLICT", StatusCode::CONFLICT)
        }
        PackError::Query(_) => ErrorClass {
            code: QUERY_ERROR,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            classification: Classification::SystemTransient,
            retry_strategy: RetryStrategy::ExponentialBackoff,
        },
        PackError::Timeout(_) => ErrorClass {
            code: "TIMEOUT",
            status: StatusCode::GATEWAY_TIMEOUT,
            classification: Classification::SystemTransient,
            retry_strategy: RetryStrategy::ExponentialBackoff,
        },
        PackError::Io(_) => ErrorClass {
            code: QUERY_ERROR,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            classification: Classification::SystemTransient,
            retry_strategy: RetryStrategy::Immediate,
        },
        PackError::Canonical(_)
        | PackError::Sanitization(_)
        | PackError::Pdf(_)
        | PackError::Archive(_)
        | PackError::Config(_)
        | PackError::Other(_) => ErrorClass {
            code: QUERY_ERROR,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            classification: Classification::DeveloperBug,
            retry_strategy: RetryStrategy::None,
        },
    }
}

/// Client-facing message. Internal failures get a generic text so storage
/// paths and library errors stay in the server log.
fn public_message(err: &PackError, class: ErrorClass) -> String {
    if class.status.is_server_error() {
        match err {
            PackError::Timeout(msg) => msg.clone(),
            PackError::Query(_) => "Failed to load compliance data".to_owned(),
            _ => "Failed to produce the requested audit artifact".to_owned(),
        }
    } else {
        err.to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub error_id: String,
    pub retryable: bool,
    pub retry_strategy: RetryStrategy,
    pub classification: Classification,
}

/// A handler error, rendered through [`IntoResponse`].
#[derive(Debug)]
pub struct ApiError(pub PackError);

impl From<PackError> for ApiError {
    fn from(err: PackError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PackError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let class = classify(&self.0);
        let error_id = Uuid::new_v4().to_string();

        if class.status.is_server_error() {
            tracing::error!(error_id = %error_id, code = class.code, error = %self.0, "request failed");
        } else {
            tracing::warn!(error_id = %error_id, code = class.code, error = %self.0, "request rejected");
        }

        let body = ErrorBody {
            code: class.code,
            message: public_message(&self.0, class),
            error_id: error_id.clone(),
            retryable: class.retryable(),
            retry_strategy: class.retry_strategy,
            classification: class.classification,
        };

        let mut response = (class.status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&error_id) {
            response.headers_mut().insert(X_ERROR_ID, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<PackError> {
        vec![
            PackError::Validation(String::new()),
            PackError::InvalidFormat(String::new()),
            PackError::Unauthorized(String::new()),
            PackError::Forbidden(String::new()),
            PackError::NotFound(String::new()),
            PackError::MethodNotAllowed(String::new()),
            PackError::Query(String::new()),
            PackError::Canonical(String::new()),
            PackError::Sanitization(String::new()),
            PackError::Pdf(String::new()),
            PackError::Archive(String::new()),
            PackError::RunFinalized(String::new()),
            PackError::InvalidState(String::new()),
            PackError::Timeout(String::new()),
            PackError::Io(std::io::Error::other("disk")),
            PackError::Config(String::new()),
            PackError::Other(String::new()),
        ]
    }

    #[test]
    fn test_retryable_iff_strategy_is_not_none() {
        for err in all_errors() {
            let class = classify(&err);
            assert_eq!(
                class.retryable(),
                class.retry_strategy != RetryStrategy::None,
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_user_errors_are_4xx() {
        for err in all_errors() {
            let class = classify(&err);
            assert_eq!(
                class.classification == Classification::UserActionRequired,
                class.status.is_client_error(),
                "{err:?}"
            );
        }
    }

    #[test]
    fn test_specific_mappings() {
        let timeout = classify(&PackError::Timeout(String::new()));
        assert_eq!(timeout.code, "TIMEOUT");
        assert_eq!(timeout.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.retry_strategy, RetryStrategy::ExponentialBackoff);

        let finalized = classify(&PackError::RunFinalized(String::new()));
        assert_eq!(finalized.code, "CONFLICT");
        assert_eq!(finalized.status, StatusCode::CONFLICT);

        let io = classify(&PackError::Io(std::io::Error::other("disk")));
        assert_eq!(io.retry_strategy, RetryStrategy::Immediate);

        let pdf = classify(&PackError::Pdf(String::new()));
        assert_eq!(pdf.classification, Classification::DeveloperBug);
        assert!(!pdf.retryable());
    }

    #[test]
    fn test_contexted_io_stays_transient() {
        use crate::error::ResultExt as _;

        let failed: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::from(std::io::ErrorKind::StorageFull));
        let err = failed.context("Failed to record pack").unwrap_err();
        let class = classify(&err);
        assert_eq!(class.classification, Classification::SystemTransient);
        assert_eq!(class.retry_strategy, RetryStrategy::Immediate);
        assert!(class.retryable());
    }

    #[test]
    fn test_retry_strategy_wire_names() {
        let names: Vec<String> = [
            RetryStrategy::None,
            RetryStrategy::Immediate,
            RetryStrategy::ExponentialBackoff,
            RetryStrategy::AfterRetryAfter,
        ]
        .iter()
        .map(|s| serde_json::to_value(s).unwrap().as_str().unwrap().to_owned())
        .collect();
        assert_eq!(
            names,
            ["none", "immediate", "exponential_backoff", "after_retry_after"]
        );
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let err = PackError::Io(std::io::Error::other("/var/lib/proofpack/packs"));
        let class = classify(&err);
        assert!(!public_message(&err, class).contains("/var/lib"));
    }

    #[test]
    fn test_response_carries_error_id_header() {
        let response = ApiError(PackError::Forbidden("member".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().contains_key(X_ERROR_ID));
    }
}
