use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use warden_core::DomainError;
use warden_infra::{ServiceError, StoreError};

/// Error half of every handler result. Maps service failures onto status
/// codes and the `{error, message}` body shape.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        Self(value)
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        Self(ServiceError::Domain(value))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self(ServiceError::Internal(format!("worker task failed: {value}")))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        service_error_to_response(self.0)
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Domain(e) => domain_error_to_response(e),
        ServiceError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
        ServiceError::Unauthenticated => {
            json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required")
        }
        ServiceError::TwoFactorRequired => json_error(
            StatusCode::UNAUTHORIZED,
            "two_factor_required",
            "a verification or recovery code is required",
        ),
        ServiceError::Store(StoreError::Unavailable(msg)) => {
            tracing::error!(error = %msg, "store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", "store unavailable")
        }
        ServiceError::Store(e) => {
            tracing::error!(error = %e, "store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::PolicyViolation(violations) => json_error_with(
            StatusCode::BAD_REQUEST,
            "policy_violation",
            "password does not meet the policy",
            json!({ "violations": violations }),
        ),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        // Expired and unknown tokens are indistinguishable to the caller.
        e @ (DomainError::InvalidToken | DomainError::ExpiredToken) => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
        }
        DomainError::Locked { until } => json_error_with(
            StatusCode::LOCKED,
            "account_locked",
            "account is temporarily locked",
            json!({ "locked_until": until }),
        ),
        DomainError::InvalidCredentials => {
            json_error(StatusCode::UNAUTHORIZED, "invalid_credentials", "invalid credentials")
        }
        DomainError::Inactive => json_error(StatusCode::FORBIDDEN, "inactive", "account inactive"),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "unauthorized"),
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with(status, code, message, Value::Null)
}

/// Like [`json_error`], merging the fields of `extra` into the body.
pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    extra: Value,
) -> Response {
    let mut body = json!({
        "error": code,
        "message": message.into(),
    });
    if let (Value::Object(body), Value::Object(extra)) = (&mut body, extra) {
        body.extend(extra);
    }
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_share_one_response() {
        let invalid = ApiError::from(DomainError::InvalidToken).into_response();
        let expired = ApiError::from(DomainError::ExpiredToken).into_response();
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.status(), invalid.status());
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (ServiceError::Domain(DomainError::NotFound), StatusCode::NOT_FOUND),
            (ServiceError::Domain(DomainError::Conflict("x".into())), StatusCode::CONFLICT),
            (ServiceError::Domain(DomainError::PolicyViolation(vec!["short".into()])), StatusCode::BAD_REQUEST),
            (ServiceError::Domain(DomainError::Inactive), StatusCode::FORBIDDEN),
            (ServiceError::Forbidden("users.view".into()), StatusCode::FORBIDDEN),
            (ServiceError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ServiceError::Store(StoreError::Unavailable("down".into())), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
