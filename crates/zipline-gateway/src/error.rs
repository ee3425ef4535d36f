use crate::model::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;
use zipline_core::ServiceError;

pub type Result<T> = std::result::Result<T, ApiError>;

/// An error ready to leave the adapter: a status code plus the public
/// error string. The `error` values are part of the API contract.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// The 429 envelope returned on admission denial.
    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limit_exceeded",
            "Too many requests, please try again later",
        )
    }

    pub fn cleanup_failed(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "cleanup_failed",
            message,
        )
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::UrlTooLong { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "url_too_long", err.to_string())
            }
            ServiceError::InvalidUrl(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_url", err.to_string())
            }
            ServiceError::UrlBlocked(_) => {
                Self::new(StatusCode::FORBIDDEN, "url_blocked", err.to_string())
            }
            ServiceError::AliasExists(_) => {
                Self::new(StatusCode::CONFLICT, "alias_exists", err.to_string())
            }
            // A malformed code cannot name a record.
            ServiceError::InvalidCode(_) | ServiceError::NotFound => Self::new(
                StatusCode::NOT_FOUND,
                "url_not_found",
                "URL not found or no longer available",
            ),
            ServiceError::Deleted => Self::new(
                StatusCode::GONE,
                "url_deleted",
                "URL not found or no longer available",
            ),
            ServiceError::Expired => Self::new(
                StatusCode::GONE,
                "url_expired",
                "URL not found or no longer available",
            ),
            ServiceError::CodeSpaceExhausted | ServiceError::Store(_) => {
                error!(error = %err, "internal error while serving request");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zipline_core::StoreError;

    #[test]
    fn service_errors_map_to_the_public_contract() {
        let cases = [
            (ServiceError::UrlTooLong { max: 2048 }, StatusCode::BAD_REQUEST, "url_too_long"),
            (ServiceError::InvalidUrl("x".into()), StatusCode::BAD_REQUEST, "invalid_url"),
            (ServiceError::UrlBlocked("h".into()), StatusCode::FORBIDDEN, "url_blocked"),
            (ServiceError::AliasExists("a".into()), StatusCode::CONFLICT, "alias_exists"),
            (ServiceError::NotFound, StatusCode::NOT_FOUND, "url_not_found"),
            (ServiceError::Deleted, StatusCode::GONE, "url_deleted"),
            (ServiceError::Expired, StatusCode::GONE, "url_expired"),
            (
                ServiceError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];

        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }
}
