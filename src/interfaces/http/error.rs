//! Maps engine errors onto HTTP responses.

use crate::error::BookingError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Engine(#[from] BookingError),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        let ApiError::Engine(err) = self else {
            return "UNAUTHORIZED";
        };
        match err {
            BookingError::ValidationError(_) => "VALIDATION_ERROR",
            BookingError::RoomUnavailable { .. } => "ROOM_UNAVAILABLE",
            BookingError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BookingError::Forbidden { .. } => "FORBIDDEN",
            BookingError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            BookingError::PaymentVerificationFailed(_) => "PAYMENT_VERIFICATION_FAILED",
            BookingError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            BookingError::ReferenceConflict { .. } => "REFERENCE_CONFLICT",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::GatewayError(_) => "GATEWAY_ERROR",
            BookingError::Timeout(_) => "TIMEOUT",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        let ApiError::Engine(err) = self else {
            return StatusCode::UNAUTHORIZED;
        };
        match err {
            BookingError::ValidationError(_) | BookingError::PaymentVerificationFailed(_) => {
                StatusCode::BAD_REQUEST
            }
            BookingError::RoomUnavailable { .. }
            | BookingError::InvalidTransition { .. }
            | BookingError::ReferenceConflict { .. } => StatusCode::CONFLICT,
            BookingError::Forbidden { .. } | BookingError::AccountInactive(_) => {
                StatusCode::FORBIDDEN
            }
            BookingError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::GatewayError(_) => StatusCode::BAD_GATEWAY,
            BookingError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Engine(err) if err.is_retryable())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(error = %message, code, "request failed");
        } else {
            tracing::debug!(error = %message, code, "request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                retryable: self.is_retryable(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{BookingEvent, BookingStatus};
    use crate::domain::room::RoomId;
    use chrono::NaiveDate;

    #[test]
    fn test_status_codes() {
        let unavailable = ApiError::from(BookingError::RoomUnavailable {
            room: RoomId(1),
            check_in: NaiveDate::from_ymd_opt(2027, 1, 10).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2027, 1, 12).unwrap(),
        });
        assert_eq!(unavailable.status_code(), StatusCode::CONFLICT);
        assert_eq!(unavailable.error_code(), "ROOM_UNAVAILABLE");

        let transition = ApiError::from(BookingError::invalid_transition(
            BookingStatus::Cancelled,
            BookingEvent::Cancel,
            "status must be PENDING or CONFIRMED",
        ));
        assert_eq!(transition.status_code(), StatusCode::CONFLICT);

        assert_eq!(
            ApiError::Unauthorized("missing x-user-id".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(BookingError::Timeout("booking update")).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
