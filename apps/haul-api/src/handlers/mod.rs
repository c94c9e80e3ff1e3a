//! Request handlers

pub mod hos;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use haulwatch_domain::hos::{ErrorCategory, HosError};
use tracing::{error, warn};

use crate::dto::hos::ErrorResponse;

/// A domain error on its way out as an HTTP response
#[derive(Debug)]
pub struct ApiError {
    error: HosError,
    status: StatusCode,
}

impl From<HosError> for ApiError {
    fn from(error: HosError) -> Self {
        let status = status_for(&error);
        Self { error, status }
    }
}

impl ApiError {
    /// Map an error from recording a transition
    ///
    /// An unknown driver named in a transition body is a conflict, not a
    /// missing resource.
    pub fn from_transition(error: HosError) -> Self {
        match error {
            HosError::UnknownDriver(_) => Self {
                error,
                status: StatusCode::CONFLICT,
            },
            error => Self::from(error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(error: &HosError) -> StatusCode {
    match error {
        HosError::UnknownDriver(_) | HosError::SegmentNotFound { .. } => StatusCode::NOT_FOUND,
        HosError::LockTimeout { .. } => StatusCode::CONFLICT,
        HosError::StorageFailure(_) | HosError::GateFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        err => match err.category() {
            ErrorCategory::Gate | ErrorCategory::Integrity => StatusCode::CONFLICT,
            ErrorCategory::Input => StatusCode::BAD_REQUEST,
            ErrorCategory::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.error.code(), error = %self.error, "Request failed");
        } else {
            warn!(code = self.error.code(), error = %self.error, "Request rejected");
        }

        let body = ErrorResponse {
            code: self.error.code().to_string(),
            message: self.error.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (HosError::no_qualifying_rest(0, 36_000), StatusCode::CONFLICT),
            (HosError::VehicleRequired, StatusCode::CONFLICT),
            (
                HosError::OverlappingSegment {
                    requested: Utc::now(),
                    open_start: Utc::now(),
                },
                StatusCode::CONFLICT,
            ),
            (HosError::unknown_driver("drv-9"), StatusCode::NOT_FOUND),
            (
                HosError::LockTimeout {
                    driver_id: "drv-1".to_string(),
                    waited_ms: 2000,
                },
                StatusCode::CONFLICT,
            ),
            (HosError::invalid_input("bad status"), StatusCode::BAD_REQUEST),
            (HosError::storage_failure("down"), StatusCode::SERVICE_UNAVAILABLE),
            (HosError::gate_failure("down"), StatusCode::SERVICE_UNAVAILABLE),
            (HosError::internal_error("bug"), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_unknown_driver_on_transition_is_conflict() {
        let err = ApiError::from_transition(HosError::unknown_driver("drv-9"));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from_transition(HosError::storage_failure("down"));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
