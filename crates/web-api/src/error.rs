use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::DomainError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(DomainError::InvalidArgument { field, reason }) => {
                ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "INVALID_ARGUMENT",
                    format!("{field}: {reason}"),
                )
            }
            ApplicationError::Store(err) => {
                tracing::error!(error = %err, "消息存储不可用");
                ApiError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    err.to_string(),
                )
            }
            ApplicationError::Cancelled => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "REQUEST_CANCELLED",
                "request cancelled",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use domain::StoreError;

    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = ApiError::from(ApplicationError::Domain(DomainError::invalid_argument(
            "sender",
            "cannot be empty",
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.body.code, "INVALID_ARGUMENT");
    }

    #[test]
    fn store_failure_maps_to_service_unavailable() {
        let err = ApiError::from(ApplicationError::Store(StoreError::unavailable("offline")));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body.code, "STORE_UNAVAILABLE");
    }

    #[test]
    fn cancellation_maps_to_service_unavailable() {
        let err = ApiError::from(ApplicationError::Cancelled);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.body.code, "REQUEST_CANCELLED");
    }
}
