//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::EscrowError;
use escrow_store::StoreError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request carries no usable caller identity.
    Unauthorized(String),
    /// Error raised by the escrow core.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::Validation(_) | SagaError::SagaFailed { .. } => StatusCode::BAD_REQUEST,
        SagaError::Forbidden(_) => StatusCode::FORBIDDEN,
        SagaError::EscrowNotFound(_) | SagaError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        SagaError::PreconditionFailed(_)
        | SagaError::Store(StoreError::ConcurrencyConflict { .. })
        | SagaError::Domain(
            EscrowError::InvalidStateTransition { .. } | EscrowError::SettlementInProgress { .. },
        ) => StatusCode::CONFLICT,
        SagaError::Domain(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{EscrowId, Version};
    use domain::{EscrowStatus, Settlement};

    fn status_of(err: SagaError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_saga_error_status_codes() {
        assert_eq!(
            status_of(SagaError::Validation("amount".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SagaError::SagaFailed {
                message: "Saga failed at step 'reserve_listing'".into()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(SagaError::Forbidden("seller only".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(SagaError::EscrowNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(SagaError::PreconditionFailed("not delivered".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(SagaError::WalletService("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_conflicts_map_to_409() {
        let conflict = SagaError::Store(StoreError::ConcurrencyConflict {
            escrow_id: EscrowId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert_eq!(status_of(conflict), StatusCode::CONFLICT);

        let transition = SagaError::Domain(EscrowError::InvalidStateTransition {
            current: EscrowStatus::Released,
            action: "refund",
        });
        assert_eq!(status_of(transition), StatusCode::CONFLICT);

        let claimed = SagaError::Domain(EscrowError::SettlementInProgress {
            pending: Settlement::ToSeller,
        });
        assert_eq!(status_of(claimed), StatusCode::CONFLICT);
    }

    #[test]
    fn test_missing_identity_is_401() {
        let response = ApiError::Unauthorized("missing x-user-id".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
