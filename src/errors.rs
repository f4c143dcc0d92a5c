use http::StatusCode;
use sea_orm::error::DbErr;

/// Unified error type for every service operation in the crate.
///
/// Each variant carries a machine-checkable kind (see [`ServiceError::kind`])
/// plus a human-readable message. Validation errors are raised before any
/// write happens, so a rejected operation never leaves partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Missing shipping information: {0}")]
    MissingShippingInfo(String),

    #[error("Variant must be specified for product {0}")]
    VariantRequired(String),

    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    #[error("Product is out of stock: {0}")]
    OutOfStock(String),

    #[error("Cannot add more than available stock: {0}")]
    InsufficientStock(String),

    #[error("Requested quantity exceeds available stock: {0}")]
    ExceedsStock(String),

    #[error("Coupon expired: {0}")]
    CouponExpired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<crate::cache::CacheError> for ServiceError {
    fn from(err: crate::cache::CacheError) -> Self {
        ServiceError::CacheError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-checkable error kind, suitable for API payloads and
    /// for collaborators that dispatch on error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptyCart => "empty_cart",
            Self::MissingShippingInfo(_) => "missing_shipping_info",
            Self::VariantRequired(_) => "variant_required",
            Self::VariantNotFound(_) => "variant_not_found",
            Self::OutOfStock(_) => "out_of_stock",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::ExceedsStock(_) => "exceeds_stock",
            Self::CouponExpired(_) => "coupon_expired",
            Self::Conflict(_) => "conflict",
            Self::PaymentFailed(_) => "payment_failed",
            Self::VerificationFailed(_) => "verification_failed",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::CacheError(_) => "cache_error",
            Self::SerializationError(_) => "serialization_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::VariantNotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidInput(_)
            | Self::EmptyCart
            | Self::MissingShippingInfo(_)
            | Self::VariantRequired(_)
            | Self::CouponExpired(_) => StatusCode::BAD_REQUEST,
            Self::OutOfStock(_) | Self::InsufficientStock(_) | Self::ExceedsStock(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PaymentFailed(_) | Self::VerificationFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::CacheError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for responses to callers.
    /// Internal errors return generic messages to avoid leaking details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::CacheError(_) | Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::VariantNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::VariantRequired("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::EmptyCart.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::VerificationFailed("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ServiceError::ExternalServiceError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ServiceError::InternalError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn kinds_are_distinct_per_stock_failure() {
        assert_eq!(ServiceError::OutOfStock("p".into()).kind(), "out_of_stock");
        assert_eq!(
            ServiceError::InsufficientStock("p".into()).kind(),
            "insufficient_stock"
        );
        assert_eq!(ServiceError::ExceedsStock("p".into()).kind(), "exceeds_stock");
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::CacheError("redis exploded".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("secret".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::NotFound("Coupon not found".into()).response_message(),
            "Not found: Coupon not found"
        );
    }
}
