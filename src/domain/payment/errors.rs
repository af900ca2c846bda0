//! Payment-specific error taxonomy.
//!
//! Every rejection the reconciliation engine can produce, provider-agnostic.
//! Each adapter maps these onto its own provider's error vocabulary; the
//! HTTP layer maps them onto status codes.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | SignatureInvalid | 401 |
//! | MalformedRequest | 400 |
//! | TransactionNotFound | 404 |
//! | AlreadyProcessed | 200 (success acknowledgement) |
//! | AmountMismatch | 400 |
//! | PlanNotFound | 400 |
//! | DuplicatePendingTransaction | 409 |
//! | ProviderReportedCancellation | 400 |
//! | UserNotFound | 404 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, TransactionId, UserId};

/// Errors arising while reconciling a payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Webhook signature did not match. Hard rejection; no state touched.
    SignatureInvalid,

    /// Request body missing fields or unparseable. Rejected before any
    /// store access.
    MalformedRequest(String),

    /// No transaction matches the supplied reference.
    TransactionNotFound(String),

    /// The transaction was already decided. Idempotent replay - callers
    /// translate this into a success acknowledgement, never a failure.
    AlreadyProcessed(TransactionId),

    /// Claimed amount differs from the stored amount beyond tolerance.
    AmountMismatch {
        expected: i64,
        claimed: i64,
    },

    /// No plan in the catalog matches the request.
    PlanNotFound(String),

    /// Another transaction for the same user and plan is still pending.
    DuplicatePendingTransaction {
        user_id: UserId,
        existing: TransactionId,
    },

    /// The provider itself reported the attempt failed or was cancelled.
    ProviderReportedCancellation {
        provider_code: i64,
    },

    /// The transaction references a user that no longer exists.
    UserNotFound(UserId),

    /// Provider rejected the verification request (bad token, API error).
    VerificationFailed(String),

    /// Store unavailable or other unexpected failure. Maps to 5xx so the
    /// provider's transport-level retry applies; safe under idempotency.
    Infrastructure(String),
}

impl PaymentError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        PaymentError::MalformedRequest(reason.into())
    }

    pub fn not_found(reference: impl Into<String>) -> Self {
        PaymentError::TransactionNotFound(reference.into())
    }

    pub fn amount_mismatch(expected: i64, claimed: i64) -> Self {
        PaymentError::AmountMismatch { expected, claimed }
    }

    pub fn plan_not_found(reference: impl Into<String>) -> Self {
        PaymentError::PlanNotFound(reference.into())
    }

    pub fn duplicate_pending(user_id: UserId, existing: TransactionId) -> Self {
        PaymentError::DuplicatePendingTransaction { user_id, existing }
    }

    pub fn verification_failed(reason: impl Into<String>) -> Self {
        PaymentError::VerificationFailed(reason.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        PaymentError::Infrastructure(message.into())
    }

    /// Returns the foundation error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PaymentError::SignatureInvalid => ErrorCode::Unauthorized,
            PaymentError::MalformedRequest(_) => ErrorCode::ValidationFailed,
            PaymentError::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            PaymentError::AlreadyProcessed(_) => ErrorCode::AlreadyProcessed,
            PaymentError::AmountMismatch { .. } => ErrorCode::ValidationFailed,
            PaymentError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            PaymentError::DuplicatePendingTransaction { .. } => {
                ErrorCode::DuplicatePendingTransaction
            }
            PaymentError::ProviderReportedCancellation { .. } => ErrorCode::InvalidStateTransition,
            PaymentError::UserNotFound(_) => ErrorCode::UserNotFound,
            PaymentError::VerificationFailed(_) => ErrorCode::ProviderError,
            PaymentError::Infrastructure(_) => ErrorCode::InternalError,
        }
    }

    /// Returns true if the provider should retry the delivery.
    ///
    /// Only infrastructure failures are transient; every business-rule
    /// rejection is permanent and must not be retried with the same data.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Infrastructure(_))
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::SignatureInvalid => write!(f, "webhook signature verification failed"),
            PaymentError::MalformedRequest(reason) => write!(f, "malformed request: {}", reason),
            PaymentError::TransactionNotFound(reference) => {
                write!(f, "transaction not found: {}", reference)
            }
            PaymentError::AlreadyProcessed(id) => {
                write!(f, "transaction {} already processed", id)
            }
            PaymentError::AmountMismatch { expected, claimed } => {
                write!(f, "amount mismatch: expected {}, claimed {}", expected, claimed)
            }
            PaymentError::PlanNotFound(reference) => write!(f, "plan not found: {}", reference),
            PaymentError::DuplicatePendingTransaction { user_id, existing } => write!(
                f,
                "user {} already has pending transaction {}",
                user_id, existing
            ),
            PaymentError::ProviderReportedCancellation { provider_code } => {
                write!(f, "provider reported cancellation (code {})", provider_code)
            }
            PaymentError::UserNotFound(id) => write!(f, "user not found: {}", id),
            PaymentError::VerificationFailed(reason) => {
                write!(f, "purchase verification failed: {}", reason)
            }
            PaymentError::Infrastructure(message) => write!(f, "infrastructure error: {}", message),
        }
    }
}

impl std::error::Error for PaymentError {}

impl From<DomainError> for PaymentError {
    fn from(err: DomainError) -> Self {
        PaymentError::Infrastructure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_errors_are_transient() {
        assert!(PaymentError::infrastructure("db down").is_transient());
        assert!(!PaymentError::SignatureInvalid.is_transient());
        assert!(!PaymentError::amount_mismatch(100, 200).is_transient());
        assert!(!PaymentError::not_found("abc").is_transient());
    }

    #[test]
    fn already_processed_has_its_own_code() {
        let err = PaymentError::AlreadyProcessed(TransactionId::new());
        assert_eq!(err.code(), ErrorCode::AlreadyProcessed);
    }

    #[test]
    fn domain_errors_convert_to_infrastructure() {
        let err: PaymentError = DomainError::database("connection refused").into();
        assert!(matches!(err, PaymentError::Infrastructure(_)));
    }

    #[test]
    fn display_includes_amounts() {
        let err = PaymentError::amount_mismatch(100_000, 99_000);
        assert_eq!(
            err.to_string(),
            "amount mismatch: expected 100000, claimed 99000"
        );
    }
}
