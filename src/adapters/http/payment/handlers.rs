//! HTTP handlers for payment endpoints.
//!
//! Connects axum routes to the application layer handlers. The Click
//! webhook is special: it always answers HTTP 200 and speaks Click's own
//! error vocabulary in the body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::adapters::http::auth::JwtAuthenticator;
use crate::application::handlers::payment::{
    ClickWebhookHandler, CreatePaymentCommand, CreatePaymentHandler, GetTransactionHandler,
    GetTransactionQuery, VerifyPurchaseCommand, VerifyPurchaseHandler,
};
use crate::domain::foundation::{PlanId, UserId};
use crate::domain::payment::{
    ClickSignatureVerifier, PaymentError, PlanCatalog, ProviderKind, ReconciliationService,
};
use crate::ports::{CheckoutProvider, PurchaseVerifier, TransactionStore, UserStore};

use super::dto::{
    ClickWebhookForm, ClickWebhookResponse, CreatePaymentRequest, CreatePaymentResponse,
    ErrorResponse, TransactionResponse, VerifyPurchaseRequest, VerifyPurchaseResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for the payment routes.
#[derive(Clone)]
pub struct PaymentAppState {
    pub transactions: Arc<dyn TransactionStore>,
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<PlanCatalog>,
    pub reconciliation: Arc<ReconciliationService>,
    pub click_verifier: Arc<ClickSignatureVerifier>,
    pub checkouts: HashMap<ProviderKind, Arc<dyn CheckoutProvider>>,
    pub verifiers: HashMap<ProviderKind, Arc<dyn PurchaseVerifier>>,
    pub authenticator: Arc<JwtAuthenticator>,
}

impl PaymentAppState {
    /// Create handlers on demand from the shared state.
    pub fn click_webhook_handler(&self) -> ClickWebhookHandler {
        ClickWebhookHandler::new(self.click_verifier.clone(), self.reconciliation.clone())
    }

    pub fn create_payment_handler(&self) -> CreatePaymentHandler {
        CreatePaymentHandler::new(
            self.transactions.clone(),
            self.users.clone(),
            self.catalog.clone(),
            self.checkouts.clone(),
        )
    }

    pub fn verify_purchase_handler(&self) -> VerifyPurchaseHandler {
        VerifyPurchaseHandler::new(
            self.verifiers.clone(),
            self.reconciliation.clone(),
            self.catalog.clone(),
        )
    }

    pub fn get_transaction_handler(&self) -> GetTransactionHandler {
        GetTransactionHandler::new(self.transactions.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Authentication
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> axum::response::Response {
        let error = ErrorResponse::new("UNAUTHORIZED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl axum::extract::FromRequestParts<PaymentAppState> for AuthenticatedUser {
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &PaymentAppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AuthenticationRequired)?;

        let user_id = state
            .authenticator
            .authenticate(token)
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook endpoint (no bearer auth, signature verified inside)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/click - Click prepare/complete webhook
///
/// Click deliveries arrive as JSON or form-encoded depending on the
/// gateway, so the body is parsed by hand; anything unparsable is
/// answered in Click's own vocabulary rather than a transport-level
/// rejection, since Click retries on non-200 responses.
pub async fn handle_click_webhook(
    State(state): State<PaymentAppState>,
    body: Bytes,
) -> impl IntoResponse {
    let form = match parse_click_body(&body) {
        Some(form) => form,
        None => return Json(ClickWebhookResponse::bad_request()),
    };

    let handler = state.click_webhook_handler();
    let result = handler.handle(form.into()).await;
    Json(ClickWebhookResponse::from(result))
}

/// Tries JSON first, the urlencoded form second.
fn parse_click_body(body: &[u8]) -> Option<ClickWebhookForm> {
    serde_json::from_slice(body)
        .ok()
        .or_else(|| serde_urlencoded::from_bytes(body).ok())
}

// ════════════════════════════════════════════════════════════════════════════════
// Client endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/payments - Start a checkout
pub async fn create_payment(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let plan_id = PlanId::new(&request.plan_id)
        .map_err(|e| PaymentError::malformed(e.to_string()))?;

    let handler = state.create_payment_handler();
    let cmd = CreatePaymentCommand {
        user_id: user.user_id,
        plan_id,
        provider: request.provider,
    };

    let result = handler.handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse::from(result)),
    ))
}

/// POST /api/payments/verify - Verify a client-side purchase
pub async fn verify_purchase(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Json(request): Json<VerifyPurchaseRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let plan_id = PlanId::new(&request.plan_id)
        .map_err(|e| PaymentError::malformed(e.to_string()))?;

    let handler = state.verify_purchase_handler();
    let cmd = VerifyPurchaseCommand {
        user_id: user.user_id,
        plan_id,
        provider: request.provider,
        token: request.token,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(VerifyPurchaseResponse::from(result)))
}

/// GET /api/payments/:reference - Transaction status
pub async fn get_transaction(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.get_transaction_handler();
    let query = GetTransactionQuery {
        user_id: user.user_id,
        reference,
    };

    let transaction = handler.handle(query).await?;

    Ok(Json(TransactionResponse::from(transaction)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts payment errors to HTTP responses.
pub struct PaymentApiError(PaymentError);

impl From<PaymentError> for PaymentApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            PaymentError::SignatureInvalid => StatusCode::UNAUTHORIZED,
            PaymentError::MalformedRequest(_)
            | PaymentError::AmountMismatch { .. }
            | PaymentError::PlanNotFound(_)
            | PaymentError::ProviderReportedCancellation { .. }
            | PaymentError::VerificationFailed(_) => StatusCode::BAD_REQUEST,
            PaymentError::TransactionNotFound(_) | PaymentError::UserNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            // Replays are acknowledged, not rejected.
            PaymentError::AlreadyProcessed(_) => StatusCode::OK,
            PaymentError::DuplicatePendingTransaction { .. } => StatusCode::CONFLICT,
            PaymentError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "payment request failed");
        }

        let body = ErrorResponse::new(self.0.code().to_string(), self.0.to_string());
        (status, Json(body)).into_response()
    }
}
