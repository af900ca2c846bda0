//! Axum router configuration for payment endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    create_payment, get_transaction, handle_click_webhook, verify_purchase, PaymentAppState,
};

/// Create the payment API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `POST /` - Start a checkout for a plan
/// - `POST /verify` - Verify a client-side purchase token
/// - `GET /:reference` - Transaction status by id or short id
pub fn payment_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/verify", post(verify_purchase))
        .route("/:reference", get(get_transaction))
}

/// Create the webhook router.
///
/// Separate from the payment routes because webhooks carry no bearer
/// token; they are authenticated by their signature.
///
/// # Routes
/// - `POST /click` - Click prepare/complete webhook
pub fn webhook_routes() -> Router<PaymentAppState> {
    Router::new().route("/click", post(handle_click_webhook))
}

/// Create the complete payment module router, suitable for mounting at
/// `/api`.
pub fn payment_router() -> Router<PaymentAppState> {
    Router::new()
        .nest("/payments", payment_routes())
        .nest("/webhooks", webhook_routes())
}
