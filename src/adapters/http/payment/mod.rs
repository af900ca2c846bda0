//! HTTP adapter for the payment context.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, PaymentApiError, PaymentAppState};
pub use routes::{payment_router, payment_routes, webhook_routes};
