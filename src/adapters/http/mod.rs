//! HTTP adapters.

pub mod auth;
pub mod payment;
