//! LinguaPay - Payment reconciliation and subscription entitlement service
//!
//! This crate converts asynchronous payment-gateway webhook notifications
//! into durable subscription entitlement changes, with exactly-once
//! crediting guarantees under duplicated, reordered, or forged deliveries.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
