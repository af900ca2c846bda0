//! Application layer handlers, grouped by bounded context.

pub mod payment;
