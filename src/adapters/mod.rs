//! Adapters: infrastructure implementations of the ports.

pub mod click;
pub mod google_play;
pub mod http;
pub mod payme;
pub mod postgres;
