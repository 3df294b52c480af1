//! HTTP route handlers.

pub mod escrows;
pub mod health;
pub mod metrics;
pub mod webhooks;
