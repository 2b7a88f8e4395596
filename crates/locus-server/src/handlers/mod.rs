//! HTTP handlers.

pub mod cache;
pub mod events;
pub mod health;
pub mod locations;
pub mod metrics;
pub mod refresh;
