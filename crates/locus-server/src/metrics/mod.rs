//! Metrics module for the Locus server.

pub mod http;
pub mod setup;

pub use http::{http_metrics_middleware, register_http_metrics};
pub use setup::init_metrics;
