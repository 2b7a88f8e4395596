//! # Locus Server
//!
//! HTTP surface of the Locus location cache.
//!
//! | Route | Operation |
//! |---|---|
//! | `GET /health` | health classification |
//! | `GET /stats` | cache, refresh and error statistics |
//! | `GET /metrics` | Prometheus metrics |
//! | `GET /locations` | list locations |
//! | `GET /locations/{id}?date=YYYY-MM-DD` | location detail with availability |
//! | `GET /locations/{id}/status` | location status |
//! | `PUT /locations/{id}` | validate, persist and invalidate an update |
//! | `POST /refresh` | refresh everything or some locations |
//! | `GET /refresh/{task_id}` | refresh task status |
//! | `POST /events` | backend change notifications |
//! | `DELETE /cache` | reset the cache |
//! | `GET /cache/audit` | validate cached records |
//!
//! Responses served from a last known value after a failed refresh carry
//! `x-locus-degraded: true` and a `Warning` header.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod settings;
pub mod state;

// Re-exports
pub use error::AppError;
pub use handlers::locations::DEGRADED_HEADER;
pub use metrics::init_metrics;
pub use middleware::REQUEST_ID_HEADER;
pub use server::{create_router, run_server};
pub use settings::{Settings, SettingsError};
pub use state::AppState;
