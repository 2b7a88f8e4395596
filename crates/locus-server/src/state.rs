//! Application state.

use std::sync::Arc;

use locus_sync::LocationManager;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    manager: Arc<LocationManager>,
}

impl AppState {
    /// Creates a new AppState around the given manager.
    pub fn new(manager: LocationManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Creates an AppState sharing an existing manager.
    pub fn from_shared(manager: Arc<LocationManager>) -> Self {
        Self { manager }
    }

    /// Returns the location manager.
    pub fn manager(&self) -> &LocationManager {
        &self.manager
    }
}
