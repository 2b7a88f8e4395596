//! Location data source trait definition.

use async_trait::async_trait;
use chrono::NaiveDate;
use locus_core::{
    LocationDetail, LocationId, LocationPage, Result, SearchParams, StatusSnapshot, UpdateAck,
    UpdateRequest,
};

/// A backend that owns location records.
///
/// The caching layer never talks to the network directly; everything goes
/// through an implementation of this trait, injected at construction time.
/// Implementations report failures with the closed
/// [`LocationError`](locus_core::LocationError) taxonomy so the recovery
/// policy can act on them.
///
/// # Implementors
///
/// - `StaticSource` - in-memory fixture, for tests and local runs
///
/// # Example
///
/// ```ignore
/// use locus_source::{LocationSource, async_trait};
///
/// struct RestSource { client: reqwest::Client }
///
/// #[async_trait]
/// impl LocationSource for RestSource {
///     async fn fetch_location_status(&self, id: &LocationId) -> Result<StatusSnapshot> {
///         // GET /locations/{id}/status
///     }
///
///     // ...
///
///     fn name(&self) -> &str {
///         "rest"
///     }
/// }
/// ```
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Fetches one page of locations matching `params`.
    async fn fetch_location_list(&self, params: &SearchParams) -> Result<LocationPage>;

    /// Fetches a location together with its availability on `date`.
    ///
    /// # Errors
    ///
    /// - `LocationError::NotFound` if the location doesn't exist
    async fn fetch_location_detail(&self, id: &LocationId, date: NaiveDate)
    -> Result<LocationDetail>;

    /// Fetches the live status of a location.
    ///
    /// # Errors
    ///
    /// - `LocationError::NotFound` if the location doesn't exist
    async fn fetch_location_status(&self, id: &LocationId) -> Result<StatusSnapshot>;

    /// Persists a partial update.
    ///
    /// Callers validate the request before calling this.
    async fn persist_location_update(&self, request: &UpdateRequest) -> Result<UpdateAck>;

    /// Verifies that the backend is reachable.
    ///
    /// The default implementation assumes it always is.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    /// Returns the name of this source.
    ///
    /// This is used for logging and identification purposes.
    fn name(&self) -> &str;
}
