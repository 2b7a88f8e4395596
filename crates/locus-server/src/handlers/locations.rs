//! Location endpoint handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use locus_core::{
    DataSource, LocationId, LocationPatch, LocationStatus, SearchParams, SortBy, UpdateRequest,
};
use locus_sync::{Served, UpdateOutcome};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Set on responses that carry a last known value after a failed refresh.
pub static DEGRADED_HEADER: HeaderName = HeaderName::from_static("x-locus-degraded");

/// Query parameters of `GET /locations`.
///
/// `status` and `facilidades` take comma-separated lists.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListQuery {
    pub query: Option<String>,
    pub cidade: Option<String>,
    pub bairro: Option<String>,
    pub status: Option<String>,
    pub facilidades: Option<String>,
    pub sort_by: Option<SortBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListQuery {
    fn into_params(self) -> Result<SearchParams, AppError> {
        let status = split_list(self.status.as_deref())
            .map(|s| {
                LocationStatus::parse(s)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown status '{s}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchParams {
            query: self.query.filter(|q| !q.trim().is_empty()),
            city: self.cidade,
            neighborhood: self.bairro,
            status,
            facilities: split_list(self.facilidades.as_deref())
                .map(str::to_string)
                .collect(),
            sort_by: self.sort_by,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn split_list(value: Option<&str>) -> impl Iterator<Item = &str> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Query parameters of `GET /locations/{id}`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct DetailQuery {
    /// Availability date, today (UTC) when absent.
    pub date: Option<NaiveDate>,
}

/// Body of `PUT /locations/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub updates: LocationPatch,
    #[serde(default)]
    pub source: DataSource,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Writes a served value, tagging degraded ones.
fn served<T: Serialize>(served: Served<std::sync::Arc<T>>) -> Response {
    let mut response = Json(served.value.as_ref()).into_response();
    if served.degraded {
        let headers = response.headers_mut();
        headers.insert(DEGRADED_HEADER.clone(), HeaderValue::from_static("true"));
        let warning = served.warning.unwrap_or_default().replace('"', "'");
        if let Ok(value) = HeaderValue::from_str(&format!("110 locus \"{warning}\"")) {
            headers.insert(header::WARNING, value);
        }
    }
    response
}

/// GET /locations
#[instrument(skip_all)]
pub async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    let params = query.into_params()?;
    let page = state.manager().get_locations(params).await?;
    Ok(served(page))
}

/// GET /locations/{id}
#[instrument(skip_all, fields(location_id = %id))]
pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DetailQuery>,
) -> Result<Response, AppError> {
    let date = query.date.unwrap_or_else(|| Utc::now().date_naive());
    let detail = state
        .manager()
        .get_location_detail(&LocationId::new(id), date)
        .await?;
    Ok(served(detail))
}

/// GET /locations/{id}/status
#[instrument(skip_all, fields(location_id = %id))]
pub async fn get_location_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let status = state
        .manager()
        .get_location_status(&LocationId::new(id))
        .await?;
    Ok(served(status))
}

/// PUT /locations/{id}
#[instrument(skip_all, fields(location_id = %id))]
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<UpdateOutcome>, AppError> {
    let request = UpdateRequest {
        location_id: LocationId::new(id),
        updates: body.updates,
        source: body.source,
        updated_by: body.updated_by,
    };

    let outcome = state.manager().update_location(request).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_builds_search_params() {
        let query = ListQuery {
            cidade: Some("Sao Paulo".to_string()),
            status: Some("ativo, manutencao".to_string()),
            facilidades: Some("wifi,,estacionamento".to_string()),
            limit: Some(10),
            ..ListQuery::default()
        };

        let params = query.into_params().unwrap();

        assert_eq!(params.city.as_deref(), Some("Sao Paulo"));
        assert_eq!(
            params.status,
            vec![LocationStatus::Active, LocationStatus::Maintenance]
        );
        assert_eq!(params.facilities, vec!["wifi", "estacionamento"]);
        assert_eq!(params.limit, Some(10));
    }

    #[test]
    fn test_blank_query_matches_default_params() {
        let query = ListQuery {
            query: Some("  ".to_string()),
            ..ListQuery::default()
        };
        assert_eq!(query.into_params().unwrap(), SearchParams::default());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let query = ListQuery {
            status: Some("aberto".to_string()),
            ..ListQuery::default()
        };
        assert!(matches!(query.into_params(), Err(AppError::BadRequest(_))));
    }
}
