use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" or "degraded".
    pub status: String,
    /// Rooms with at least one live connection.
    pub active_rooms: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, active_rooms: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            active_rooms,
        }
    }
}
