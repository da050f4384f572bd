use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{dto::user::UserStatsResponse, error::AppError, services::game_service, state::SharedState};

/// Routes exposing player statistics.
pub fn router() -> Router<SharedState> {
    Router::new().route("/users/{uid}/stats", get(user_stats))
}

/// Lifetime statistics of a player.
#[utoipa::path(
    get,
    path = "/users/{uid}/stats",
    tag = "user",
    params(("uid" = String, Path, description = "Player uid")),
    responses(
        (status = 200, description = "Player statistics", body = UserStatsResponse),
        (status = 404, description = "Player never finished a game")
    )
)]
pub async fn user_stats(
    State(state): State<SharedState>,
    Path(uid): Path<String>,
) -> Result<Json<UserStatsResponse>, AppError> {
    let stats = game_service::user_stats(&state, &uid).await?;
    Ok(Json(stats))
}
