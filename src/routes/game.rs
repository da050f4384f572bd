use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::game::{LobbyEntry, LobbyQuery, SessionSummary},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes exposing the lobby and session lookups.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", get(list_lobby))
        .route("/games/{code}", get(get_session).delete(delete_session))
}

/// List public rooms still waiting for players.
#[utoipa::path(
    get,
    path = "/games",
    tag = "game",
    params(LobbyQuery),
    responses(
        (status = 200, description = "Public waiting rooms, newest first", body = [LobbyEntry]),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn list_lobby(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LobbyQuery>>,
) -> Result<Json<Vec<LobbyEntry>>, AppError> {
    let rooms = game_service::list_lobby(&state, query.limit).await?;
    Ok(Json(rooms))
}

/// Session detail; correct answers are never included.
#[utoipa::path(
    get,
    path = "/games/{code}",
    tag = "game",
    params(("code" = String, Path, description = "Six digit room code")),
    responses(
        (status = 200, description = "Session summary", body = SessionSummary),
        (status = 404, description = "Unknown room code")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let summary = game_service::session_summary(&state, &code).await?;
    Ok(Json(summary))
}

/// Delete a session. Only its host may do so.
#[utoipa::path(
    delete,
    path = "/games/{code}",
    tag = "game",
    params(
        ("code" = String, Path, description = "Six digit room code"),
        ("Authorization" = String, Header, description = "`Bearer <token>` of the host")
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 401, description = "Missing token or caller is not the host"),
        (status = 404, description = "Unknown room code")
    )
)]
pub async fn delete_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    game_service::delete_session(&state, &code, bearer_token(&headers)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer host-token"));
        assert_eq!(bearer_token(&headers), Some("host-token"));
    }
}
