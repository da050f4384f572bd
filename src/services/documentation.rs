use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the trivia backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::game::list_lobby,
        crate::routes::game::get_session,
        crate::routes::game::delete_session,
        crate::routes::user::user_stats,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::LobbyEntry,
            crate::dto::game::SessionSummary,
            crate::dto::game::GameResultDto,
            crate::dto::game::PlayerDto,
            crate::dto::game::QuestionDto,
            crate::dto::user::UserStatsResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::LobbyRoomEvent,
            crate::dto::sse::LobbyRoomClosedEvent,
            crate::dto::ws::NewQuestionPayload,
            crate::dto::ws::AnswerResultPayload,
            crate::dto::ws::GameFinishedPayload,
            crate::dto::ws::ErrorPayload,
            crate::state::state_machine::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Server-sent events announcing public rooms"),
        (name = "game", description = "Game sessions and the realtime game socket"),
        (name = "user", description = "Player statistics"),
    )
)]
/// OpenAPI document of the REST surface.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/healthcheck", "/sse/lobby", "/ws", "/games", "/games/{code}", "/users/{uid}/stats"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
