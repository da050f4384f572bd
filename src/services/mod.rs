/// OpenAPI documentation generation.
pub mod documentation;
/// REST lookups: lobby, session summaries, deletion and statistics.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Caller token verification.
pub mod identity;
/// Lobby Server-Sent Events messages.
pub mod lobby_events;
/// Game-session lifecycle and round handling.
pub mod session_service;
/// Server-Sent Events streaming.
pub mod sse_service;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Free-text answer classification.
pub mod voice_matcher;
/// WebSocket connection and event dispatch.
pub mod websocket_service;
