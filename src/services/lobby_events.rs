use serde::Serialize;
use tracing::warn;

use crate::{
    dto::sse::{LobbyRoomClosedEvent, LobbyRoomEvent, ServerEvent, SystemStatus},
    state::{SharedState, game::GameSession},
};

const EVENT_ROOM_OPENED: &str = "lobby.opened";
const EVENT_ROOM_UPDATED: &str = "lobby.updated";
const EVENT_ROOM_CLOSED: &str = "lobby.closed";
const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Announce a new public room.
pub fn broadcast_room_opened(state: &SharedState, session: &GameSession) {
    send_lobby_event(state, EVENT_ROOM_OPENED, &room_event(session));
}

/// Announce a roster change of a public room.
pub fn broadcast_room_updated(state: &SharedState, session: &GameSession) {
    send_lobby_event(state, EVENT_ROOM_UPDATED, &room_event(session));
}

/// Announce that a public room can no longer be joined.
pub fn broadcast_room_closed(state: &SharedState, code: &str, reason: &str) {
    let payload = LobbyRoomClosedEvent {
        code: code.to_owned(),
        reason: reason.to_owned(),
    };
    send_lobby_event(state, EVENT_ROOM_CLOSED, &payload);
}

/// Broadcast the degraded flag to lobby subscribers.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn room_event(session: &GameSession) -> LobbyRoomEvent {
    LobbyRoomEvent {
        code: session.code.clone(),
        host_id: session.host_id.clone(),
        topic: session.topic.clone(),
        difficulty: session.difficulty.clone(),
        player_count: session.players.len(),
    }
}

fn send_lobby_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.lobby_sse().broadcast(event);
        }
        Err(err) => warn!(event, error = %err, "failed to serialize lobby SSE payload"),
    }
}
