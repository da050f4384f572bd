use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientEvent, InboundError, ServerMessage},
    error::ServiceError,
    services::session_service,
    state::{SharedState, rooms::ConnectionContext},
};

/// Handle the full lifecycle of one game client connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ctx = ConnectionContext::new(outbound_tx.clone());
    info!(connection = %ctx.id(), "game client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_text(&state, &ctx, text.as_str()).await,
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection = %ctx.id(), "game client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                ctx.send(&ServerMessage::error("Binary frames are not supported"));
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %ctx.id(), error = %err, "websocket error");
                break;
            }
        }
    }

    disconnect(&state, &ctx);
    drop(ctx);
    finalize(writer_task, outbound_tx).await;
}

/// Parse one text frame and run the matching handler.
///
/// Every failure is reported to this connection only, as an `error` event.
pub async fn handle_text(state: &SharedState, ctx: &Arc<ConnectionContext>, text: &str) {
    let event = match ClientEvent::from_json_str(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(connection = %ctx.id(), error = %err, "rejected inbound frame");
            ctx.send(&ServerMessage::error(inbound_error_message(&err)));
            return;
        }
    };

    let name = event.name();
    debug!(connection = %ctx.id(), event = name, "received client event");
    if let Err(err) = dispatch(state, ctx, event).await {
        match &err {
            ServiceError::Unavailable(_) | ServiceError::Degraded => {
                warn!(connection = %ctx.id(), event = name, error = %err, "event failed")
            }
            _ => debug!(connection = %ctx.id(), event = name, error = %err, "event rejected"),
        }
        ctx.send(&ServerMessage::error(err.client_message()));
    }
}

async fn dispatch(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    event: ClientEvent,
) -> Result<(), ServiceError> {
    match event {
        ClientEvent::CreateGame(payload) => {
            session_service::create_session(state, ctx, payload).await?;
        }
        ClientEvent::JoinGame(payload) => {
            session_service::join_session(state, ctx, payload).await?;
        }
        ClientEvent::StartGame(payload) => {
            session_service::start_session(state, &payload.game_id).await?;
        }
        ClientEvent::SubmitAnswer(payload) => {
            session_service::submit_answer(state, ctx, payload).await?;
        }
        ClientEvent::SubmitVoiceAnswer(payload) => {
            session_service::submit_voice_answer(state, ctx, payload).await?;
        }
        ClientEvent::SubmitAudioAnswer(payload) => {
            session_service::submit_audio_answer(state, ctx, payload).await?;
        }
        ClientEvent::ToggleVoiceMode(payload) => {
            session_service::toggle_voice_mode(state, payload).await?;
        }
        ClientEvent::GetVoiceModeStatus(payload) => {
            session_service::send_voice_mode_status(state, ctx, &payload.game_id).await?;
        }
        ClientEvent::RequestQuestion(payload) => {
            session_service::request_question(state, ctx, &payload.game_id).await?;
        }
    }
    Ok(())
}

fn inbound_error_message(err: &InboundError) -> String {
    match err {
        InboundError::Malformed(_) => "Unrecognised or malformed event".into(),
        InboundError::Invalid(errors) => format!("Invalid event payload: {errors}"),
    }
}

/// Drop the connection from its rooms; its pending answers go with it.
fn disconnect(state: &SharedState, ctx: &Arc<ConnectionContext>) {
    let rooms = state.rooms().leave_all(ctx.id());
    info!(
        connection = %ctx.id(),
        uid = ?ctx.uid(),
        rooms = ?rooms,
        "game client disconnected"
    );
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::MemorySessionStore,
        services::identity::TrustTokenVerifier, state::AppState,
    };

    fn connection() -> (Arc<ConnectionContext>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionContext::new(tx), rx)
    }

    fn next_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> Value {
        match rx.try_recv().expect("expected an outbound frame") {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frames_get_an_error_envelope() {
        let state = AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier));
        let (ctx, mut rx) = connection();

        handle_text(&state, &ctx, "not json").await;
        let reply = next_json(&mut rx);
        assert_eq!(reply["event"], "error");
        assert_eq!(reply["data"]["error"], "Unrecognised or malformed event");
    }

    #[tokio::test]
    async fn degraded_mode_is_reported_without_details() {
        let state = AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier));
        let (ctx, mut rx) = connection();

        let frame = json!({"event": "startGame", "data": {"gameId": "123456"}}).to_string();
        handle_text(&state, &ctx, &frame).await;
        assert_eq!(
            next_json(&mut rx)["data"]["error"],
            "Service temporarily unavailable"
        );
    }

    #[tokio::test]
    async fn unknown_game_is_reported_to_the_caller_only() {
        let state = AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier));
        state
            .install_session_store(Arc::new(MemorySessionStore::new()))
            .await;
        let (ctx, mut rx) = connection();

        let frame = json!({
            "event": "joinGame",
            "data": {"gameId": "654321", "uid": "u1", "displayName": "Ana"}
        })
        .to_string();
        handle_text(&state, &ctx, &frame).await;
        assert_eq!(next_json(&mut rx)["data"]["error"], "Game not found");
        assert!(rx.try_recv().is_err());
    }
}
