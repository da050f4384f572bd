use tracing::info;

use crate::{
    dto::{
        game::{LobbyEntry, SessionSummary},
        user::UserStatsResponse,
        ws::ServerMessage,
    },
    error::ServiceError,
    services::{lobby_events, session_service},
    state::{SharedState, game::GameSession, state_machine::SessionStatus},
};

/// Public rooms still waiting for players, newest first.
pub async fn list_lobby(
    state: &SharedState,
    limit: Option<usize>,
) -> Result<Vec<LobbyEntry>, ServiceError> {
    let store = state.require_session_store().await?;
    let limit = limit.unwrap_or_else(|| state.config().lobby_limit());
    let sessions = store.list_open_sessions(limit).await?;

    sessions
        .into_iter()
        .map(|entity| -> Result<LobbyEntry, ServiceError> {
            let session = GameSession::try_from(entity)?;
            Ok(LobbyEntry::from(&session))
        })
        .collect()
}

/// Session detail with the results written when it finished.
pub async fn session_summary(state: &SharedState, code: &str) -> Result<SessionSummary, ServiceError> {
    let store = state.require_session_store().await?;
    let session = session_service::require_session(store.as_ref(), code).await?;
    let results = if session.status == SessionStatus::Finished {
        let mut results = store.list_game_results(code.to_owned()).await?;
        results.retain(|result| result.session_id == session.session_id);
        results
    } else {
        Vec::new()
    };
    Ok(SessionSummary::new(&session, results))
}

/// Delete a session on behalf of its host and tear down its room.
pub async fn delete_session(
    state: &SharedState,
    code: &str,
    token: Option<&str>,
) -> Result<(), ServiceError> {
    let token = token
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("Missing authentication token".into()))?;
    let caller = state.identity().verify(token.to_owned()).await?;

    {
        let _gate = state.lock_room(code).await;
        let store = state.require_session_store().await?;
        let session = session_service::require_session(store.as_ref(), code).await?;
        if session.host_id != caller.uid {
            return Err(ServiceError::Unauthorized(
                "Only the host can delete this game".into(),
            ));
        }

        store.delete_session(code.to_owned()).await?;
        state
            .rooms()
            .broadcast(code, &ServerMessage::error("Game was deleted by the host"));
        if session.is_public && session.status == SessionStatus::Waiting {
            lobby_events::broadcast_room_closed(state, code, "deleted");
        }
    }

    state.forget_room(code);
    info!(code = %code, host = %caller.uid, "game session deleted");
    Ok(())
}

/// Lifetime statistics of a player.
pub async fn user_stats(state: &SharedState, uid: &str) -> Result<UserStatsResponse, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_user_stats(uid.to_owned())
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound(format!("no statistics for user `{uid}`")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::{MemorySessionStore, SessionStore},
        services::identity::TrustTokenVerifier,
        state::{AppState, game::Player},
    };

    async fn state_with_session(code: &str, public: bool) -> (SharedState, MemorySessionStore) {
        let state = AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier));
        let store = MemorySessionStore::new();
        state.install_session_store(Arc::new(store.clone())).await;
        let session = GameSession::new(
            code.into(),
            Player::new("host".into(), "Host".into()),
            Vec::new(),
            "History".into(),
            "medium".into(),
            public,
        );
        store.save_session(session.into()).await.unwrap();
        (state, store)
    }

    #[tokio::test]
    async fn lobby_lists_public_waiting_rooms() {
        let (state, store) = state_with_session("111111", true).await;
        let private = GameSession::new(
            "222222".into(),
            Player::new("other".into(), "Other".into()),
            Vec::new(),
            String::new(),
            "hard".into(),
            false,
        );
        store.save_session(private.into()).await.unwrap();

        let lobby = list_lobby(&state, None).await.unwrap();
        assert_eq!(lobby.len(), 1);
        assert_eq!(lobby[0].code, "111111");
    }

    #[tokio::test]
    async fn only_the_host_may_delete() {
        let (state, store) = state_with_session("333333", false).await;

        let err = delete_session(&state, "333333", Some("intruder"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        let err = delete_session(&state, "333333", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        delete_session(&state, "333333", Some("host")).await.unwrap();
        assert!(store.find_session("333333".into()).await.unwrap().is_none());
        assert!(matches!(
            session_summary(&state, "333333").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn summary_shows_only_the_current_game_results() {
        let (state, store) = state_with_session("555555", false).await;
        let mut session = session_service::require_session(&store, "555555").await.unwrap();
        session.status = SessionStatus::Finished;
        store.save_session(session.clone().into()).await.unwrap();

        for mut earlier in session.results() {
            earlier.session_id = "earlier-game".into();
            store.save_game_result(earlier).await.unwrap();
        }
        for current in session.results() {
            store.save_game_result(current).await.unwrap();
        }

        let summary = session_summary(&state, "555555").await.unwrap();
        assert_eq!(summary.results.len(), 1);
        assert_eq!(store.list_game_results("555555".into()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_user_has_no_stats() {
        let (state, _store) = state_with_session("444444", false).await;
        assert!(matches!(
            user_stats(&state, "ghost").await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
