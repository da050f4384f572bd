use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::dao::models::SessionStatusEntity;

/// Lifecycle of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Lobby is open; players may join.
    Waiting,
    /// Questions are being played; joining is closed.
    InProgress,
    /// Every question has been played. Terminal.
    Finished,
}

/// Events that move a session through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Host starts the game from the lobby.
    Start,
    /// The current round closed and another question follows.
    Advance,
    /// The last question was played (or a question past the end was requested).
    Finish,
}

/// Error returned when an event does not apply to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// Status the session was in.
    pub from: SessionStatus,
    /// Rejected event.
    pub event: SessionEvent,
}

impl SessionStatus {
    /// Compute the status reached by applying `event`.
    pub fn next(self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        let next = match (self, event) {
            (SessionStatus::Waiting, SessionEvent::Start) => SessionStatus::InProgress,
            (SessionStatus::InProgress, SessionEvent::Advance) => SessionStatus::InProgress,
            (SessionStatus::InProgress, SessionEvent::Finish) => SessionStatus::Finished,
            // Finishing twice is a no-op so late timers cannot fail.
            (SessionStatus::Finished, SessionEvent::Finish) => SessionStatus::Finished,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Wire name used in events and REST payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Finished => "finished",
        }
    }
}

impl From<SessionStatusEntity> for SessionStatus {
    fn from(value: SessionStatusEntity) -> Self {
        match value {
            SessionStatusEntity::Waiting => SessionStatus::Waiting,
            SessionStatusEntity::InProgress => SessionStatus::InProgress,
            SessionStatusEntity::Finished => SessionStatus::Finished,
        }
    }
}

impl From<SessionStatus> for SessionStatusEntity {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Waiting => SessionStatusEntity::Waiting,
            SessionStatus::InProgress => SessionStatusEntity::InProgress,
            SessionStatus::Finished => SessionStatusEntity::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_through_session() {
        let status = SessionStatus::Waiting;
        let status = status.next(SessionEvent::Start).unwrap();
        assert_eq!(status, SessionStatus::InProgress);
        let status = status.next(SessionEvent::Advance).unwrap();
        assert_eq!(status, SessionStatus::InProgress);
        let status = status.next(SessionEvent::Finish).unwrap();
        assert_eq!(status, SessionStatus::Finished);
    }

    #[test]
    fn finished_is_terminal() {
        let err = SessionStatus::Finished
            .next(SessionEvent::Start)
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Finished);
        assert_eq!(err.event, SessionEvent::Start);
        assert!(SessionStatus::Finished.next(SessionEvent::Advance).is_err());
        assert_eq!(
            SessionStatus::Finished.next(SessionEvent::Finish).unwrap(),
            SessionStatus::Finished
        );
    }

    #[test]
    fn cannot_start_twice_or_finish_from_lobby() {
        assert!(SessionStatus::InProgress.next(SessionEvent::Start).is_err());
        assert!(SessionStatus::Waiting.next(SessionEvent::Finish).is_err());
        assert!(SessionStatus::Waiting.next(SessionEvent::Advance).is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(SessionStatus::InProgress.as_str(), "in_progress");
    }
}
