use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{GameOutcomeEntity, GameResultEntity},
    dto::format_system_time,
    state::{
        game::{GameSession, Player, Question},
        state_machine::SessionStatus,
    },
};

/// Player as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub uid: String,
    pub display_name: String,
    pub score: u32,
    pub response_times: Vec<i64>,
    pub voice_mode_enabled: bool,
    pub visual_difficulty: bool,
}

impl From<&Player> for PlayerDto {
    fn from(value: &Player) -> Self {
        Self {
            uid: value.uid.clone(),
            display_name: value.display_name.clone(),
            score: value.score,
            response_times: value.response_times.clone(),
            voice_mode_enabled: value.voice_mode_enabled,
            visual_difficulty: value.visual_difficulty,
        }
    }
}

/// Roster of a session in join order.
pub fn players_of(session: &GameSession) -> Vec<PlayerDto> {
    session.players.iter().map(PlayerDto::from).collect()
}

/// Question as seen by clients. The answer fields are omitted when hidden.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDto {
    pub id: String,
    /// Prompt, sent as `question`.
    #[serde(rename = "question", alias = "text")]
    pub text: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl QuestionDto {
    /// Full question including its answer.
    pub fn revealed(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            text: question.text.clone(),
            options: question.options.clone(),
            correct_answer_index: Some(question.correct_answer_index),
            explanation: Some(question.explanation.clone()),
            category: question.category.clone(),
        }
    }

    /// Question stripped of its answer.
    pub fn concealed(question: &Question) -> Self {
        Self {
            correct_answer_index: None,
            explanation: None,
            ..Self::revealed(question)
        }
    }
}

/// Session fields sent with `gameCreated`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: String,
    pub host_id: String,
    pub status: SessionStatus,
    pub players: Vec<PlayerDto>,
    pub questions: Vec<QuestionDto>,
    pub current_question_index: usize,
    pub is_public: bool,
    pub topic: String,
    pub difficulty: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl SessionView {
    /// Full view for the host, answers included.
    pub fn for_host(session: &GameSession) -> Self {
        Self {
            code: session.code.clone(),
            host_id: session.host_id.clone(),
            status: session.status,
            players: players_of(session),
            questions: session.questions.iter().map(QuestionDto::revealed).collect(),
            current_question_index: session.current_question_index,
            is_public: session.is_public,
            topic: session.topic.clone(),
            difficulty: session.difficulty.clone(),
            created_at: format_system_time(session.created_at),
        }
    }
}

/// Query parameters of the public lobby listing.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct LobbyQuery {
    /// Maximum number of rooms returned (1-100).
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<usize>,
}

/// One public room waiting for players.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LobbyEntry {
    pub code: String,
    pub host_id: String,
    pub topic: String,
    pub difficulty: String,
    pub player_count: usize,
    pub question_count: usize,
    pub created_at: String,
}

impl From<&GameSession> for LobbyEntry {
    fn from(value: &GameSession) -> Self {
        Self {
            code: value.code.clone(),
            host_id: value.host_id.clone(),
            topic: value.topic.clone(),
            difficulty: value.difficulty.clone(),
            player_count: value.players.len(),
            question_count: value.questions.len(),
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Per-player result of a finished session.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameResultDto {
    pub uid: String,
    pub score: u32,
    /// `win` or `lose`.
    pub result: String,
    pub is_host: bool,
    pub completed_at: String,
}

impl From<GameResultEntity> for GameResultDto {
    fn from(value: GameResultEntity) -> Self {
        Self {
            uid: value.uid,
            score: value.score,
            result: match value.result {
                GameOutcomeEntity::Win => "win".into(),
                GameOutcomeEntity::Lose => "lose".into(),
            },
            is_host: value.is_host,
            completed_at: format_system_time(value.completed_at),
        }
    }
}

/// Session detail returned by `GET /games/{code}`; answers are never included.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub code: String,
    pub host_id: String,
    pub status: SessionStatus,
    pub players: Vec<PlayerDto>,
    pub questions: Vec<QuestionDto>,
    pub current_question_index: usize,
    pub is_public: bool,
    pub topic: String,
    pub difficulty: String,
    pub created_at: String,
    pub updated_at: String,
    /// Filled once the session finished.
    pub results: Vec<GameResultDto>,
}

impl SessionSummary {
    /// Summary of `session` with its results.
    pub fn new(session: &GameSession, results: Vec<GameResultEntity>) -> Self {
        Self {
            code: session.code.clone(),
            host_id: session.host_id.clone(),
            status: session.status,
            players: players_of(session),
            questions: session.questions.iter().map(QuestionDto::concealed).collect(),
            current_question_index: session.current_question_index,
            is_public: session.is_public,
            topic: session.topic.clone(),
            difficulty: session.difficulty.clone(),
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
            results: results.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            id: "q_0".into(),
            text: "Red planet?".into(),
            options: vec!["Venus".into(), "Mars".into(), "Earth".into(), "Jupiter".into()],
            correct_answer_index: 1,
            explanation: "Iron oxide.".into(),
            category: Some("Space".into()),
        }
    }

    #[test]
    fn prompt_travels_as_question() {
        let json = serde_json::to_value(QuestionDto::revealed(&question())).unwrap();
        assert_eq!(json["question"], "Red planet?");
        assert!(json.get("text").is_none());
        assert_eq!(json["correctAnswerIndex"], 1);

        let concealed = serde_json::to_value(QuestionDto::concealed(&question())).unwrap();
        assert!(concealed.get("correctAnswerIndex").is_none());
        assert!(concealed.get("explanation").is_none());
    }

    #[test]
    fn legacy_text_field_is_still_read() {
        let parsed: QuestionDto = serde_json::from_value(serde_json::json!({
            "id": "q_0",
            "text": "Red planet?",
            "options": ["Venus", "Mars"]
        }))
        .unwrap();
        assert_eq!(parsed.text, "Red planet?");
    }
}
