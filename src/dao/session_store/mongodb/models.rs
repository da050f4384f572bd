use std::collections::BTreeMap;

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    GameOutcomeEntity, GameResultEntity, GameSessionEntity, PlayerEntity, QuestionEntity,
    ResultPlayerEntity, SessionStatusEntity, UserStatsEntity, VoiceActionEntity,
    VoiceInteractionEntity,
};

/// Session document; `_id` is the room code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    code: String,
    #[serde(default)]
    session_id: String,
    host_id: String,
    status: SessionStatusEntity,
    players: Vec<PlayerEntity>,
    questions: Vec<QuestionEntity>,
    current_question_index: i64,
    #[serde(default)]
    question_start_times: BTreeMap<String, i64>,
    is_public: bool,
    #[serde(default)]
    topic: String,
    difficulty: String,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<GameSessionEntity> for MongoSessionDocument {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            code: value.code,
            session_id: value.session_id,
            host_id: value.host_id,
            status: value.status,
            players: value.players,
            questions: value.questions,
            current_question_index: value.current_question_index as i64,
            question_start_times: value.question_start_times,
            is_public: value.is_public,
            topic: value.topic,
            difficulty: value.difficulty,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoSessionDocument> for GameSessionEntity {
    fn from(value: MongoSessionDocument) -> Self {
        Self {
            code: value.code,
            session_id: value.session_id,
            host_id: value.host_id,
            status: value.status,
            players: value.players,
            questions: value.questions,
            current_question_index: value.current_question_index.max(0) as usize,
            question_start_times: value.question_start_times,
            is_public: value.is_public,
            topic: value.topic,
            difficulty: value.difficulty,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// Result document, unique per game and uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameResultDocument {
    uid: String,
    session_code: String,
    #[serde(default)]
    session_id: String,
    score: u32,
    result: GameOutcomeEntity,
    is_host: bool,
    questions_count: i64,
    topic: String,
    difficulty: String,
    players: Vec<ResultPlayerEntity>,
    completed_at: DateTime,
}

impl From<GameResultEntity> for MongoGameResultDocument {
    fn from(value: GameResultEntity) -> Self {
        Self {
            uid: value.uid,
            session_code: value.session_code,
            session_id: value.session_id,
            score: value.score,
            result: value.result,
            is_host: value.is_host,
            questions_count: value.questions_count as i64,
            topic: value.topic,
            difficulty: value.difficulty,
            players: value.players,
            completed_at: DateTime::from_system_time(value.completed_at),
        }
    }
}

impl From<MongoGameResultDocument> for GameResultEntity {
    fn from(value: MongoGameResultDocument) -> Self {
        Self {
            uid: value.uid,
            session_code: value.session_code,
            session_id: value.session_id,
            score: value.score,
            result: value.result,
            is_host: value.is_host,
            questions_count: value.questions_count.max(0) as usize,
            topic: value.topic,
            difficulty: value.difficulty,
            players: value.players,
            completed_at: value.completed_at.to_system_time(),
        }
    }
}

/// Statistics document keyed by the player's uid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserStatsDocument {
    #[serde(rename = "_id")]
    uid: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    wins: i64,
    #[serde(default)]
    correct_answers: i64,
}

impl From<MongoUserStatsDocument> for UserStatsEntity {
    fn from(value: MongoUserStatsDocument) -> Self {
        let count = |raw: i64| u32::try_from(raw.max(0)).unwrap_or(u32::MAX);
        Self {
            uid: value.uid,
            display_name: value.display_name,
            games_played: count(value.games_played),
            wins: count(value.wins),
            correct_answers: count(value.correct_answers),
        }
    }
}

/// Voice audit document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoiceInteractionDocument {
    uid: String,
    session_code: String,
    question_id: Option<String>,
    action: VoiceActionEntity,
    text: Option<String>,
    confidence: Option<f64>,
    matched_option: Option<String>,
    voice_mode_enabled: Option<bool>,
    recorded_at: DateTime,
}

impl From<VoiceInteractionEntity> for MongoVoiceInteractionDocument {
    fn from(value: VoiceInteractionEntity) -> Self {
        Self {
            uid: value.uid,
            session_code: value.session_code,
            question_id: value.question_id,
            action: value.action,
            text: value.text,
            confidence: value.confidence,
            matched_option: value.matched_option,
            voice_mode_enabled: value.voice_mode_enabled,
            recorded_at: DateTime::from_system_time(value.recorded_at),
        }
    }
}
