use std::{collections::BTreeMap, time::SystemTime};

use serde::{Deserialize, Serialize};

/// Lifecycle status persisted alongside a game session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusEntity {
    Waiting,
    InProgress,
    Finished,
}

/// Multiple-choice question stored inside a session document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Identifier of the question (generated as `q_<index>` when the client omits it).
    pub id: String,
    /// Question prompt.
    pub text: String,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_answer_index: usize,
    /// Explanation revealed with the round result.
    #[serde(default)]
    pub explanation: String,
    /// Category used for topic validation.
    #[serde(default)]
    pub category: Option<String>,
}

/// Player entry stored inside a session document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    pub uid: String,
    pub display_name: String,
    pub score: u32,
    /// Response time (milliseconds) for every question the player answered.
    #[serde(default)]
    pub response_times: Vec<i64>,
    #[serde(default)]
    pub voice_mode_enabled: bool,
    #[serde(default)]
    pub visual_difficulty: bool,
}

/// Aggregate session document keyed by its room code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSessionEntity {
    /// Six digit room code (primary key).
    pub code: String,
    /// Identity of this particular game; room codes are reused once a session is gone.
    #[serde(default)]
    pub session_id: String,
    pub host_id: String,
    pub status: SessionStatusEntity,
    pub players: Vec<PlayerEntity>,
    pub questions: Vec<QuestionEntity>,
    pub current_question_index: usize,
    /// Broadcast timestamps (epoch milliseconds) keyed by the stringified question index.
    #[serde(default)]
    pub question_start_times: BTreeMap<String, i64>,
    pub is_public: bool,
    #[serde(default)]
    pub topic: String,
    pub difficulty: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Outcome of a finished session from one player's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcomeEntity {
    Win,
    Lose,
}

/// Roster line copied into every game result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultPlayerEntity {
    pub uid: String,
    pub display_name: String,
    pub score: u32,
}

/// Write-once record produced for each player when a session finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResultEntity {
    pub uid: String,
    pub session_code: String,
    /// Game instance the result belongs to.
    #[serde(default)]
    pub session_id: String,
    pub score: u32,
    pub result: GameOutcomeEntity,
    pub is_host: bool,
    pub questions_count: usize,
    pub topic: String,
    pub difficulty: String,
    pub players: Vec<ResultPlayerEntity>,
    pub completed_at: SystemTime,
}

/// Lifetime statistics of a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatsEntity {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub games_played: u32,
    pub wins: u32,
    pub correct_answers: u32,
}

/// Increment applied atomically to a player's statistics after a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatsUpdate {
    pub uid: String,
    /// Used only when the statistics document does not exist yet.
    pub display_name: Option<String>,
    pub won: bool,
    pub correct_answers: u32,
}

/// Kind of voice interaction captured for auditing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoiceActionEntity {
    VoiceAnswer,
    AudioAnswer,
    VoiceModeToggle,
}

/// Audit record of a voice answer or a voice mode toggle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceInteractionEntity {
    pub uid: String,
    pub session_code: String,
    pub question_id: Option<String>,
    pub action: VoiceActionEntity,
    pub text: Option<String>,
    pub confidence: Option<f64>,
    pub matched_option: Option<String>,
    pub voice_mode_enabled: Option<bool>,
    pub recorded_at: SystemTime,
}

impl UserStatsEntity {
    /// Fresh statistics for a player that never finished a game.
    pub fn empty(uid: String, display_name: Option<String>) -> Self {
        Self {
            uid,
            display_name,
            games_played: 0,
            wins: 0,
            correct_answers: 0,
        }
    }

    /// Apply a post-game increment.
    pub fn apply(&mut self, update: &UserStatsUpdate) {
        self.games_played += 1;
        if update.won {
            self.wins += 1;
        }
        self.correct_answers += update.correct_answers;
        if self.display_name.is_none() {
            self.display_name = update.display_name.clone();
        }
    }
}
