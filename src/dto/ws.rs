//! Socket protocol: every frame is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::{
    game::{PlayerDto, QuestionDto, SessionView},
    validation::{validate_options, validate_room_code},
};

/// Events accepted from game clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Host opens a room with its question set.
    CreateGame(CreateGamePayload),
    /// Player enters a waiting room.
    JoinGame(JoinGamePayload),
    /// Host starts the game; questions follow after the start delay.
    StartGame(GameRefPayload),
    /// Answer to the current question by index or by option text.
    SubmitAnswer(SubmitAnswerPayload),
    /// Spoken answer already transcribed by the client.
    SubmitVoiceAnswer(SubmitVoiceAnswerPayload),
    /// Transcribed audio with the recognizer's confidence.
    SubmitAudioAnswer(SubmitAudioAnswerPayload),
    /// Player switches voice mode on or off.
    ToggleVoiceMode(ToggleVoiceModePayload),
    /// Voice mode flags of every player, sent back to the caller only.
    GetVoiceModeStatus(GameRefPayload),
    /// Join the room socket-wise and get the current question again.
    RequestQuestion(GameRefPayload),
}

/// Why an inbound frame was rejected before reaching a handler.
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid payload: {0}")]
    Invalid(#[from] ValidationErrors),
}

impl ClientEvent {
    /// Parse and validate a text frame.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let event: ClientEvent = serde_json::from_str(text)?;
        event.validate()?;
        Ok(event)
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateGame(_) => "createGame",
            ClientEvent::JoinGame(_) => "joinGame",
            ClientEvent::StartGame(_) => "startGame",
            ClientEvent::SubmitAnswer(_) => "submitAnswer",
            ClientEvent::SubmitVoiceAnswer(_) => "submitVoiceAnswer",
            ClientEvent::SubmitAudioAnswer(_) => "submitAudioAnswer",
            ClientEvent::ToggleVoiceMode(_) => "toggleVoiceMode",
            ClientEvent::GetVoiceModeStatus(_) => "getVoiceModeStatus",
            ClientEvent::RequestQuestion(_) => "requestQuestion",
        }
    }
}

impl Validate for ClientEvent {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ClientEvent::CreateGame(payload) => payload.validate(),
            ClientEvent::JoinGame(payload) => payload.validate(),
            ClientEvent::StartGame(payload)
            | ClientEvent::GetVoiceModeStatus(payload)
            | ClientEvent::RequestQuestion(payload) => payload.validate(),
            ClientEvent::SubmitAnswer(payload) => payload.validate(),
            ClientEvent::SubmitVoiceAnswer(payload) => payload.validate(),
            ClientEvent::SubmitAudioAnswer(payload) => payload.validate(),
            ClientEvent::ToggleVoiceMode(payload) => payload.validate(),
        }
    }
}

/// Question supplied by the host.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "question")]
    #[validate(length(min = 1, max = 500))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_answer_index: usize,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, alias = "topic")]
    pub category: Option<String>,
}

/// `createGame` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGamePayload {
    #[serde(default)]
    pub token: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub host_id: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionInput>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[serde(default)]
    pub visual_difficulty: bool,
}

/// `joinGame` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinGamePayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[serde(default)]
    pub visual_difficulty: bool,
}

/// Payload of events that only name a room.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameRefPayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
}

/// `submitAnswer` payload. `answerValue` wins over `answerIndex`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerPayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    #[serde(default)]
    pub answer_index: Option<usize>,
    #[serde(default)]
    pub answer_value: Option<String>,
}

/// `submitVoiceAnswer` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVoiceAnswerPayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    #[validate(length(min = 1, max = 500))]
    pub voice_response: String,
    /// Options as displayed by the client. Matching uses the stored question.
    #[serde(default)]
    pub question_options: Option<Vec<String>>,
}

/// `submitAudioAnswer` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAudioAnswerPayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    #[validate(length(min = 1, max = 500))]
    pub transcript: String,
    /// Transcription confidence reported by the speech service.
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: Option<f64>,
}

/// `toggleVoiceMode` payload.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleVoiceModePayload {
    #[validate(custom(function = validate_room_code))]
    pub game_id: String,
    #[validate(length(min = 1, max = 128))]
    pub uid: String,
    pub voice_mode_enabled: bool,
}

/// Events pushed to game clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent to the host only.
    GameCreated(GameCreatedPayload),
    PlayerJoined(PlayersPayload),
    GameStarted(GameStartedPayload),
    NewQuestion(NewQuestionPayload),
    /// Round scored; every player answered.
    AnswerResult(AnswerResultPayload),
    GameFinished(GameFinishedPayload),
    /// Unicast confirmation of a matched voice answer.
    VoiceAnswerReceived(VoiceAnswerReceivedPayload),
    /// Unicast; the voice answer matched no option.
    VoiceAnswerError(VoiceAnswerErrorPayload),
    VoiceModeChanged(VoiceModeChangedPayload),
    VoiceModeStatus(VoiceModeStatusPayload),
    AudioAnswerReceived(AudioAnswerReceivedPayload),
    /// Unicast failure of the caller's last event.
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Error envelope carrying a client-facing message.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorPayload {
            error: message.into(),
        })
    }
}

/// Room code and initial view, sent to the host.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameCreatedPayload {
    pub game_id: String,
    #[serde(flatten)]
    pub session: SessionView,
}

/// Current roster.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayersPayload {
    pub players: Vec<PlayerDto>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    pub questions_count: usize,
}

/// Question broadcast to the room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestionPayload {
    pub question: QuestionDto,
    pub index: usize,
    /// Advisory countdown in seconds; not enforced by the server.
    pub timeout: u64,
    pub total_questions: usize,
}

/// Scored round with updated players.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResultPayload {
    pub question_index: usize,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub players: Vec<PlayerDto>,
}

/// Final scores and the winner, if any.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameFinishedPayload {
    pub players: Vec<PlayerDto>,
    /// Uid of the winner, absent when nobody scored.
    pub winner: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceAnswerReceivedPayload {
    pub uid: String,
    pub confidence: f64,
    pub matched_option: Option<String>,
}

/// Unmatched voice answer with options to retry with.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoiceAnswerErrorPayload {
    pub error: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceModeChangedPayload {
    pub uid: String,
    pub voice_mode_enabled: bool,
    pub players: Vec<PlayerDto>,
}

/// Voice mode flag of one player.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoiceModeEntry {
    pub uid: String,
    pub display_name: String,
    pub voice_mode_enabled: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoiceModeStatusPayload {
    pub players: Vec<VoiceModeEntry>,
}

/// Matched audio answer; `confidence` includes the transcription confidence.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnswerReceivedPayload {
    pub uid: String,
    pub transcript: String,
    pub matched_option: Option<String>,
    pub answer_index: Option<usize>,
    pub confidence: f64,
}

/// Client-facing error message.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorPayload {
    pub error: String,
}
