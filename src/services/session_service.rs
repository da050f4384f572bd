//! Game-session lifecycle: create, join, start, answer, advance and finish.
//!
//! Every mutation runs under the room gate and re-reads the session document,
//! so handlers and delayed tasks of one room never interleave their
//! read-modify-write cycles.

use std::{sync::Arc, time::SystemTime};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::{
    dao::{
        models::{GameOutcomeEntity, UserStatsUpdate, VoiceActionEntity, VoiceInteractionEntity},
        session_store::SessionStore,
    },
    dto::{
        game::{PlayerDto, QuestionDto, SessionView, players_of},
        ws::{
            AnswerResultPayload, AudioAnswerReceivedPayload, CreateGamePayload,
            GameCreatedPayload, GameFinishedPayload, GameStartedPayload, JoinGamePayload,
            NewQuestionPayload, PlayersPayload, QuestionInput, ServerMessage, SubmitAnswerPayload,
            SubmitAudioAnswerPayload, SubmitVoiceAnswerPayload, ToggleVoiceModePayload,
            VoiceAnswerErrorPayload, VoiceAnswerReceivedPayload, VoiceModeChangedPayload,
            VoiceModeEntry, VoiceModeStatusPayload,
        },
    },
    error::ServiceError,
    services::{identity, lobby_events, voice_matcher},
    state::{
        SharedState,
        game::{GameSession, Player, Question, now_ms},
        rooms::{ConnectionContext, PendingAnswer},
        state_machine::SessionStatus,
    },
};

const DEFAULT_DIFFICULTY: &str = "medium";
const ROOM_CODE_BASE: u32 = 100_000;
const ROOM_CODE_SPAN: u32 = 900_000;

/// What a submission did to the round.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    /// The barrier was met and the round closed.
    pub advanced: bool,
    /// Scores after the round, when it closed.
    pub players: Option<Vec<PlayerDto>>,
}

/// Draw a six digit room code.
pub fn generate_room_code() -> String {
    let offset = rand::rng().random_range(0..ROOM_CODE_SPAN);
    (ROOM_CODE_BASE + offset).to_string()
}

/// Create a waiting session hosted by the caller and join its room.
pub async fn create_session(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    payload: CreateGamePayload,
) -> Result<String, ServiceError> {
    identity::verify_claimed_uid(state.identity(), payload.token.as_deref(), &payload.host_id)
        .await?;

    let topic = payload.topic.clone().unwrap_or_default();
    let questions = build_questions(&payload.questions, &topic, payload.count)?;

    let store = state.require_session_store().await?;
    let code = allocate_room_code(store.as_ref(), state.config().room_code_attempts()).await?;

    let mut host = Player::new(payload.host_id.clone(), payload.display_name.clone());
    host.visual_difficulty = payload.visual_difficulty;
    let difficulty = payload
        .difficulty
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIFFICULTY.to_owned());
    let session = GameSession::new(
        code.clone(),
        host,
        questions,
        topic,
        difficulty,
        payload.is_public,
    );

    store.save_session(session.clone().into()).await?;

    state.rooms().join(&code, ctx);
    ctx.set_uid(&session.host_id);
    ctx.send(&ServerMessage::GameCreated(GameCreatedPayload {
        game_id: code.clone(),
        session: SessionView::for_host(&session),
    }));

    if session.is_public {
        lobby_events::broadcast_room_opened(state, &session);
    }

    info!(
        code = %code,
        host = %session.host_id,
        questions = session.questions.len(),
        public = session.is_public,
        "game session created"
    );
    Ok(code)
}

/// Validate the host's questions against the declared topic and count.
pub fn build_questions(
    inputs: &[QuestionInput],
    topic: &str,
    count: Option<usize>,
) -> Result<Vec<Question>, ServiceError> {
    if inputs.is_empty() {
        return Err(ServiceError::InvalidInput("No questions provided".into()));
    }

    if !topic.is_empty()
        && !inputs
            .iter()
            .all(|question| question.category.as_deref() == Some(topic))
    {
        return Err(ServiceError::InvalidInput(
            "All questions must belong to the selected topic".into(),
        ));
    }

    if let Some(expected) = count.filter(|expected| *expected > 0) {
        if inputs.len() != expected {
            return Err(ServiceError::InvalidInput(format!(
                "Question count does not match the requested count ({} received, {expected} requested)",
                inputs.len()
            )));
        }
    }

    Ok(inputs
        .iter()
        .enumerate()
        .map(|(index, input)| Question {
            id: input
                .id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("q_{index}")),
            text: input.text.clone(),
            options: input.options.clone(),
            correct_answer_index: input.correct_answer_index,
            explanation: input.explanation.clone(),
            category: input.category.clone(),
        })
        .collect())
}

async fn allocate_room_code(store: &dyn SessionStore, attempts: u32) -> Result<String, ServiceError> {
    for attempt in 1..=attempts {
        let code = generate_room_code();
        if store.find_session(code.clone()).await?.is_none() {
            return Ok(code);
        }
        debug!(code = %code, attempt, "room code already in use; drawing another");
    }
    Err(ServiceError::InvalidState(
        "Could not allocate a free game code".into(),
    ))
}

/// Add a player to a waiting session. Joining twice is a no-op.
pub async fn join_session(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    payload: JoinGamePayload,
) -> Result<Vec<PlayerDto>, ServiceError> {
    let code = payload.game_id;
    let _gate = state.lock_room(&code).await;
    let store = state.require_session_store().await?;
    let mut session = require_session(store.as_ref(), &code).await?;

    if session.status != SessionStatus::Waiting {
        return Err(ServiceError::InvalidState("Game already started".into()));
    }

    let mut player = Player::new(payload.uid.clone(), payload.display_name);
    player.visual_difficulty = payload.visual_difficulty;
    let added = session.add_player(player);
    if added {
        store.save_session(session.clone().into()).await?;
        info!(code = %code, uid = %payload.uid, players = session.players.len(), "player joined");
        if session.is_public {
            lobby_events::broadcast_room_updated(state, &session);
        }
    }

    state.rooms().join(&code, ctx);
    ctx.set_uid(&payload.uid);

    let players = players_of(&session);
    state.rooms().broadcast(
        &code,
        &ServerMessage::PlayerJoined(PlayersPayload {
            players: players.clone(),
        }),
    );
    Ok(players)
}

/// Move a waiting session in progress and schedule its first question.
pub async fn start_session(state: &SharedState, code: &str) -> Result<usize, ServiceError> {
    let _gate = state.lock_room(code).await;
    let store = state.require_session_store().await?;
    let mut session = require_session(store.as_ref(), code).await?;

    if session.questions.is_empty() {
        return Err(ServiceError::InvalidState("Game has no questions".into()));
    }
    if session.status != SessionStatus::Waiting {
        return Err(ServiceError::InvalidState("Game already started".into()));
    }

    let questions_count = session.start()?;
    store.save_session(session.clone().into()).await?;

    state.rooms().broadcast(
        code,
        &ServerMessage::GameStarted(GameStartedPayload { questions_count }),
    );
    if session.is_public {
        lobby_events::broadcast_room_closed(state, code, "started");
    }
    info!(code = %code, questions_count, "game started");

    schedule_question(state, code, 0, state.config().start_delay());
    Ok(questions_count)
}

/// Record an answer submitted by index or by option text.
pub async fn submit_answer(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    payload: SubmitAnswerPayload,
) -> Result<AnswerOutcome, ServiceError> {
    register_answer(
        state,
        ctx,
        &payload.game_id,
        &payload.uid,
        payload.answer_index,
        payload.answer_value,
        None,
    )
    .await
}

/// Record a pending answer and close the round once every player answered.
async fn register_answer(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    code: &str,
    uid: &str,
    answer_index: Option<usize>,
    answer_value: Option<String>,
    expected_question: Option<usize>,
) -> Result<AnswerOutcome, ServiceError> {
    let _gate = state.lock_room(code).await;
    let store = state.require_session_store().await?;
    let mut session = require_session(store.as_ref(), code).await?;

    let question_index = session.current_question_index;
    if session.current_question().is_none() {
        return Err(ServiceError::InvalidState("No active question".into()));
    }
    if !session.question_start_times.contains_key(&question_index)
        || expected_question.is_some_and(|expected| expected != question_index)
    {
        return Err(ServiceError::InvalidState(
            "Question is not open for answers".into(),
        ));
    }
    if session.player(uid).is_none() {
        return Err(ServiceError::NotFound("Player not found in game".into()));
    }

    state.rooms().join(code, ctx);
    ctx.record_answer(
        code,
        uid,
        PendingAnswer {
            question_index,
            answer_index,
            answer_value,
            submitted_at_ms: now_ms(),
        },
    );

    let answers = state.rooms().collect_answers(code, question_index);
    let missing = session.missing_answers(&answers);
    if !missing.is_empty() {
        debug!(code = %code, uid = %uid, waiting_for = missing.len(), "answer recorded");
        return Ok(AnswerOutcome {
            advanced: false,
            players: None,
        });
    }

    let outcome = session.close_round(&answers, now_ms())?;
    store.save_session(session.clone().into()).await?;
    state.rooms().clear_answers(code);

    let players = players_of(&session);
    state.rooms().broadcast(
        code,
        &ServerMessage::AnswerResult(AnswerResultPayload {
            question_index: outcome.question_index,
            correct_answer_index: outcome.correct_answer_index,
            explanation: outcome.explanation,
            players: players.clone(),
        }),
    );
    info!(
        code = %code,
        question = outcome.question_index,
        finished = outcome.finished,
        "round closed"
    );

    let delay = state.config().advance_delay();
    if outcome.finished {
        schedule_finish(state, code, delay);
    } else {
        schedule_question(state, code, outcome.question_index + 1, delay);
    }

    Ok(AnswerOutcome {
        advanced: true,
        players: Some(players),
    })
}

/// Broadcast question `index`, or finish the game when no such question exists.
///
/// A missing session is ignored so late timers of deleted rooms stay silent.
pub async fn send_question(state: &SharedState, code: &str, index: usize) -> Result<(), ServiceError> {
    let _gate = state.lock_room(code).await;
    let store = state.require_session_store().await?;
    let Some(mut session) = load_session(store.as_ref(), code).await? else {
        debug!(code = %code, index, "session vanished before question broadcast");
        return Ok(());
    };

    if index >= session.questions.len() {
        return finish_locked(state, store.as_ref(), &mut session).await;
    }

    match session.status {
        SessionStatus::Waiting => {
            return Err(ServiceError::InvalidState("Game has not started".into()));
        }
        SessionStatus::Finished => {
            debug!(code = %code, index, "game already finished; question not sent");
            return Ok(());
        }
        SessionStatus::InProgress => {}
    }
    if index != session.current_question_index {
        debug!(
            code = %code,
            index,
            current = session.current_question_index,
            "stale question broadcast skipped"
        );
        return Ok(());
    }

    session.stamp_question(index, now_ms());
    store.save_session(session.clone().into()).await?;

    let question = &session.questions[index];
    let question = if state.config().hide_correct_answer() {
        QuestionDto::concealed(question)
    } else {
        QuestionDto::revealed(question)
    };
    let timeout = state
        .config()
        .question_timeout_secs(session.requires_extended_timeout());

    state.rooms().broadcast(
        code,
        &ServerMessage::NewQuestion(NewQuestionPayload {
            question,
            index,
            timeout,
            total_questions: session.questions.len(),
        }),
    );
    debug!(code = %code, index, timeout, "question broadcast");
    Ok(())
}

/// Resend the question currently being played to the room.
pub async fn request_question(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    code: &str,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let session = require_session(store.as_ref(), code).await?;
    state.rooms().join(code, ctx);
    send_question(state, code, session.current_question_index).await
}

/// Finish the session if needed and announce the final scores.
pub async fn finish_session(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let _gate = state.lock_room(code).await;
    let store = state.require_session_store().await?;
    let Some(mut session) = load_session(store.as_ref(), code).await? else {
        debug!(code = %code, "session vanished before game end");
        return Ok(());
    };
    finish_locked(state, store.as_ref(), &mut session).await
}

async fn finish_locked(
    state: &SharedState,
    store: &dyn SessionStore,
    session: &mut GameSession,
) -> Result<(), ServiceError> {
    if session.status != SessionStatus::Finished {
        session.finish()?;
        store.save_session(session.clone().into()).await?;
    }

    let winner = session.winner().map(str::to_owned);
    state.rooms().broadcast(
        &session.code,
        &ServerMessage::GameFinished(GameFinishedPayload {
            players: players_of(session),
            winner: winner.clone(),
        }),
    );
    info!(code = %session.code, winner = ?winner, "game finished");

    record_results(store, session).await;
    Ok(())
}

/// Write one result per player and bump their statistics, once per game.
///
/// Results of an earlier game that used the same room code do not count.
async fn record_results(store: &dyn SessionStore, session: &GameSession) {
    match store.list_game_results(session.code.clone()).await {
        Ok(existing)
            if existing
                .iter()
                .any(|result| result.session_id == session.session_id) =>
        {
            debug!(code = %session.code, "results already recorded");
            return;
        }
        Ok(_) => {}
        Err(err) => {
            warn!(code = %session.code, error = %err, "failed to check existing results");
            return;
        }
    }

    for result in session.results() {
        let update = UserStatsUpdate {
            uid: result.uid.clone(),
            display_name: session
                .player(&result.uid)
                .map(|player| player.display_name.clone()),
            won: result.result == GameOutcomeEntity::Win,
            correct_answers: result.score,
        };
        let uid = result.uid.clone();

        if let Err(err) = store.save_game_result(result).await {
            warn!(code = %session.code, uid = %uid, error = %err, "failed to save game result");
            continue;
        }
        if let Err(err) = store.apply_stats_update(update).await {
            warn!(code = %session.code, uid = %uid, error = %err, "failed to update player statistics");
        }
    }
}

/// Match a spoken answer against the current question and submit it.
pub async fn submit_voice_answer(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    payload: SubmitVoiceAnswerPayload,
) -> Result<AnswerOutcome, ServiceError> {
    submit_spoken_answer(
        state,
        ctx,
        &payload.game_id,
        &payload.uid,
        &payload.voice_response,
        VoiceActionEntity::VoiceAnswer,
        |result| {
            ServerMessage::VoiceAnswerReceived(VoiceAnswerReceivedPayload {
                uid: payload.uid.clone(),
                confidence: result.confidence,
                matched_option: result.matched_option.clone(),
            })
        },
        1.0,
    )
    .await
}

/// Match a transcribed answer against the current question and submit it.
pub async fn submit_audio_answer(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    payload: SubmitAudioAnswerPayload,
) -> Result<AnswerOutcome, ServiceError> {
    let transcription_confidence = payload.confidence.unwrap_or(1.0);
    submit_spoken_answer(
        state,
        ctx,
        &payload.game_id,
        &payload.uid,
        &payload.transcript,
        VoiceActionEntity::AudioAnswer,
        |result| {
            ServerMessage::AudioAnswerReceived(AudioAnswerReceivedPayload {
                uid: payload.uid.clone(),
                transcript: payload.transcript.clone(),
                matched_option: result.matched_option.clone(),
                answer_index: result.answer_index,
                confidence: result.confidence,
            })
        },
        transcription_confidence,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn submit_spoken_answer<F>(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    code: &str,
    uid: &str,
    text: &str,
    action: VoiceActionEntity,
    received: F,
    transcription_confidence: f64,
) -> Result<AnswerOutcome, ServiceError>
where
    F: FnOnce(&voice_matcher::VoiceMatch) -> ServerMessage,
{
    let store = state.require_session_store().await?;
    let session = require_session(store.as_ref(), code).await?;
    let question_index = session.current_question_index;
    let question = session
        .current_question()
        .ok_or_else(|| ServiceError::InvalidState("No active question".into()))?;

    let mut result = voice_matcher::match_response(text, &question.options);
    let Some(answer_index) = result.answer_index.filter(|_| result.is_valid) else {
        ctx.send(&ServerMessage::VoiceAnswerError(VoiceAnswerErrorPayload {
            error: "Could not match the answer to any option".into(),
            suggestions: voice_matcher::suggestions(&question.options),
        }));
        return Ok(AnswerOutcome {
            advanced: false,
            players: None,
        });
    };
    result.confidence *= transcription_confidence.clamp(0.0, 1.0);

    let interaction = VoiceInteractionEntity {
        uid: uid.to_owned(),
        session_code: code.to_owned(),
        question_id: Some(question.id.clone()),
        action,
        text: Some(text.to_owned()),
        confidence: Some(result.confidence),
        matched_option: result.matched_option.clone(),
        voice_mode_enabled: session.player(uid).map(|player| player.voice_mode_enabled),
        recorded_at: SystemTime::now(),
    };
    if let Err(err) = store.save_voice_interaction(interaction).await {
        warn!(code = %code, uid = %uid, error = %err, "failed to record voice interaction");
    }

    state.rooms().broadcast(code, &received(&result));

    register_answer(
        state,
        ctx,
        code,
        uid,
        Some(answer_index),
        None,
        Some(question_index),
    )
    .await
}

/// Turn voice answering on or off for one player.
pub async fn toggle_voice_mode(
    state: &SharedState,
    payload: ToggleVoiceModePayload,
) -> Result<Vec<PlayerDto>, ServiceError> {
    let code = payload.game_id;
    let players = {
        let _gate = state.lock_room(&code).await;
        let store = state.require_session_store().await?;
        let mut session = require_session(store.as_ref(), &code).await?;
        let player = session
            .player_mut(&payload.uid)
            .ok_or_else(|| ServiceError::NotFound("Player not found in game".into()))?;
        player.voice_mode_enabled = payload.voice_mode_enabled;
        store.save_session(session.clone().into()).await?;

        let interaction = VoiceInteractionEntity {
            uid: payload.uid.clone(),
            session_code: code.clone(),
            question_id: None,
            action: VoiceActionEntity::VoiceModeToggle,
            text: None,
            confidence: None,
            matched_option: None,
            voice_mode_enabled: Some(payload.voice_mode_enabled),
            recorded_at: SystemTime::now(),
        };
        if let Err(err) = store.save_voice_interaction(interaction).await {
            warn!(code = %code, uid = %payload.uid, error = %err, "failed to record voice mode toggle");
        }
        players_of(&session)
    };

    state.rooms().broadcast(
        &code,
        &ServerMessage::VoiceModeChanged(VoiceModeChangedPayload {
            uid: payload.uid.clone(),
            voice_mode_enabled: payload.voice_mode_enabled,
            players: players.clone(),
        }),
    );
    info!(code = %code, uid = %payload.uid, enabled = payload.voice_mode_enabled, "voice mode toggled");
    Ok(players)
}

/// Voice mode flag of every player.
pub async fn voice_mode_status(
    state: &SharedState,
    code: &str,
) -> Result<Vec<VoiceModeEntry>, ServiceError> {
    let store = state.require_session_store().await?;
    let session = require_session(store.as_ref(), code).await?;
    Ok(session
        .players
        .iter()
        .map(|player| VoiceModeEntry {
            uid: player.uid.clone(),
            display_name: player.display_name.clone(),
            voice_mode_enabled: player.voice_mode_enabled,
        })
        .collect())
}

/// Unicast reply for `getVoiceModeStatus`.
pub async fn send_voice_mode_status(
    state: &SharedState,
    ctx: &Arc<ConnectionContext>,
    code: &str,
) -> Result<(), ServiceError> {
    let players = voice_mode_status(state, code).await?;
    ctx.send(&ServerMessage::VoiceModeStatus(VoiceModeStatusPayload { players }));
    Ok(())
}

fn schedule_question(state: &SharedState, code: &str, index: usize, delay: std::time::Duration) {
    let task_state = Arc::clone(state);
    let task_code = code.to_owned();
    state.scheduler().schedule(code, delay, async move {
        if let Err(err) = send_question(&task_state, &task_code, index).await {
            warn!(code = %task_code, index, error = %err, "scheduled question broadcast failed");
        }
    });
}

fn schedule_finish(state: &SharedState, code: &str, delay: std::time::Duration) {
    let task_state = Arc::clone(state);
    let task_code = code.to_owned();
    state.scheduler().schedule(code, delay, async move {
        if let Err(err) = finish_session(&task_state, &task_code).await {
            warn!(code = %task_code, error = %err, "scheduled game end failed");
        }
    });
}

pub(crate) async fn load_session(
    store: &dyn SessionStore,
    code: &str,
) -> Result<Option<GameSession>, ServiceError> {
    match store.find_session(code.to_owned()).await? {
        Some(entity) => Ok(Some(GameSession::try_from(entity)?)),
        None => Ok(None),
    }
}

pub(crate) async fn require_session(
    store: &dyn SessionStore,
    code: &str,
) -> Result<GameSession, ServiceError> {
    load_session(store, code)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Game not found".into()))
}
