use std::{
    collections::{BTreeMap, HashMap},
    time::{SystemTime, UNIX_EPOCH},
};

use uuid::Uuid;

use crate::{
    dao::{
        models::{
            GameOutcomeEntity, GameResultEntity, GameSessionEntity, PlayerEntity, QuestionEntity,
            ResultPlayerEntity,
        },
        storage::StorageError,
    },
    state::{
        rooms::PendingAnswer,
        scoring,
        state_machine::{InvalidTransition, SessionEvent, SessionStatus},
    },
};

/// Multiple-choice question played during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Stable identifier (`q_<index>` when the host did not provide one).
    pub id: String,
    /// Prompt shown to players.
    pub text: String,
    /// Exactly four options in display order.
    pub options: Vec<String>,
    /// Index of the correct option in `options`.
    pub correct_answer_index: usize,
    /// Revealed together with the round result.
    pub explanation: String,
    /// Category declared by the question source, checked against the session topic.
    pub category: Option<String>,
}

/// Participant of a session and their running score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Identity provider uid, unique within a session.
    pub uid: String,
    /// Name shown to the other players.
    pub display_name: String,
    /// One point per correct answer.
    pub score: u32,
    /// Milliseconds between question broadcast and answer, one entry per answered round.
    pub response_times: Vec<i64>,
    /// Player answers by voice.
    pub voice_mode_enabled: bool,
    /// Player declared a visual impairment.
    pub visual_difficulty: bool,
}

impl Player {
    /// Fresh player with a zero score.
    pub fn new(uid: String, display_name: String) -> Self {
        Self {
            uid,
            display_name,
            score: 0,
            response_times: Vec::new(),
            voice_mode_enabled: false,
            visual_difficulty: false,
        }
    }
}

/// Authoritative state of one trivia room.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    /// Six digit room code.
    pub code: String,
    /// Unique id of this game, distinct across reuses of the same code.
    pub session_id: String,
    /// Uid of the creator.
    pub host_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Players in join order.
    pub players: Vec<Player>,
    /// Questions fixed at creation.
    pub questions: Vec<Question>,
    /// Question currently being played. Equals `questions.len()` once finished.
    pub current_question_index: usize,
    /// Broadcast time (epoch ms) of each question.
    pub question_start_times: BTreeMap<usize, i64>,
    /// Listed in the public lobby.
    pub is_public: bool,
    /// Topic declared by the host, empty when none.
    pub topic: String,
    /// Difficulty label, `medium` by default.
    pub difficulty: String,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last mutation time.
    pub updated_at: SystemTime,
}

/// Result of closing a round once every player answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Index of the question that was scored.
    pub question_index: usize,
    /// Correct option of that question.
    pub correct_answer_index: usize,
    /// Explanation of that question.
    pub explanation: String,
    /// `true` when no question remains.
    pub finished: bool,
}

impl GameSession {
    /// Build a waiting session whose only player is the host.
    pub fn new(
        code: String,
        host: Player,
        questions: Vec<Question>,
        topic: String,
        difficulty: String,
        is_public: bool,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            code,
            session_id: Uuid::new_v4().to_string(),
            host_id: host.uid.clone(),
            status: SessionStatus::Waiting,
            players: vec![host],
            questions,
            current_question_index: 0,
            question_start_times: BTreeMap::new(),
            is_public,
            topic,
            difficulty,
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a player by uid.
    pub fn player(&self, uid: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.uid == uid)
    }

    /// Mutable lookup of a player by uid.
    pub fn player_mut(&mut self, uid: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.uid == uid)
    }

    /// Append a player unless the uid already joined. Returns whether it was added.
    pub fn add_player(&mut self, player: Player) -> bool {
        if self.player(&player.uid).is_some() {
            return false;
        }
        self.players.push(player);
        self.touch();
        true
    }

    /// Move from the lobby to the first question.
    pub fn start(&mut self) -> Result<usize, InvalidTransition> {
        self.status = self.status.next(SessionEvent::Start)?;
        self.current_question_index = 0;
        self.touch();
        Ok(self.questions.len())
    }

    /// Question being played, if the session is in progress.
    pub fn current_question(&self) -> Option<&Question> {
        if self.status != SessionStatus::InProgress {
            return None;
        }
        self.questions.get(self.current_question_index)
    }

    /// Any player relies on voice or has a visual impairment.
    pub fn requires_extended_timeout(&self) -> bool {
        self.players
            .iter()
            .any(|player| player.voice_mode_enabled || player.visual_difficulty)
    }

    /// Record when question `index` was first broadcast.
    pub fn stamp_question(&mut self, index: usize, now_ms: i64) {
        self.question_start_times.entry(index).or_insert(now_ms);
        self.touch();
    }

    /// Uids of every player that has not answered in `answers`.
    pub fn missing_answers<'a>(&'a self, answers: &HashMap<String, PendingAnswer>) -> Vec<&'a str> {
        self.players
            .iter()
            .filter(|player| !answers.contains_key(&player.uid))
            .map(|player| player.uid.as_str())
            .collect()
    }

    /// Score the current round and advance the question index.
    ///
    /// Every player with an answer gets a response time entry and a point when
    /// correct. The session finishes when the scored question was the last one.
    pub fn close_round(
        &mut self,
        answers: &HashMap<String, PendingAnswer>,
        now_ms: i64,
    ) -> Result<RoundOutcome, InvalidTransition> {
        let index = self.current_question_index;
        let question = match self.current_question() {
            Some(question) => question.clone(),
            None => {
                return Err(InvalidTransition {
                    from: self.status,
                    event: SessionEvent::Advance,
                });
            }
        };
        let started_at = self.question_start_times.get(&index).copied().unwrap_or(now_ms);

        for player in &mut self.players {
            let Some(answer) = answers.get(&player.uid) else {
                continue;
            };
            if scoring::is_correct(&question, answer.answer_index, answer.answer_value.as_deref()) {
                player.score += 1;
            }
            player.response_times.push(answer.submitted_at_ms - started_at);
        }

        self.current_question_index = index + 1;
        let finished = self.current_question_index >= self.questions.len();
        let event = if finished {
            SessionEvent::Finish
        } else {
            SessionEvent::Advance
        };
        self.status = self.status.next(event)?;
        self.touch();

        Ok(RoundOutcome {
            question_index: index,
            correct_answer_index: question.correct_answer_index,
            explanation: question.explanation,
            finished,
        })
    }

    /// Mark the session finished. The index jumps to the end of the question list.
    pub fn finish(&mut self) -> Result<(), InvalidTransition> {
        self.status = self.status.next(SessionEvent::Finish)?;
        self.current_question_index = self.questions.len();
        self.touch();
        Ok(())
    }

    /// Uid of the winner according to the tie-break rules.
    pub fn winner(&self) -> Option<&str> {
        scoring::determine_winner(&self.players).map(|player| player.uid.as_str())
    }

    /// One result per player, to be written once the session is finished.
    pub fn results(&self) -> Vec<GameResultEntity> {
        let winner = self.winner();
        let roster: Vec<ResultPlayerEntity> = self
            .players
            .iter()
            .map(|player| ResultPlayerEntity {
                uid: player.uid.clone(),
                display_name: player.display_name.clone(),
                score: player.score,
            })
            .collect();
        let completed_at = SystemTime::now();

        self.players
            .iter()
            .map(|player| GameResultEntity {
                uid: player.uid.clone(),
                session_code: self.code.clone(),
                session_id: self.session_id.clone(),
                score: player.score,
                result: if winner == Some(player.uid.as_str()) {
                    GameOutcomeEntity::Win
                } else {
                    GameOutcomeEntity::Lose
                },
                is_host: player.uid == self.host_id,
                questions_count: self.questions.len(),
                topic: self.topic.clone(),
                difficulty: self.difficulty.clone(),
                players: roster.clone(),
                completed_at,
            })
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

/// Current wall clock as epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id,
            text: value.text,
            options: value.options,
            correct_answer_index: value.correct_answer_index,
            explanation: value.explanation,
            category: value.category,
        }
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            id: value.id,
            text: value.text,
            options: value.options,
            correct_answer_index: value.correct_answer_index,
            explanation: value.explanation,
            category: value.category,
        }
    }
}

impl From<PlayerEntity> for Player {
    fn from(value: PlayerEntity) -> Self {
        Self {
            uid: value.uid,
            display_name: value.display_name,
            score: value.score,
            response_times: value.response_times,
            voice_mode_enabled: value.voice_mode_enabled,
            visual_difficulty: value.visual_difficulty,
        }
    }
}

impl From<Player> for PlayerEntity {
    fn from(value: Player) -> Self {
        Self {
            uid: value.uid,
            display_name: value.display_name,
            score: value.score,
            response_times: value.response_times,
            voice_mode_enabled: value.voice_mode_enabled,
            visual_difficulty: value.visual_difficulty,
        }
    }
}

impl TryFrom<GameSessionEntity> for GameSession {
    type Error = StorageError;

    fn try_from(value: GameSessionEntity) -> Result<Self, Self::Error> {
        let mut question_start_times = BTreeMap::new();
        for (key, started_at) in value.question_start_times {
            let index = key.parse::<usize>().map_err(|_| {
                StorageError::corrupted(
                    value.code.clone(),
                    format!("question start time key `{key}` is not an index"),
                )
            })?;
            question_start_times.insert(index, started_at);
        }

        if value.current_question_index > value.questions.len() {
            return Err(StorageError::corrupted(
                value.code,
                "current question index is past the question list",
            ));
        }

        Ok(Self {
            code: value.code,
            session_id: value.session_id,
            host_id: value.host_id,
            status: value.status.into(),
            players: value.players.into_iter().map(Into::into).collect(),
            questions: value.questions.into_iter().map(Into::into).collect(),
            current_question_index: value.current_question_index,
            question_start_times,
            is_public: value.is_public,
            topic: value.topic,
            difficulty: value.difficulty,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

impl From<GameSession> for GameSessionEntity {
    fn from(value: GameSession) -> Self {
        Self {
            code: value.code,
            session_id: value.session_id,
            host_id: value.host_id,
            status: value.status.into(),
            players: value.players.into_iter().map(Into::into).collect(),
            questions: value.questions.into_iter().map(Into::into).collect(),
            current_question_index: value.current_question_index,
            question_start_times: value
                .question_start_times
                .into_iter()
                .map(|(index, started_at)| (index.to_string(), started_at))
                .collect(),
            is_public: value.is_public,
            topic: value.topic,
            difficulty: value.difficulty,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, correct: usize) -> Question {
        Question {
            id: id.into(),
            text: format!("question {id}"),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: correct,
            explanation: format!("because {id}"),
            category: None,
        }
    }

    fn session(questions: usize) -> GameSession {
        let questions = (0..questions).map(|i| question(&format!("q_{i}"), i % 4)).collect();
        let mut session = GameSession::new(
            "123456".into(),
            Player::new("host".into(), "Host".into()),
            questions,
            String::new(),
            "medium".into(),
            true,
        );
        session.add_player(Player::new("guest".into(), "Guest".into()));
        session
    }

    fn answer(index: usize, answer_index: usize, at: i64) -> PendingAnswer {
        PendingAnswer {
            question_index: index,
            answer_index: Some(answer_index),
            answer_value: None,
            submitted_at_ms: at,
        }
    }

    #[test]
    fn joining_twice_keeps_one_entry() {
        let mut session = session(1);
        assert!(!session.add_player(Player::new("guest".into(), "Again".into())));
        assert_eq!(session.players.len(), 2);
        assert_eq!(session.player("guest").map(|p| p.display_name.as_str()), Some("Guest"));
    }

    #[test]
    fn close_round_scores_and_advances() {
        let mut session = session(2);
        session.start().unwrap();
        session.stamp_question(0, 1_000);

        let answers = HashMap::from([
            ("host".to_owned(), answer(0, 0, 1_400)),
            ("guest".to_owned(), answer(0, 3, 1_900)),
        ]);
        let outcome = session.close_round(&answers, 2_000).unwrap();

        assert_eq!(outcome.question_index, 0);
        assert_eq!(outcome.correct_answer_index, 0);
        assert!(!outcome.finished);
        assert_eq!(session.current_question_index, 1);
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.player("host").unwrap().score, 1);
        assert_eq!(session.player("host").unwrap().response_times, vec![400]);
        assert_eq!(session.player("guest").unwrap().score, 0);
        assert_eq!(session.player("guest").unwrap().response_times, vec![900]);
    }

    #[test]
    fn closing_last_round_finishes_and_blocks_further_rounds() {
        let mut session = session(1);
        session.start().unwrap();

        let answers = HashMap::from([
            ("host".to_owned(), answer(0, 0, 10)),
            ("guest".to_owned(), answer(0, 0, 10)),
        ]);
        let outcome = session.close_round(&answers, 10).unwrap();

        assert!(outcome.finished);
        assert_eq!(session.status, SessionStatus::Finished);
        assert_eq!(session.current_question_index, session.questions.len());
        assert!(session.current_question().is_none());
        assert!(session.close_round(&answers, 20).is_err());
        for player in &session.players {
            assert!(player.response_times.len() <= session.current_question_index);
        }
    }

    #[test]
    fn missing_start_time_counts_from_now() {
        let mut session = session(1);
        session.start().unwrap();
        let answers = HashMap::from([("host".to_owned(), answer(0, 0, 5_000))]);
        session.close_round(&answers, 5_000).unwrap();
        assert_eq!(session.player("host").unwrap().response_times, vec![0]);
        assert!(session.player("guest").unwrap().response_times.is_empty());
    }

    #[test]
    fn results_mark_single_winner_and_host() {
        let mut session = session(1);
        session.start().unwrap();
        session.players[1].score = 1;
        session.finish().unwrap();

        let results = session.results();
        let guest = results.iter().find(|r| r.uid == "guest").unwrap();
        let host = results.iter().find(|r| r.uid == "host").unwrap();
        assert_eq!(guest.result, GameOutcomeEntity::Win);
        assert!(!guest.is_host);
        assert_eq!(host.result, GameOutcomeEntity::Lose);
        assert!(host.is_host);
        assert_eq!(host.players.len(), 2);
    }

    #[test]
    fn extended_timeout_follows_accessibility_flags() {
        let mut session = session(1);
        assert!(!session.requires_extended_timeout());
        session.player_mut("guest").unwrap().visual_difficulty = true;
        assert!(session.requires_extended_timeout());
    }

    #[test]
    fn entity_round_trip_keeps_start_times() {
        let mut session = session(2);
        session.stamp_question(1, 42);
        let entity: GameSessionEntity = session.clone().into();
        assert_eq!(entity.question_start_times.get("1"), Some(&42));
        let restored = GameSession::try_from(entity).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn corrupted_start_time_key_is_rejected() {
        let mut entity: GameSessionEntity = session(1).into();
        entity.question_start_times.insert("first".into(), 1);
        assert!(matches!(
            GameSession::try_from(entity),
            Err(StorageError::Corrupted { .. })
        ));
    }
}
