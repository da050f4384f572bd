//! Live connections grouped by room code.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Identifier of one WebSocket connection.
pub type ConnectionId = Uuid;

/// Answer held by a connection until its round closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    /// Question the answer belongs to.
    pub question_index: usize,
    /// Chosen option, if answered by index.
    pub answer_index: Option<usize>,
    /// Chosen option text, preferred over the index when present.
    pub answer_value: Option<String>,
    /// Submission time in epoch milliseconds.
    pub submitted_at_ms: i64,
}

/// Per-connection state handed to every event handler.
///
/// Pending answers live here, keyed by room and question index then uid, and
/// disappear with the connection.
#[derive(Debug)]
pub struct ConnectionContext {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
    uid: Mutex<Option<String>>,
    answers: Mutex<HashMap<(String, usize), HashMap<String, PendingAnswer>>>,
}

impl ConnectionContext {
    /// Wrap the writer side of a socket.
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
            uid: Mutex::new(None),
            answers: Mutex::new(HashMap::new()),
        })
    }

    /// Identifier assigned when the socket was accepted.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Uid last claimed on this connection.
    pub fn uid(&self) -> Option<String> {
        self.uid.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Remember the uid that created or joined a game on this connection.
    pub fn set_uid(&self, uid: &str) {
        *self.uid.lock().unwrap_or_else(PoisonError::into_inner) = Some(uid.to_owned());
    }

    /// Store an answer given in room `code`, replacing any earlier one for the same uid and question.
    pub fn record_answer(&self, code: &str, uid: &str, answer: PendingAnswer) {
        let mut answers = self.answers.lock().unwrap_or_else(PoisonError::into_inner);
        answers
            .entry((code.to_owned(), answer.question_index))
            .or_default()
            .insert(uid.to_owned(), answer);
    }

    /// Answers held for question `question_index` of room `code`, keyed by uid.
    pub fn answers_for(&self, code: &str, question_index: usize) -> Vec<(String, PendingAnswer)> {
        let answers = self.answers.lock().unwrap_or_else(PoisonError::into_inner);
        answers
            .get(&(code.to_owned(), question_index))
            .map(|by_uid| {
                by_uid
                    .iter()
                    .map(|(uid, answer)| (uid.clone(), answer.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every answer held for room `code`.
    pub fn clear_answers(&self, code: &str) {
        let mut answers = self.answers.lock().unwrap_or_else(PoisonError::into_inner);
        answers.retain(|(room, _), _| room != code);
    }

    /// Serialize `value` and queue it on the socket. Returns `false` once the writer is gone.
    pub fn send<T>(&self, value: &T) -> bool
    where
        T: ?Sized + Serialize,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(connection = %self.id, error = %err, "failed to serialize outbound event");
                return true;
            }
        };
        self.tx.send(Message::Text(payload.into())).is_ok()
    }
}

/// Registry of the connections that joined each room, in join order.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, IndexMap<ConnectionId, Arc<ConnectionContext>>>,
}

impl RoomRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Joining the same room again is a no-op.
    pub fn join(&self, code: &str, ctx: &Arc<ConnectionContext>) {
        self.rooms
            .entry(code.to_owned())
            .or_default()
            .entry(ctx.id())
            .or_insert_with(|| Arc::clone(ctx));
    }

    /// Remove a connection from every room it joined; empty rooms are dropped.
    pub fn leave_all(&self, id: ConnectionId) -> Vec<String> {
        let mut left = Vec::new();
        for mut room in self.rooms.iter_mut() {
            if room.value_mut().shift_remove(&id).is_some() {
                left.push(room.key().clone());
            }
        }
        self.rooms.retain(|_, members| !members.is_empty());
        left
    }

    /// Rooms with at least one live connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections of a room, in join order.
    pub fn members(&self, code: &str) -> Vec<Arc<ConnectionContext>> {
        self.rooms
            .get(code)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether connection `id` joined room `code`.
    pub fn contains(&self, code: &str, id: ConnectionId) -> bool {
        self.rooms
            .get(code)
            .is_some_and(|members| members.contains_key(&id))
    }

    /// Send `value` to every connection of the room. Returns the number of live recipients.
    pub fn broadcast<T>(&self, code: &str, value: &T) -> usize
    where
        T: ?Sized + Serialize,
    {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(code = %code, error = %err, "failed to serialize room broadcast");
                return 0;
            }
        };

        self.members(code)
            .iter()
            .filter(|ctx| ctx.tx.send(Message::Text(payload.clone().into())).is_ok())
            .count()
    }

    /// Answers for `question_index` held by the room's live connections.
    ///
    /// When several connections hold an answer for the same uid the most recent wins.
    pub fn collect_answers(&self, code: &str, question_index: usize) -> HashMap<String, PendingAnswer> {
        let mut collected: HashMap<String, PendingAnswer> = HashMap::new();
        for ctx in self.members(code) {
            for (uid, answer) in ctx.answers_for(code, question_index) {
                match collected.get(&uid) {
                    Some(existing) if existing.submitted_at_ms > answer.submitted_at_ms => {}
                    _ => {
                        collected.insert(uid, answer);
                    }
                }
            }
        }
        collected
    }

    /// Drop the answers every member holds for room `code`.
    pub fn clear_answers(&self, code: &str) {
        for ctx in self.members(code) {
            ctx.clear_answers(code);
        }
    }

    /// Forget a room entirely, including the answers its members held for it.
    pub fn remove_room(&self, code: &str) -> Vec<Arc<ConnectionContext>> {
        let members: Vec<Arc<ConnectionContext>> = self
            .rooms
            .remove(code)
            .map(|(_, members)| members.into_values().collect())
            .unwrap_or_default();
        for ctx in &members {
            ctx.clear_answers(code);
        }
        members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Arc<ConnectionContext>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionContext::new(tx), rx)
    }

    fn answer(index: usize, choice: usize, at: i64) -> PendingAnswer {
        PendingAnswer {
            question_index: index,
            answer_index: Some(choice),
            answer_value: None,
            submitted_at_ms: at,
        }
    }

    #[test]
    fn last_write_wins_per_question() {
        let (ctx, _rx) = connection();
        ctx.record_answer("100000", "u1", answer(0, 1, 10));
        ctx.record_answer("100000", "u1", answer(0, 2, 20));
        ctx.record_answer("100000", "u1", answer(1, 3, 30));

        let round = ctx.answers_for("100000", 0);
        assert_eq!(round.len(), 1);
        assert_eq!(round[0].1.answer_index, Some(2));
    }

    #[test]
    fn answers_vanish_when_connection_leaves() {
        let rooms = RoomRegistry::new();
        let (a, _ra) = connection();
        let (b, _rb) = connection();
        rooms.join("111111", &a);
        rooms.join("111111", &b);
        a.record_answer("111111", "u1", answer(0, 0, 1));
        b.record_answer("111111", "u2", answer(0, 0, 2));
        assert_eq!(rooms.collect_answers("111111", 0).len(), 2);

        assert_eq!(rooms.leave_all(b.id()), vec!["111111".to_owned()]);
        let remaining = rooms.collect_answers("111111", 0);
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key("u1"));
    }

    #[test]
    fn broadcast_reaches_every_member_once() {
        let rooms = RoomRegistry::new();
        let (a, mut ra) = connection();
        let (b, mut rb) = connection();
        rooms.join("222222", &a);
        rooms.join("222222", &a);
        rooms.join("222222", &b);

        let sent = rooms.broadcast("222222", &serde_json::json!({"event": "ping"}));
        assert_eq!(sent, 2);
        assert!(matches!(ra.try_recv(), Ok(Message::Text(_))));
        assert!(ra.try_recv().is_err());
        assert!(matches!(rb.try_recv(), Ok(Message::Text(_))));
    }

    #[test]
    fn empty_rooms_are_dropped() {
        let rooms = RoomRegistry::new();
        let (a, _ra) = connection();
        rooms.join("333333", &a);
        rooms.leave_all(a.id());
        assert!(rooms.members("333333").is_empty());
        assert!(!rooms.contains("333333", a.id()));
    }

    #[test]
    fn answers_stay_with_the_room_they_were_given_in() {
        let rooms = RoomRegistry::new();
        let (ctx, _rx) = connection();
        rooms.join("444444", &ctx);
        ctx.record_answer("444444", "alice", answer(0, 1, 5));

        rooms.join("555555", &ctx);
        assert!(rooms.collect_answers("555555", 0).is_empty());
        assert_eq!(rooms.collect_answers("444444", 0).len(), 1);

        rooms.clear_answers("444444");
        assert!(rooms.collect_answers("444444", 0).is_empty());
    }

    #[test]
    fn removing_a_room_drops_its_answers() {
        let rooms = RoomRegistry::new();
        let (ctx, _rx) = connection();
        rooms.join("666666", &ctx);
        ctx.record_answer("666666", "u1", answer(0, 0, 1));

        assert_eq!(rooms.remove_room("666666").len(), 1);
        rooms.join("666666", &ctx);
        assert!(rooms.collect_answers("666666", 0).is_empty());
    }
}
