//! Full game driven through the socket gateway with the in-memory store.

use std::{sync::Arc, time::Duration};

use axum::extract::ws::Message;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use trivia_live_back::{
    config::AppConfig,
    dao::{
        models::GameOutcomeEntity,
        session_store::{MemorySessionStore, SessionStore},
    },
    services::{identity::TrustTokenVerifier, websocket_service::handle_text},
    state::{AppState, SharedState, rooms::ConnectionContext},
};

struct Client {
    ctx: Arc<ConnectionContext>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    fn connect() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx: ConnectionContext::new(tx),
            rx,
        }
    }

    async fn send(&self, state: &SharedState, frame: Value) {
        handle_text(state, &self.ctx, &frame.to_string()).await;
    }

    async fn answer(&self, state: &SharedState, code: &str, uid: &str, answer: Value) {
        let mut data = json!({"gameId": code, "uid": uid});
        if let (Some(data), Some(answer)) = (data.as_object_mut(), answer.as_object()) {
            data.extend(answer.clone());
        }
        self.send(state, json!({"event": "submitAnswer", "data": data}))
            .await;
    }

    fn received(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                frames.push(serde_json::from_str(text.as_str()).unwrap());
            }
        }
        frames
    }
}

fn find<'a>(frames: &'a [Value], event: &str) -> &'a Value {
    frames
        .iter()
        .find(|frame| frame["event"] == event)
        .unwrap_or_else(|| panic!("no `{event}` in {frames:?}"))
}

fn question(text: &str, correct: usize) -> Value {
    json!({
        "text": text,
        "options": ["Mercury", "Venus", "Earth", "Mars"],
        "correctAnswerIndex": correct,
        "explanation": "Astronomy.",
        "category": "Space"
    })
}

#[tokio::test(start_paused = true)]
async fn two_players_play_a_full_game() {
    let store = MemorySessionStore::new();
    let state = AppState::new(AppConfig::default(), Arc::new(TrustTokenVerifier));
    state.install_session_store(Arc::new(store.clone())).await;

    let mut host = Client::connect();
    let mut guest = Client::connect();

    host.send(
        &state,
        json!({"event": "createGame", "data": {
            "token": "host-uid",
            "hostId": "host-uid",
            "displayName": "Host",
            "isPublic": true,
            "topic": "Space",
            "count": 2,
            "questions": [question("Closest to the sun?", 0), question("Red planet?", 3)]
        }}),
    )
    .await;
    let frames = host.received();
    let created = find(&frames, "gameCreated");
    let code = created["data"]["gameId"].as_str().unwrap().to_owned();
    assert_eq!(created["data"]["status"], "waiting");

    guest
        .send(
            &state,
            json!({"event": "joinGame", "data": {"gameId": code, "uid": "guest-uid", "displayName": "Guest"}}),
        )
        .await;
    assert_eq!(
        find(&host.received(), "playerJoined")["data"]["players"]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    host.send(&state, json!({"event": "startGame", "data": {"gameId": code}}))
        .await;
    assert_eq!(
        find(&guest.received(), "gameStarted")["data"]["questionsCount"],
        2
    );

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    let first = guest.received();
    let new_question = find(&first, "newQuestion");
    assert_eq!(new_question["data"]["index"], 0);
    assert_eq!(
        new_question["data"]["question"]["question"],
        "Closest to the sun?"
    );
    assert_eq!(new_question["data"]["totalQuestions"], 2);
    assert_eq!(new_question["data"]["timeout"], 10);

    // Response times come from the wall clock; the guest answers every round first.
    guest
        .answer(&state, &code, "guest-uid", json!({"answerIndex": 0}))
        .await;
    std::thread::sleep(Duration::from_millis(30));
    host.answer(&state, &code, "host-uid", json!({"answerIndex": 0}))
        .await;
    let frames = host.received();
    let result = find(&frames, "answerResult");
    assert_eq!(result["data"]["questionIndex"], 0);
    assert_eq!(result["data"]["correctAnswerIndex"], 0);

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    let frames = guest.received();
    assert_eq!(find(&frames, "newQuestion")["data"]["index"], 1);

    guest
        .answer(&state, &code, "guest-uid", json!({"answerValue": "Mars"}))
        .await;
    std::thread::sleep(Duration::from_millis(30));
    host.answer(&state, &code, "host-uid", json!({"answerValue": "Mars"}))
        .await;
    tokio::time::sleep(Duration::from_millis(3_100)).await;

    let frames = host.received();
    assert_eq!(find(&frames, "answerResult")["data"]["questionIndex"], 1);
    let finished = find(&frames, "gameFinished");
    let players = finished["data"]["players"].as_array().unwrap();
    assert!(players.iter().all(|player| player["score"] == 2));
    assert_eq!(finished["data"]["winner"], "guest-uid");

    let results = store.list_game_results(code.clone()).await.unwrap();
    assert_eq!(results.len(), 2);
    let wins: Vec<&str> = results
        .iter()
        .filter(|result| result.result == GameOutcomeEntity::Win)
        .map(|result| result.uid.as_str())
        .collect();
    assert_eq!(wins, vec!["guest-uid"]);

    let guest_stats = store
        .find_user_stats("guest-uid".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(guest_stats.games_played, 1);
    assert_eq!(guest_stats.wins, 1);
    assert_eq!(guest_stats.correct_answers, 2);
    let host_stats = store
        .find_user_stats("host-uid".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(host_stats.games_played, 1);
    assert_eq!(host_stats.wins, 0);
    assert_eq!(host_stats.correct_answers, 2);

    guest
        .answer(&state, &code, "guest-uid", json!({"answerIndex": 1}))
        .await;
    assert_eq!(
        find(&guest.received(), "error")["data"]["error"],
        "No active question"
    );
}
