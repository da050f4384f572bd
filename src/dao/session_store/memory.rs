//! In-process session store used when no database is configured and as the
//! substitute collaborator in tests.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{
        GameResultEntity, GameSessionEntity, SessionStatusEntity, UserStatsEntity,
        UserStatsUpdate, VoiceInteractionEntity,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

/// DashMap-backed store. Every method completes without suspending.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<String, GameSessionEntity>,
    results: DashMap<String, Vec<GameResultEntity>>,
    stats: DashMap<String, UserStatsEntity>,
    interactions: Mutex<Vec<VoiceInteractionEntity>>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded voice interaction, oldest first.
    pub fn voice_interactions(&self) -> Vec<VoiceInteractionEntity> {
        self.inner
            .interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn save_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.sessions.insert(session.code.clone(), session);
        Box::pin(async { Ok(()) })
    }

    fn find_session(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let found = self.inner.sessions.get(&code).map(|entry| entry.clone());
        Box::pin(async move { Ok(found) })
    }

    fn delete_session(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.inner.sessions.remove(&code).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list_open_sessions(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let mut open: Vec<GameSessionEntity> = self
            .inner
            .sessions
            .iter()
            .filter(|entry| entry.is_public && entry.status == SessionStatusEntity::Waiting)
            .map(|entry| entry.clone())
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open.truncate(limit);
        Box::pin(async move { Ok(open) })
    }

    fn save_game_result(&self, result: GameResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let mut results = self
            .inner
            .results
            .entry(result.session_code.clone())
            .or_default();
        match results
            .iter_mut()
            .find(|saved| saved.session_id == result.session_id && saved.uid == result.uid)
        {
            Some(saved) => *saved = result,
            None => results.push(result),
        }
        drop(results);
        Box::pin(async { Ok(()) })
    }

    fn list_game_results(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResultEntity>>> {
        let results = self
            .inner
            .results
            .get(&code)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        Box::pin(async move { Ok(results) })
    }

    fn apply_stats_update(
        &self,
        update: UserStatsUpdate,
    ) -> BoxFuture<'static, StorageResult<UserStatsEntity>> {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .inner
            .stats
            .entry(update.uid.clone())
            .or_insert_with(|| {
                UserStatsEntity::empty(update.uid.clone(), update.display_name.clone())
            });
        entry.apply(&update);
        let stats = entry.clone();
        drop(entry);
        Box::pin(async move { Ok(stats) })
    }

    fn find_user_stats(
        &self,
        uid: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>> {
        let stats = self.inner.stats.get(&uid).map(|entry| entry.clone());
        Box::pin(async move { Ok(stats) })
    }

    fn save_voice_interaction(
        &self,
        interaction: VoiceInteractionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner
            .interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interaction);
        Box::pin(async { Ok(()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn session(code: &str, is_public: bool, status: SessionStatusEntity, age: u64) -> GameSessionEntity {
        let created_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 - age);
        GameSessionEntity {
            code: code.into(),
            session_id: format!("session-{code}"),
            host_id: "host".into(),
            status,
            players: Vec::new(),
            questions: Vec::new(),
            current_question_index: 0,
            question_start_times: Default::default(),
            is_public,
            topic: String::new(),
            difficulty: "medium".into(),
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn open_sessions_are_public_waiting_and_newest_first() {
        let store = MemorySessionStore::new();
        store
            .save_session(session("111111", true, SessionStatusEntity::Waiting, 30))
            .await
            .unwrap();
        store
            .save_session(session("222222", true, SessionStatusEntity::Waiting, 10))
            .await
            .unwrap();
        store
            .save_session(session("333333", false, SessionStatusEntity::Waiting, 5))
            .await
            .unwrap();
        store
            .save_session(session("444444", true, SessionStatusEntity::InProgress, 1))
            .await
            .unwrap();

        let open = store.list_open_sessions(10).await.unwrap();
        let codes: Vec<_> = open.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["222222", "111111"]);

        let limited = store.list_open_sessions(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn stats_updates_accumulate() {
        let store = MemorySessionStore::new();
        let update = |won, correct| UserStatsUpdate {
            uid: "u1".into(),
            display_name: Some("Ana".into()),
            won,
            correct_answers: correct,
        };

        store.apply_stats_update(update(true, 3)).await.unwrap();
        let stats = store.apply_stats_update(update(false, 1)).await.unwrap();

        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.correct_answers, 4);
        assert_eq!(stats.display_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn delete_reports_whether_session_existed() {
        let store = MemorySessionStore::new();
        store
            .save_session(session("555555", true, SessionStatusEntity::Waiting, 0))
            .await
            .unwrap();

        assert!(store.delete_session("555555".into()).await.unwrap());
        assert!(!store.delete_session("555555".into()).await.unwrap());
        assert!(store.find_session("555555".into()).await.unwrap().is_none());
    }
}
