pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    GameResultEntity, GameSessionEntity, UserStatsEntity, UserStatsUpdate, VoiceInteractionEntity,
};
use crate::dao::storage::StorageResult;

pub use memory::MemorySessionStore;

/// Abstraction over the persistence layer holding one document per room.
pub trait SessionStore: Send + Sync {
    /// Upsert the session document stored under its room code.
    fn save_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, code: String)
    -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    /// Remove a session, returning whether a document existed.
    fn delete_session(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Public sessions still waiting for players, newest first.
    fn list_open_sessions(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>>;
    fn save_game_result(&self, result: GameResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_game_results(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResultEntity>>>;
    /// Atomically apply a post-game increment, creating the document when missing.
    fn apply_stats_update(
        &self,
        update: UserStatsUpdate,
    ) -> BoxFuture<'static, StorageResult<UserStatsEntity>>;
    fn find_user_stats(&self, uid: String)
    -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>>;
    fn save_voice_interaction(
        &self,
        interaction: VoiceInteractionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
