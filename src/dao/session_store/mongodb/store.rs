use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoGameResultDocument, MongoSessionDocument, MongoUserStatsDocument,
        MongoVoiceInteractionDocument,
    },
};
use crate::dao::{
    models::{
        GameResultEntity, GameSessionEntity, UserStatsEntity, UserStatsUpdate,
        VoiceInteractionEntity,
    },
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const RESULT_COLLECTION_NAME: &str = "game_results";
const USER_COLLECTION_NAME: &str = "users";
const VOICE_COLLECTION_NAME: &str = "voice_interactions";

/// MongoDB implementation of [`SessionStore`]. Cheap to clone.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the driver's connection pool lives as long as the database handle.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let sessions = self.sessions().await;
        let lobby_index = IndexModel::builder()
            .keys(doc! {"is_public": 1, "status": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_lobby_idx".to_owned()))
                    .build(),
            )
            .build();
        sessions
            .create_index(lobby_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "is_public,status,created_at",
                source,
            })?;

        // One result per player per game; a reused code starts a new game.
        let results = self.results().await;
        let result_index = IndexModel::builder()
            .keys(doc! {"session_id": 1, "uid": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("result_session_uid_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        results
            .create_index(result_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULT_COLLECTION_NAME,
                index: "session_id,uid",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION_NAME)
    }

    async fn results(&self) -> Collection<MongoGameResultDocument> {
        self.database().await.collection(RESULT_COLLECTION_NAME)
    }

    async fn users(&self) -> Collection<MongoUserStatsDocument> {
        self.database().await.collection(USER_COLLECTION_NAME)
    }

    async fn interactions(&self) -> Collection<MongoVoiceInteractionDocument> {
        self.database().await.collection(VOICE_COLLECTION_NAME)
    }

    async fn save_session(&self, session: GameSessionEntity) -> MongoResult<()> {
        let code = session.code.clone();
        let document: MongoSessionDocument = session.into();
        self.sessions()
            .await
            .replace_one(doc! {"_id": &code}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSession { code, source })?;
        Ok(())
    }

    async fn find_session(&self, code: String) -> MongoResult<Option<GameSessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc! {"_id": &code})
            .await
            .map_err(|source| MongoDaoError::LoadSession { code, source })?;
        Ok(document.map(Into::into))
    }

    async fn delete_session(&self, code: String) -> MongoResult<bool> {
        let result = self
            .sessions()
            .await
            .delete_one(doc! {"_id": &code})
            .await
            .map_err(|source| MongoDaoError::DeleteSession { code, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_open_sessions(&self, limit: usize) -> MongoResult<Vec<GameSessionEntity>> {
        let documents: Vec<MongoSessionDocument> = self
            .sessions()
            .await
            .find(doc! {"is_public": true, "status": "waiting"})
            .sort(doc! {"created_at": -1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListSessions { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_game_result(&self, result: GameResultEntity) -> MongoResult<()> {
        let uid = result.uid.clone();
        let code = result.session_code.clone();
        let session_id = result.session_id.clone();
        let document: MongoGameResultDocument = result.into();
        self.results()
            .await
            .replace_one(doc! {"session_id": &session_id, "uid": &uid}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveResult { uid, code, source })?;
        Ok(())
    }

    async fn list_game_results(&self, code: String) -> MongoResult<Vec<GameResultEntity>> {
        let documents: Vec<MongoGameResultDocument> = self
            .results()
            .await
            .find(doc! {"session_code": &code})
            .await
            .map_err(|source| MongoDaoError::LoadResults {
                code: code.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadResults { code, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Single `$inc` upsert so concurrent finalisations never lose an increment.
    async fn apply_stats_update(&self, update: UserStatsUpdate) -> MongoResult<UserStatsEntity> {
        let UserStatsUpdate {
            uid,
            display_name,
            won,
            correct_answers,
        } = update;

        let document = self
            .users()
            .await
            .find_one_and_update(
                doc! {"_id": &uid},
                doc! {
                    "$inc": {
                        "games_played": 1_i64,
                        "wins": if won { 1_i64 } else { 0_i64 },
                        "correct_answers": i64::from(correct_answers),
                    },
                    "$setOnInsert": { "display_name": display_name },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::UpdateStats {
                uid: uid.clone(),
                source,
            })?;

        document
            .map(Into::into)
            .ok_or(MongoDaoError::StatsMissingAfterUpsert { uid })
    }

    async fn find_user_stats(&self, uid: String) -> MongoResult<Option<UserStatsEntity>> {
        let document = self
            .users()
            .await
            .find_one(doc! {"_id": &uid})
            .await
            .map_err(|source| MongoDaoError::LoadStats { uid, source })?;
        Ok(document.map(Into::into))
    }

    async fn save_voice_interaction(&self, interaction: VoiceInteractionEntity) -> MongoResult<()> {
        let uid = interaction.uid.clone();
        let document: MongoVoiceInteractionDocument = interaction.into();
        self.interactions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveInteraction { uid, source })?;
        Ok(())
    }
}

impl SessionStore for MongoSessionStore {
    fn save_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_session(session).await.map_err(Into::into) })
    }

    fn find_session(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(code).await.map_err(Into::into) })
    }

    fn delete_session(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_session(code).await.map_err(Into::into) })
    }

    fn list_open_sessions(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_open_sessions(limit).await.map_err(Into::into) })
    }

    fn save_game_result(&self, result: GameResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_game_result(result).await.map_err(Into::into) })
    }

    fn list_game_results(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Vec<GameResultEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_game_results(code).await.map_err(Into::into) })
    }

    fn apply_stats_update(
        &self,
        update: UserStatsUpdate,
    ) -> BoxFuture<'static, StorageResult<UserStatsEntity>> {
        let store = self.clone();
        Box::pin(async move { store.apply_stats_update(update).await.map_err(Into::into) })
    }

    fn find_user_stats(
        &self,
        uid: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user_stats(uid).await.map_err(Into::into) })
    }

    fn save_voice_interaction(
        &self,
        interaction: VoiceInteractionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .save_voice_interaction(interaction)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
