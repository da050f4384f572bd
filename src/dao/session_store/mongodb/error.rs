use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB session store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save session `{code}`")]
    SaveSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{code}`")]
    LoadSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete session `{code}`")]
    DeleteSession {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list open sessions")]
    ListSessions {
        #[source]
        source: MongoError,
    },
    #[error("failed to write game result for `{uid}` in session `{code}`")]
    SaveResult {
        uid: String,
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game results of session `{code}`")]
    LoadResults {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update statistics of `{uid}`")]
    UpdateStats {
        uid: String,
        #[source]
        source: MongoError,
    },
    #[error("statistics upsert for `{uid}` returned no document")]
    StatsMissingAfterUpsert { uid: String },
    #[error("failed to load statistics of `{uid}`")]
    LoadStats {
        uid: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to record voice interaction of `{uid}`")]
    SaveInteraction {
        uid: String,
        #[source]
        source: MongoError,
    },
}
