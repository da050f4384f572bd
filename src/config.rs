//! Application-level configuration loading: game pacing, answer exposure and identity mode.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_BACK_CONFIG_PATH";
/// Environment variable carrying the Firebase Web API key.
const FIREBASE_API_KEY_ENV: &str = "FIREBASE_API_KEY";

const DEFAULT_START_DELAY_MS: u64 = 1_000;
const DEFAULT_ADVANCE_DELAY_MS: u64 = 3_000;
const DEFAULT_QUESTION_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ACCESSIBLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_ROOM_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_LOBBY_LIMIT: usize = 20;

/// How caller tokens are turned into uids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// The token is taken as the uid itself. Development and tests only.
    TrustToken,
    /// Tokens are looked up against the Firebase identity toolkit.
    Firebase {
        /// Web API key of the Firebase project.
        api_key: String,
    },
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    start_delay: Duration,
    advance_delay: Duration,
    question_timeout_secs: u64,
    accessible_timeout_secs: u64,
    hide_correct_answer: bool,
    room_code_attempts: u32,
    lobby_limit: usize,
    identity: IdentityMode,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(api_key) = env::var(FIREBASE_API_KEY_ENV)
            .ok()
            .filter(|value| !value.is_empty())
        {
            self.identity = IdentityMode::Firebase { api_key };
        }
        if self.identity == IdentityMode::TrustToken {
            warn!("identity verification runs in trust-token mode; do not expose this server");
        }
        self
    }

    /// Pause between `gameStarted` and the first question.
    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    /// Pause between `answerResult` and the next question or the end of the game.
    pub fn advance_delay(&self) -> Duration {
        self.advance_delay
    }

    /// Advisory countdown sent with each question, in seconds.
    pub fn question_timeout_secs(&self, extended: bool) -> u64 {
        if extended {
            self.accessible_timeout_secs
        } else {
            self.question_timeout_secs
        }
    }

    /// Strip `correctAnswerIndex` from `newQuestion` broadcasts.
    pub fn hide_correct_answer(&self) -> bool {
        self.hide_correct_answer
    }

    /// How many fresh codes are drawn before giving up on a collision.
    pub fn room_code_attempts(&self) -> u32 {
        self.room_code_attempts
    }

    /// Default page size of the public lobby listing.
    pub fn lobby_limit(&self) -> usize {
        self.lobby_limit
    }

    /// How tokens are verified.
    pub fn identity(&self) -> &IdentityMode {
        &self.identity
    }

    /// Shorten the pacing delays, mainly for tests.
    pub fn with_delays(mut self, start_delay: Duration, advance_delay: Duration) -> Self {
        self.start_delay = start_delay;
        self.advance_delay = advance_delay;
        self
    }

    /// Toggle answer stripping.
    pub fn with_hidden_answers(mut self, hide: bool) -> Self {
        self.hide_correct_answer = hide;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    start_delay_ms: Option<u64>,
    advance_delay_ms: Option<u64>,
    question_timeout_secs: Option<u64>,
    accessible_timeout_secs: Option<u64>,
    hide_correct_answer: Option<bool>,
    room_code_attempts: Option<u32>,
    lobby_limit: Option<usize>,
    identity: Option<RawIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum RawIdentity {
    TrustToken,
    Firebase {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            start_delay: Duration::from_millis(
                value.start_delay_ms.unwrap_or(DEFAULT_START_DELAY_MS),
            ),
            advance_delay: Duration::from_millis(
                value.advance_delay_ms.unwrap_or(DEFAULT_ADVANCE_DELAY_MS),
            ),
            question_timeout_secs: value
                .question_timeout_secs
                .unwrap_or(DEFAULT_QUESTION_TIMEOUT_SECS),
            accessible_timeout_secs: value
                .accessible_timeout_secs
                .unwrap_or(DEFAULT_ACCESSIBLE_TIMEOUT_SECS),
            hide_correct_answer: value.hide_correct_answer.unwrap_or(false),
            room_code_attempts: value
                .room_code_attempts
                .unwrap_or(DEFAULT_ROOM_CODE_ATTEMPTS)
                .max(1),
            lobby_limit: value.lobby_limit.unwrap_or(DEFAULT_LOBBY_LIMIT).max(1),
            identity: match value.identity {
                Some(RawIdentity::Firebase { api_key }) => IdentityMode::Firebase { api_key },
                Some(RawIdentity::TrustToken) | None => IdentityMode::TrustToken,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_game_pacing() {
        let config = AppConfig::default();
        assert_eq!(config.start_delay(), Duration::from_secs(1));
        assert_eq!(config.advance_delay(), Duration::from_secs(3));
        assert_eq!(config.question_timeout_secs(false), 10);
        assert_eq!(config.question_timeout_secs(true), 120);
        assert!(!config.hide_correct_answer());
        assert_eq!(config.room_code_attempts(), 5);
        assert_eq!(config.identity(), &IdentityMode::TrustToken);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{"advanceDelayMs": 500, "hideCorrectAnswer": true,
                "identity": {"mode": "firebase", "apiKey": "k"}}"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.advance_delay(), Duration::from_millis(500));
        assert_eq!(config.start_delay(), Duration::from_secs(1));
        assert!(config.hide_correct_answer());
        assert_eq!(
            config.identity(),
            &IdentityMode::Firebase {
                api_key: "k".into()
            }
        );
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let raw: RawConfig = serde_json::from_str(r#"{"roomCodeAttempts": 0}"#).unwrap();
        assert_eq!(AppConfig::from(raw).room_code_attempts(), 1);
    }
}
