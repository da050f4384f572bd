use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::UserStatsEntity;

/// Lifetime statistics of a player.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    pub uid: String,
    pub display_name: Option<String>,
    pub games_played: u32,
    pub wins: u32,
    pub correct_answers: u32,
}

impl From<UserStatsEntity> for UserStatsResponse {
    fn from(value: UserStatsEntity) -> Self {
        Self {
            uid: value.uid,
            display_name: value.display_name,
            games_played: value.games_played,
            wins: value.wins,
            correct_answers: value.correct_answers,
        }
    }
}
