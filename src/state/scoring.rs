//! Round scoring and end-of-game winner selection.

use crate::state::game::{Player, Question};

/// Whether an answer is correct for `question`.
///
/// A submitted value is compared against the text of the correct option and
/// takes precedence; the index is only consulted when no value was sent.
pub fn is_correct(question: &Question, answer_index: Option<usize>, answer_value: Option<&str>) -> bool {
    match answer_value {
        Some(value) => question
            .options
            .get(question.correct_answer_index)
            .is_some_and(|correct| correct == value),
        None => answer_index == Some(question.correct_answer_index),
    }
}

/// Mean response time in milliseconds, `None` when nothing was answered.
pub fn average_response_time(times: &[i64]) -> Option<f64> {
    if times.is_empty() {
        return None;
    }
    let total: i64 = times.iter().sum();
    Some(total as f64 / times.len() as f64)
}

/// Pick the session winner.
///
/// Highest score wins. Players tied on a positive top score are separated by
/// the lowest average response time; a player without answers counts as
/// infinitely slow and the earliest joined player keeps an exact tie. Nobody
/// wins when the top score is zero.
pub fn determine_winner(players: &[Player]) -> Option<&Player> {
    let max_score = players.iter().map(|player| player.score).max()?;
    if max_score == 0 {
        return None;
    }

    let mut winner: Option<(&Player, f64)> = None;
    for player in players.iter().filter(|player| player.score == max_score) {
        let average = average_response_time(&player.response_times).unwrap_or(f64::INFINITY);
        match winner {
            Some((_, best)) if average >= best => {}
            _ => winner = Some((player, average)),
        }
    }
    winner.map(|(player, _)| player)
}
