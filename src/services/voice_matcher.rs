//! Best-effort mapping of a spoken or transcribed answer onto a question option.

const EXACT_CONFIDENCE: f64 = 1.0;
const CUE_CONFIDENCE: f64 = 0.9;
const POSITION_CONFIDENCE: f64 = 0.8;
const KEYWORD_CONFIDENCE_CAP: f64 = 0.7;
const SUGGESTION_PREVIEW_CHARS: usize = 30;

const LETTERS: [&str; 4] = ["A", "B", "C", "D"];

/// Letter, ordinal and numeral cues per option index.
const CUES: [&[&str]; 4] = [
    &["a", "primera", "uno", "1"],
    &["b", "segunda", "dos", "2"],
    &["c", "tercera", "tres", "3"],
    &["d", "cuarta", "cuatro", "4"],
];

const POSITION_WORDS: [&[&str]; 4] = [
    &["primero", "primer", "first"],
    &["segundo", "second"],
    &["tercero", "tercer", "third"],
    &["cuarto", "fourth"],
];

/// Outcome of matching free text against the option list.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceMatch {
    pub is_valid: bool,
    pub matched_option: Option<String>,
    pub answer_index: Option<usize>,
    pub confidence: f64,
}

impl VoiceMatch {
    fn hit(options: &[String], index: usize, confidence: f64) -> Self {
        Self {
            is_valid: true,
            matched_option: options.get(index).cloned(),
            answer_index: Some(index),
            confidence,
        }
    }

    fn miss() -> Self {
        Self {
            is_valid: false,
            matched_option: None,
            answer_index: None,
            confidence: 0.0,
        }
    }
}

/// Classify `response` against `options`.
///
/// Rules are tried in order: exact option text, letter or numeral cue,
/// position word, then keyword overlap. Cues are matched on whole words.
pub fn match_response(response: &str, options: &[String]) -> VoiceMatch {
    let normalized = normalize(response);
    if normalized.is_empty() || options.is_empty() {
        return VoiceMatch::miss();
    }

    if let Some(index) = options
        .iter()
        .position(|option| normalize(option) == normalized)
    {
        return VoiceMatch::hit(options, index, EXACT_CONFIDENCE);
    }

    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    if let Some(index) = find_cue(&tokens, &CUES, options.len()) {
        return VoiceMatch::hit(options, index, CUE_CONFIDENCE);
    }

    if let Some(index) = find_cue(&tokens, &POSITION_WORDS, options.len()) {
        return VoiceMatch::hit(options, index, POSITION_CONFIDENCE);
    }

    let mut best: Option<(usize, f64)> = None;
    for (index, option) in options.iter().enumerate() {
        let Some(score) = keyword_overlap(&tokens, option) else {
            continue;
        };
        if best.is_none_or(|(_, current)| score > current) {
            best = Some((index, score));
        }
    }

    match best {
        Some((index, score)) => VoiceMatch::hit(options, index, score.min(KEYWORD_CONFIDENCE_CAP)),
        None => VoiceMatch::miss(),
    }
}

/// Spoken hints offered when a response could not be matched.
pub fn suggestions(options: &[String]) -> Vec<String> {
    let mut hints: Vec<String> = options
        .iter()
        .zip(LETTERS)
        .map(|(option, letter)| {
            let preview: String = option.chars().take(SUGGESTION_PREVIEW_CHARS).collect();
            format!("Diga \"{letter}\" para {preview}...")
        })
        .collect();
    hints.push("Diga \"primera opción\", \"segunda opción\"...".to_owned());
    hints
}

fn find_cue(tokens: &[&str], table: &[&[&str]], option_count: usize) -> Option<usize> {
    table
        .iter()
        .take(option_count)
        .position(|cues| tokens.iter().any(|token| cues.contains(token)))
}

/// Ratio of significant option words heard, when enough of them were.
fn keyword_overlap(tokens: &[&str], option: &str) -> Option<f64> {
    let normalized = normalize(option);
    let words: Vec<&str> = normalized
        .split_whitespace()
        .filter(|word| word.chars().count() > 3)
        .collect();
    if words.is_empty() {
        return None;
    }

    let hits = words.iter().filter(|word| tokens.contains(word)).count();
    let required = if words.len() > 3 { 2 } else { 1 };
    let ratio = hits as f64 / words.len() as f64;
    (hits >= required && ratio >= 0.5).then_some(ratio)
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec![
            "París".into(),
            "Madrid".into(),
            "Lisboa".into(),
            "Roma".into(),
        ]
    }

    #[test]
    fn exact_match_ignores_case_and_punctuation() {
        let result = match_response("  madrid! ", &options());
        assert!(result.is_valid);
        assert_eq!(result.answer_index, Some(1));
        assert_eq!(result.matched_option.as_deref(), Some("Madrid"));
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn letter_and_numeral_cues() {
        let result = match_response("opción C", &options());
        assert_eq!(result.answer_index, Some(2));
        assert_eq!(result.confidence, 0.9);

        let result = match_response("la cuatro", &options());
        assert_eq!(result.answer_index, Some(3));

        let result = match_response("primera", &options());
        assert_eq!(result.answer_index, Some(0));
    }

    #[test]
    fn cues_match_whole_words_only() {
        // "cuadro" and "dosis" contain cue substrings but are not cues.
        let result = match_response("cuadro dosis", &options());
        assert!(!result.is_valid);
    }

    #[test]
    fn position_words() {
        let result = match_response("el segundo", &options());
        assert_eq!(result.answer_index, Some(1));
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn keyword_overlap_is_capped() {
        let options: Vec<String> = vec![
            "Teoría de la relatividad general".into(),
            "Mecánica cuántica moderna".into(),
            "Termodinámica clásica".into(),
            "Óptica geométrica".into(),
        ];
        let result = match_response("creo que es la relatividad general", &options);
        assert!(result.is_valid);
        assert_eq!(result.answer_index, Some(0));
        assert!(result.confidence <= 0.7);
    }

    #[test]
    fn long_options_need_two_keywords() {
        let options: Vec<String> = vec![
            "Gran muralla china antigua construida".into(),
            "x".into(),
            "y".into(),
            "z".into(),
        ];
        assert!(!match_response("muralla", &options).is_valid);
        assert!(match_response("muralla china antigua", &options).is_valid);
    }

    #[test]
    fn unmatched_response_gets_suggestions() {
        let result = match_response("no lo sé", &options());
        assert!(!result.is_valid);
        assert_eq!(result.confidence, 0.0);

        let hints = suggestions(&options());
        assert_eq!(hints.len(), 5);
        assert_eq!(hints[0], "Diga \"A\" para París...");
    }
}
