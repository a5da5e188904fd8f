//! Estadísticas de práctica calculadas bajo demanda a partir del registro
//! completo de sesiones.

use crate::config::RecognitionConfig;
use crate::session::PracticeSession;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Precisión a partir de la cual un símbolo se considera dominado
pub const MASTERY_THRESHOLD: f32 = 0.8;
/// Intentos mínimos de un símbolo dominado para la sugerencia avanzada
const ADVANCED_MIN_ATTEMPTS: u32 = 5;
const ADVANCED_MIN_SYMBOLS: usize = 5;
const MAX_WEAK: usize = 5;
const MAX_STALE_SUGGESTED: usize = 5;
const MAX_ADVANCED_SYMBOLS: usize = 8;

/// Palabra de ejemplo por letra (índice = letra - 'A')
pub const EXAMPLE_WORDS: [&str; 26] = [
    "CAT", "BOB", "CAR", "DOG", "EGG", "FAN", "GIG", "HAT", "ILL", "JAM", "KID", "LAB", "MAD",
    "NAN", "ODD", "PAD", "QUIT", "RAT", "SAD", "TAP", "UP", "VAN", "WAR", "BOX", "YES", "ZOO",
];

const ADVANCED_SENTENCES: [&str; 4] = [
    "HELLO WORLD",
    "PRACTICE MAKES PERFECT",
    "NEURAL HANDS ROCKS",
    "LEARN ASL TODAY",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolStats {
    pub symbol: char,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    /// Fracción en [0, 1]
    pub accuracy: f32,
    pub last_practiced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_sessions: usize,
    pub total_practice_seconds: u64,
    pub average_accuracy: f32,
    pub recent_accuracy: f32,
    pub symbols_mastered: usize,
    /// Suma de intentos de todos los símbolos
    pub total_symbols_practiced: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSuggestion {
    pub priority: Priority,
    pub symbols: Vec<char>,
    pub reason: String,
    pub suggested_sentences: Vec<String>,
}

pub struct AnalyticsAggregator<'a> {
    sessions: &'a [PracticeSession],
    now: DateTime<Utc>,
    recency_window_days: u32,
    min_attempts: u32,
}

impl<'a> AnalyticsAggregator<'a> {
    pub fn new(sessions: &'a [PracticeSession], now: DateTime<Utc>) -> Self {
        let defaults = RecognitionConfig::default();
        Self::with_params(
            sessions,
            now,
            defaults.recency_window_days,
            defaults.min_attempts_for_weakness,
        )
    }

    pub fn with_params(
        sessions: &'a [PracticeSession],
        now: DateTime<Utc>,
        recency_window_days: u32,
        min_attempts: u32,
    ) -> Self {
        Self {
            sessions,
            now,
            recency_window_days,
            min_attempts,
        }
    }

    pub fn from_config(
        sessions: &'a [PracticeSession],
        now: DateTime<Utc>,
        config: &RecognitionConfig,
    ) -> Self {
        Self::with_params(
            sessions,
            now,
            config.recency_window_days,
            config.min_attempts_for_weakness,
        )
    }

    /// Estadísticas por letra A-Z esperada. Espacios y otros símbolos no
    /// cuentan y una letra sin intentos no aparece.
    pub fn symbol_stats(&self) -> BTreeMap<char, SymbolStats> {
        let mut stats: BTreeMap<char, SymbolStats> = BTreeMap::new();

        for session in self.sessions {
            for entry in &session.progress {
                let symbol = entry.expected_symbol.to_ascii_uppercase();
                if !symbol.is_ascii_uppercase() {
                    continue;
                }

                let stat = stats.entry(symbol).or_insert(SymbolStats {
                    symbol,
                    total_attempts: 0,
                    correct_attempts: 0,
                    accuracy: 0.0,
                    last_practiced_at: session.started_at,
                });
                stat.total_attempts += 1;
                if entry.is_correct {
                    stat.correct_attempts += 1;
                }
                stat.last_practiced_at = stat.last_practiced_at.max(session.started_at);
            }
        }

        for stat in stats.values_mut() {
            stat.accuracy = stat.correct_attempts as f32 / stat.total_attempts as f32;
        }
        stats
    }

    /// Los 5 símbolos con menor precisión entre los que tienen al menos
    /// `min_attempts` intentos
    pub fn weak_symbols(&self, min_attempts: u32) -> Vec<char> {
        let mut candidates: Vec<SymbolStats> = self
            .symbol_stats()
            .into_values()
            .filter(|s| s.total_attempts >= min_attempts)
            .collect();
        // Orden estable: a igual precisión se mantiene el alfabético
        candidates.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
        candidates.into_iter().take(MAX_WEAK).map(|s| s.symbol).collect()
    }

    /// Letras A-Z sin práctica en los últimos `days` días (incluye las
    /// nunca practicadas)
    pub fn stale_symbols(&self, days: u32) -> Vec<char> {
        let cutoff = self.cutoff(days);
        let stats = self.symbol_stats();
        ('A'..='Z')
            .filter(|c| match stats.get(c) {
                Some(stat) => stat.last_practiced_at < cutoff,
                None => true,
            })
            .collect()
    }

    pub fn recent_sessions(&self, days: u32) -> Vec<&'a PracticeSession> {
        let cutoff = self.cutoff(days);
        self.sessions
            .iter()
            .filter(|s| s.started_at >= cutoff)
            .collect()
    }

    pub fn overall_stats(&self) -> OverallStats {
        if self.sessions.is_empty() {
            return OverallStats::default();
        }

        let recent = self.recent_sessions(self.recency_window_days);
        let stats = self.symbol_stats();

        OverallStats {
            total_sessions: self.sessions.len(),
            total_practice_seconds: self.sessions.iter().map(|s| s.duration_seconds).sum(),
            average_accuracy: mean(self.sessions.iter().map(|s| s.accuracy)),
            recent_accuracy: mean(recent.iter().map(|s| s.accuracy)),
            symbols_mastered: stats
                .values()
                .filter(|s| s.accuracy >= MASTERY_THRESHOLD)
                .count(),
            total_symbols_practiced: stats.values().map(|s| s.total_attempts).sum(),
        }
    }

    /// Precisión media por día (UTC) de las sesiones de los últimos `days`
    /// días, en orden cronológico
    pub fn accuracy_trend(&self, days: u32) -> Vec<(NaiveDate, f32)> {
        let mut buckets: BTreeMap<NaiveDate, Vec<f32>> = BTreeMap::new();
        for session in self.recent_sessions(days) {
            buckets
                .entry(session.started_at.date_naive())
                .or_default()
                .push(session.accuracy);
        }
        buckets
            .into_iter()
            .map(|(day, values)| (day, mean(values.into_iter())))
            .collect()
    }

    /// Hasta tres sugerencias priorizadas; nunca una con la lista vacía
    pub fn suggestions(&self) -> Vec<LessonSuggestion> {
        let mut suggestions = Vec::new();

        let weak = self.weak_symbols(self.min_attempts);
        if !weak.is_empty() {
            suggestions.push(LessonSuggestion {
                priority: Priority::High,
                suggested_sentences: drill_sentences(&weak),
                symbols: weak,
                reason: "These letters have low accuracy. Focus on improving them!".to_string(),
            });
        }

        let stale: Vec<char> = self
            .stale_symbols(self.recency_window_days)
            .into_iter()
            .take(MAX_STALE_SUGGESTED)
            .collect();
        if !stale.is_empty() {
            suggestions.push(LessonSuggestion {
                priority: Priority::Medium,
                suggested_sentences: drill_sentences(&stale),
                symbols: stale,
                reason: "Practice these letters to maintain your skills.".to_string(),
            });
        }

        let advanced: Vec<char> = self
            .symbol_stats()
            .into_values()
            .filter(|s| s.accuracy >= MASTERY_THRESHOLD && s.total_attempts >= ADVANCED_MIN_ATTEMPTS)
            .map(|s| s.symbol)
            .collect();
        if advanced.len() >= ADVANCED_MIN_SYMBOLS {
            suggestions.push(LessonSuggestion {
                priority: Priority::Low,
                symbols: advanced.into_iter().take(MAX_ADVANCED_SYMBOLS).collect(),
                reason: "Great job! Try more complex sentences.".to_string(),
                suggested_sentences: ADVANCED_SENTENCES.iter().map(|s| s.to_string()).collect(),
            });
        }

        suggestions
    }

    fn cutoff(&self, days: u32) -> DateTime<Utc> {
        self.now - Duration::days(days as i64)
    }
}

/// Palabra de ejemplo de una letra A-Z
pub fn example_word(symbol: char) -> Option<&'static str> {
    let upper = symbol.to_ascii_uppercase();
    if upper.is_ascii_uppercase() {
        Some(EXAMPLE_WORDS[(upper as u8 - b'A') as usize])
    } else {
        None
    }
}

/// Palabra de ejemplo de los 3 primeros símbolos + frase con los 6 primeros
fn drill_sentences(symbols: &[char]) -> Vec<String> {
    let mut sentences: Vec<String> = symbols
        .iter()
        .take(3)
        .filter_map(|&c| example_word(c))
        .map(str::to_string)
        .collect();

    let phrase: Vec<String> = symbols.iter().take(6).map(|c| c.to_string()).collect();
    sentences.push(phrase.join(" "));
    sentences.truncate(4);
    sentences
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f32, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
