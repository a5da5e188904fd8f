//! Sesión de práctica activa: transcripción letra a letra contra una frase
//! objetivo, precisión y duración.

use crate::commit_state::Committed;
use crate::types::Command;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Un elemento de la transcripción de la sesión
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LetterProgressEntry {
    pub expected_symbol: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempted_symbol: Option<char>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub target_sequence: String,
    pub progress: Vec<LetterProgressEntry>,
    /// Fracción de aciertos en [0, 1]
    pub accuracy: f32,
    pub duration_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PracticeSession {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// Aciertos / total; 0 si no hay intentos
pub fn calculate_accuracy(progress: &[LetterProgressEntry]) -> f32 {
    if progress.is_empty() {
        return 0.0;
    }
    let correct = progress.iter().filter(|p| p.is_correct).count();
    correct as f32 / progress.len() as f32
}

/// Acumula las confirmaciones de la sesión activa
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    session: PracticeSession,
    target: Vec<char>,
}

impl SessionRecorder {
    pub fn start(target_sequence: &str, now: DateTime<Utc>) -> Self {
        // Sólo se pueden firmar A-Z; el espacio llega como comando
        let target_sequence: String = target_sequence
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_uppercase() || *c == ' ')
            .collect::<String>()
            .trim()
            .to_string();
        Self {
            target: target_sequence.chars().collect(),
            session: PracticeSession {
                id: format!("session_{}", now.timestamp_millis()),
                started_at: now,
                target_sequence,
                progress: Vec::new(),
                accuracy: 0.0,
                duration_seconds: 0,
                completed_at: None,
            },
        }
    }

    /// Siguiente símbolo esperado, `None` si la frase está completa
    pub fn next_target(&self) -> Option<char> {
        self.target.get(self.session.progress.len()).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.session.progress.len() >= self.target.len()
    }

    pub fn progress(&self) -> &[LetterProgressEntry] {
        &self.session.progress
    }

    pub fn target_sequence(&self) -> &str {
        &self.session.target_sequence
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn accuracy(&self) -> f32 {
        calculate_accuracy(&self.session.progress)
    }

    /// Añade una entrada. Devuelve `false` si la frase ya está completa.
    pub fn append(&mut self, entry: LetterProgressEntry, now: DateTime<Utc>) -> bool {
        if self.is_complete() {
            return false;
        }
        self.session.progress.push(entry);
        self.session.accuracy = self.accuracy();

        if self.is_complete() {
            self.session.completed_at = Some(now);
            self.session.duration_seconds = self.elapsed_seconds(now);
        }
        true
    }

    /// Traduce una confirmación a una entrada de progreso contra el objetivo
    /// actual. `Delete` borra la última entrada.
    pub fn record_commit(
        &mut self,
        committed: Committed,
        now: DateTime<Utc>,
    ) -> Option<LetterProgressEntry> {
        if let Committed::Command(Command::Delete) = committed {
            self.delete_last();
            return None;
        }

        let expected = self.next_target()?;
        let attempted = match committed {
            Committed::Letter(c) => c.to_ascii_uppercase(),
            Committed::Command(_) => ' ',
        };

        // Un espacio en la frase se da por bueno con cualquier confirmación
        let entry = if expected == ' ' {
            LetterProgressEntry {
                expected_symbol: ' ',
                attempted_symbol: None,
                is_correct: true,
            }
        } else {
            LetterProgressEntry {
                expected_symbol: expected,
                attempted_symbol: Some(attempted),
                is_correct: attempted.eq_ignore_ascii_case(&expected),
            }
        };

        if self.append(entry.clone(), now) {
            Some(entry)
        } else {
            None
        }
    }

    pub fn delete_last(&mut self) -> Option<LetterProgressEntry> {
        let removed = self.session.progress.pop();
        if removed.is_some() {
            self.session.completed_at = None;
            self.session.accuracy = self.accuracy();
        }
        removed
    }

    /// Vuelve a empezar la misma frase
    pub fn reset(&mut self) {
        self.session.progress.clear();
        self.session.accuracy = 0.0;
        self.session.completed_at = None;
    }

    /// Copia de la sesión con duración y precisión al instante `now`
    pub fn snapshot(&self, now: DateTime<Utc>) -> PracticeSession {
        let mut session = self.session.clone();
        session.accuracy = self.accuracy();
        if session.completed_at.is_none() {
            session.duration_seconds = self.elapsed_seconds(now);
        }
        session
    }

    fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.session.started_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_cat_scenario() {
        let mut recorder = SessionRecorder::start("CAT", t0());
        recorder.record_commit(Committed::Letter('C'), t0() + Duration::seconds(4));
        let wrong = recorder
            .record_commit(Committed::Letter('E'), t0() + Duration::seconds(9))
            .unwrap();
        assert_eq!(wrong.expected_symbol, 'A');
        assert_eq!(wrong.attempted_symbol, Some('E'));
        assert!(!wrong.is_correct);

        recorder.record_commit(Committed::Letter('T'), t0() + Duration::seconds(15));

        let session = recorder.snapshot(t0() + Duration::seconds(60));
        assert!(session.is_complete());
        assert!((session.accuracy - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(session.duration_seconds, 15);
        assert_eq!(session.id, format!("session_{}", t0().timestamp_millis()));
    }

    #[test]
    fn test_progress_never_exceeds_target() {
        let mut recorder = SessionRecorder::start("AB", t0());
        for _ in 0..5 {
            recorder.record_commit(Committed::Letter('A'), t0());
        }
        assert_eq!(recorder.progress().len(), 2);
        assert!(recorder.next_target().is_none());
    }

    #[test]
    fn test_space_in_target_is_auto_correct() {
        let mut recorder = SessionRecorder::start("I LOVE", t0());
        recorder.record_commit(Committed::Letter('I'), t0());
        let space = recorder.record_commit(Committed::Letter('L'), t0()).unwrap();
        assert_eq!(space.expected_symbol, ' ');
        assert!(space.is_correct);

        let via_command = SessionRecorder::start("A B", t0())
            .record_commit(Committed::Command(Command::Space), t0())
            .unwrap();
        assert!(!via_command.is_correct);
    }

    #[test]
    fn test_unsignable_target_chars_dropped() {
        let mut recorder = SessionRecorder::start(" hi! ", t0());
        assert_eq!(recorder.target_sequence(), "HI");

        recorder.record_commit(Committed::Letter('H'), t0());
        recorder.record_commit(Committed::Letter('I'), t0());
        assert!(recorder.is_complete());
        assert_eq!(recorder.accuracy(), 1.0);

        let recorder = SessionRecorder::start("ASL, 2 FUN.", t0());
        assert_eq!(recorder.target_sequence(), "ASL  FUN");
    }

    #[test]
    fn test_delete_reopens_completed_session() {
        let mut recorder = SessionRecorder::start("GO", t0());
        recorder.record_commit(Committed::Letter('G'), t0());
        recorder.record_commit(Committed::Letter('X'), t0());
        assert!(recorder.is_complete());

        recorder.record_commit(Committed::Command(Command::Delete), t0());
        assert!(!recorder.is_complete());
        assert_eq!(recorder.next_target(), Some('O'));
        assert!(recorder.snapshot(t0()).completed_at.is_none());
        assert_eq!(recorder.accuracy(), 1.0);
    }

    #[test]
    fn test_serialized_schema() {
        let mut recorder = SessionRecorder::start("hi", t0());
        recorder.record_commit(Committed::Letter('H'), t0());
        let json = serde_json::to_value(recorder.snapshot(t0())).unwrap();

        assert_eq!(json["targetSequence"], "HI");
        assert_eq!(json["progress"][0]["expectedSymbol"], "H");
        assert_eq!(json["progress"][0]["isCorrect"], true);
        assert!(json.get("completedAt").is_none());
    }
}
