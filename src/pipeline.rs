//! Consumidor único del reconocimiento.
//!
//! La inferencia puede correr en un hilo aparte (`spawn_inference_worker`);
//! sus resultados llegan en orden por un canal y sólo este objeto muta el
//! filtro, la máquina de confirmación y la sesión activa.

use crate::analytics::AnalyticsAggregator;
use crate::commit_state::{CommitState, CommitStateMachine, Committed, HoldStatus};
use crate::config::RecognitionConfig;
use crate::error::RecognitionError;
use crate::feature_extractor::FeatureExtractor;
use crate::feedback::{self, Feedback, PRACTICE_SENTENCES};
use crate::recognition_gate::RecognitionGate;
use crate::session::{LetterProgressEntry, PracticeSession, SessionRecorder};
use crate::session_log::{SessionLog, SessionStorage};
use crate::sign_classifier::InferenceEngine;
use crate::types::{ClassLabel, Command, HandFrame, PredictionResult, RecognitionEvent};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Salida del hilo de inferencia, en el orden de los frames
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Prediction { at: Instant, result: PredictionResult },
    /// El detector no encontró ninguna mano
    NoHand { at: Instant },
}

/// Notificaciones hacia la interfaz
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Corrección en vivo para el signo reconocido
    Feedback { detected: ClassLabel, feedback: Feedback },
    /// Símbolo confirmado; `entry` es la entrada añadida a la sesión
    Committed {
        symbol: Committed,
        entry: Option<LetterProgressEntry>,
    },
    SessionCompleted(PracticeSession),
    RecognitionUnavailable(String),
}

#[derive(Debug, Clone)]
pub enum PracticeMode {
    /// Frase objetivo con sesión registrada
    Practice(SessionRecorder),
    /// Sin objetivo: las confirmaciones forman una transcripción libre
    FreeForm { transcript: String },
}

pub struct RecognitionPipeline<S: SessionStorage> {
    engine: Arc<InferenceEngine>,
    extractor: FeatureExtractor,
    gate: RecognitionGate,
    commit: CommitStateMachine,
    mode: PracticeMode,
    log: SessionLog<S>,
    config: RecognitionConfig,
    enabled: bool,
    available: bool,
    sentence_index: usize,
    // Última letra confirmada mientras la mano no se ha soltado
    held_commit: Option<char>,
    // Ancla monotónica ↔ reloj de pared para sellar las sesiones
    clock_anchor: (Instant, DateTime<Utc>),
}

impl<S: SessionStorage> RecognitionPipeline<S> {
    pub fn new(engine: Arc<InferenceEngine>, config: RecognitionConfig, log: SessionLog<S>) -> Self {
        Self::with_clock(engine, config, log, Instant::now(), Utc::now())
    }

    /// Igual que `new` pero con el ancla del reloj explícita
    pub fn with_clock(
        engine: Arc<InferenceEngine>,
        config: RecognitionConfig,
        log: SessionLog<S>,
        anchor: Instant,
        anchor_wall: DateTime<Utc>,
    ) -> Self {
        Self {
            engine,
            extractor: FeatureExtractor::new(),
            gate: RecognitionGate::from_config(&config),
            commit: CommitStateMachine::from_config(&config),
            mode: PracticeMode::FreeForm {
                transcript: String::new(),
            },
            log,
            config,
            enabled: true,
            available: true,
            sentence_index: 0,
            held_commit: None,
            clock_anchor: (anchor, anchor_wall),
        }
    }

    /// Frame del detector (o `None` sin mano) procesado en este mismo hilo
    pub fn on_frame(&mut self, frame: Option<&HandFrame>, now: Instant) -> Vec<PipelineEvent> {
        if !self.is_active() {
            return Vec::new();
        }
        let frame = match frame {
            Some(frame) => frame,
            None => return self.on_no_hand(now),
        };

        match infer(&self.engine, &self.extractor, frame) {
            Some(result) => self.on_prediction(&result, now),
            None => Vec::new(),
        }
    }

    pub fn on_inference(&mut self, output: InferenceOutput) -> Vec<PipelineEvent> {
        match output {
            InferenceOutput::Prediction { at, result } => self.on_prediction(&result, at),
            InferenceOutput::NoHand { at } => self.on_no_hand(at),
        }
    }

    pub fn on_prediction(&mut self, prediction: &PredictionResult, now: Instant) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        if !self.is_active() {
            return events;
        }

        // Un `nothing` seguro equivale a soltar la mano
        if prediction.label.is_nothing() && prediction.confidence >= self.config.confidence_threshold {
            self.held_commit = None;
        }

        if let Some(event) = self.gate.ingest(prediction, now) {
            if event.label.as_letter().is_some() {
                events.push(PipelineEvent::Feedback {
                    detected: event.label,
                    feedback: self.live_feedback(event.label),
                });
            }
            match self.commit.on_event(&event) {
                Some(committed) => self.handle_commit(committed, now, &mut events),
                None => self.retry_after_cooldown(&event),
            }
        }
        events
    }

    pub fn tick(&mut self, now: Instant) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        if !self.is_active() {
            return events;
        }
        if let Some(committed) = self.commit.tick(now) {
            self.handle_commit(committed, now, &mut events);
        }
        events
    }

    /// Comando de la interfaz (espacio / borrar)
    pub fn command(&mut self, command: Command, now: Instant) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        if !self.enabled {
            return events;
        }
        if let Some(committed) = self.commit.command(command, now) {
            self.handle_commit(committed, now, &mut events);
            // El signo que se estaba mostrando vuelve a competir tras el cooldown
            self.gate.forget_last_label();
        }
        events
    }

    /// Activa o desactiva el reconocimiento. Al desactivar se descarta el
    /// mantenimiento en curso y se guarda la sesión parcial.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if !enabled {
            self.commit.cancel();
            self.gate.reset();
            self.flush_session(now);
            info!("[PIPELINE] Reconocimiento desactivado");
        } else {
            info!("[PIPELINE] Reconocimiento activado");
        }
    }

    /// Empieza una sesión de práctica; la anterior, si quedó a medias, se guarda
    pub fn start_practice(&mut self, sentence: &str, now: Instant) {
        self.flush_session(now);
        self.commit.cancel();
        self.gate.reset();
        let recorder = SessionRecorder::start(sentence, self.wall_time(now));
        info!("[SESION] Nueva frase: \"{}\"", recorder.target_sequence());
        self.mode = PracticeMode::Practice(recorder);
    }

    /// Pasa a la siguiente frase de la lista (cíclica)
    pub fn next_sentence(&mut self, now: Instant) -> &'static str {
        self.sentence_index = (self.sentence_index + 1) % PRACTICE_SENTENCES.len();
        let sentence = PRACTICE_SENTENCES[self.sentence_index];
        self.start_practice(sentence, now);
        sentence
    }

    pub fn current_sentence(&self) -> &'static str {
        PRACTICE_SENTENCES[self.sentence_index]
    }

    pub fn start_free_form(&mut self, now: Instant) {
        self.flush_session(now);
        self.commit.cancel();
        self.gate.reset();
        self.mode = PracticeMode::FreeForm {
            transcript: String::new(),
        };
    }

    /// Reinicia la frase activa (o vacía la transcripción libre)
    pub fn reset_sentence(&mut self) {
        match &mut self.mode {
            PracticeMode::Practice(recorder) => recorder.reset(),
            PracticeMode::FreeForm { transcript } => transcript.clear(),
        }
    }

    /// Desactiva el reconocimiento en el dispositivo para el resto de la
    /// ejecución; la práctica manual y las estadísticas siguen disponibles.
    pub fn mark_unavailable(&mut self, reason: &str) -> PipelineEvent {
        warn!("[PIPELINE] Reconocimiento no disponible: {}", reason);
        self.available = false;
        self.commit.cancel();
        self.gate.reset();
        PipelineEvent::RecognitionUnavailable(reason.to_string())
    }

    pub fn status(&self, now: Instant) -> HoldStatus {
        self.commit.status(now)
    }

    pub fn mode(&self) -> &PracticeMode {
        &self.mode
    }

    pub fn transcript(&self) -> Option<&str> {
        match &self.mode {
            PracticeMode::FreeForm { transcript } => Some(transcript),
            PracticeMode::Practice(_) => None,
        }
    }

    pub fn session_log(&self) -> &SessionLog<S> {
        &self.log
    }

    pub fn session_log_mut(&mut self) -> &mut SessionLog<S> {
        &mut self.log
    }

    pub fn analytics(&self, now: Instant) -> AnalyticsAggregator<'_> {
        AnalyticsAggregator::from_config(self.log.sessions(), self.wall_time(now), &self.config)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn wall_time(&self, now: Instant) -> DateTime<Utc> {
        let (anchor, anchor_wall) = self.clock_anchor;
        let elapsed = chrono::Duration::from_std(now.saturating_duration_since(anchor))
            .unwrap_or_else(|_| chrono::Duration::zero());
        anchor_wall + elapsed
    }

    fn is_active(&self) -> bool {
        self.enabled && self.available
    }

    // Un signo distinto que llega durante el cooldown se vuelve a emitir hasta
    // que la máquina lo acepte; el recién confirmado no.
    fn retry_after_cooldown(&mut self, event: &RecognitionEvent) {
        let letter = match event.label.as_letter() {
            Some(letter) => letter,
            None => return,
        };
        if matches!(self.commit.state(), CommitState::Cooldown { .. })
            && self.held_commit != Some(letter)
        {
            debug!("[PIPELINE] {} llegó en cooldown, se reintentará", letter);
            self.gate.forget_last_label();
        }
    }

    // Sin mano: se suelta el candidato y el mismo signo puede volver a emitirse
    fn on_no_hand(&mut self, now: Instant) -> Vec<PipelineEvent> {
        self.gate.reset();
        self.held_commit = None;
        let released = RecognitionEvent {
            label: ClassLabel::NOTHING,
            confidence: 1.0,
            at: now,
        };
        let mut events = Vec::new();
        if let Some(committed) = self.commit.on_event(&released) {
            self.handle_commit(committed, now, &mut events);
        }
        events
    }

    fn live_feedback(&self, detected: ClassLabel) -> Feedback {
        match &self.mode {
            PracticeMode::Practice(recorder) => match recorder.next_target() {
                Some(expected) => feedback::feedback(detected.as_str(), &expected.to_string()),
                None => feedback::free_form_feedback(detected.as_str()),
            },
            PracticeMode::FreeForm { .. } => feedback::free_form_feedback(detected.as_str()),
        }
    }

    fn handle_commit(&mut self, committed: Committed, now: Instant, events: &mut Vec<PipelineEvent>) {
        // Tras una letra se puede firmar de nuevo el mismo símbolo; un `del`
        // mantenido no se repite hasta que cambie la etiqueta
        self.held_commit = match committed {
            Committed::Letter(c) => {
                self.gate.reset();
                Some(c)
            }
            Committed::Command(_) => None,
        };
        let wall = self.wall_time(now);

        match &mut self.mode {
            PracticeMode::Practice(recorder) => {
                let entry = recorder.record_commit(committed, wall);
                let completed = entry.is_some() && recorder.is_complete();
                events.push(PipelineEvent::Committed { symbol: committed, entry });

                if completed {
                    let session = recorder.snapshot(wall);
                    info!(
                        "[SESION] Completada \"{}\" ({:.0}%)",
                        session.target_sequence,
                        session.accuracy * 100.0
                    );
                    self.log.save(session.clone());
                    events.push(PipelineEvent::SessionCompleted(session));
                }
            }
            PracticeMode::FreeForm { transcript } => {
                match committed {
                    Committed::Letter(c) => transcript.push(c),
                    Committed::Command(Command::Space) => transcript.push(' '),
                    Committed::Command(Command::Delete) => {
                        transcript.pop();
                    }
                }
                events.push(PipelineEvent::Committed {
                    symbol: committed,
                    entry: None,
                });
            }
        }
    }

    /// Guarda la sesión activa si tiene progreso y no está completa
    fn flush_session(&mut self, now: Instant) {
        if let PracticeMode::Practice(recorder) = &self.mode {
            if !recorder.progress().is_empty() && !recorder.is_complete() {
                let session = recorder.snapshot(self.wall_time(now));
                debug!(
                    "[SESION] Guardando sesión parcial {} ({} símbolos)",
                    session.id,
                    session.progress.len()
                );
                self.log.save(session);
            }
        }
    }
}

/// Extracción + inferencia de un frame. Los frames con forma inválida o
/// con el motor aún sin cargar se saltan.
pub fn infer(
    engine: &InferenceEngine,
    extractor: &FeatureExtractor,
    frame: &HandFrame,
) -> Option<PredictionResult> {
    let features = match extractor.extract(&frame.landmarks, frame.handedness) {
        Ok(features) => features,
        Err(e) => {
            debug!("[PIPELINE] Frame descartado: {}", e);
            return None;
        }
    };

    match engine.predict(&features) {
        Ok(result) => Some(result),
        Err(RecognitionError::NotLoaded) => None,
        Err(e) => {
            debug!("[PIPELINE] Error de inferencia: {}", e);
            None
        }
    }
}

/// Lanza el hilo de inferencia: consume frames en orden y publica los
/// resultados por `results`. Termina al cerrarse cualquiera de los canales.
pub fn spawn_inference_worker(
    engine: Arc<InferenceEngine>,
    frames: Receiver<(Instant, Option<HandFrame>)>,
    results: Sender<InferenceOutput>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let extractor = FeatureExtractor::new();
        for (at, frame) in frames.iter() {
            let output = match frame {
                None => InferenceOutput::NoHand { at },
                Some(frame) => match infer(&engine, &extractor, &frame) {
                    Some(result) => InferenceOutput::Prediction { at, result },
                    None => continue,
                },
            };
            if results.send(output).is_err() {
                break;
            }
        }
        debug!("[PIPELINE] Hilo de inferencia terminado");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_log::MemoryStorage;
    use crate::types::NUM_CLASSES;
    use chrono::TimeZone;
    use std::time::Duration;

    fn config() -> RecognitionConfig {
        RecognitionConfig {
            hold_time_seconds: 2.5,
            cooldown_ms: 1000,
            ..Default::default()
        }
    }

    fn pipeline(t0: Instant) -> RecognitionPipeline<MemoryStorage> {
        let log = SessionLog::open(MemoryStorage::default(), 100);
        let wall = Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap();
        RecognitionPipeline::with_clock(Arc::new(InferenceEngine::new()), config(), log, t0, wall)
    }

    fn prediction(label: &str) -> PredictionResult {
        let label = ClassLabel::parse(label).unwrap();
        let mut distribution = vec![0.05 / (NUM_CLASSES - 1) as f32; NUM_CLASSES];
        distribution[label.index()] = 0.95;
        PredictionResult {
            label,
            confidence: 0.95,
            distribution,
        }
    }

    /// Mantiene `label` durante `secs` a 20 Hz y devuelve los eventos
    fn hold(
        pipeline: &mut RecognitionPipeline<MemoryStorage>,
        label: &str,
        from: Instant,
        secs: u64,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        for i in 0..(secs * 20) {
            let now = from + Duration::from_millis(50 * i);
            events.extend(pipeline.on_prediction(&prediction(label), now));
            events.extend(pipeline.tick(now));
        }
        events
    }

    fn commits(events: &[PipelineEvent]) -> Vec<Committed> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Committed { symbol, .. } => Some(*symbol),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_free_form_transcript() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);

        let events = hold(&mut pipeline, "H", t0, 3);
        assert_eq!(commits(&events), vec![Committed::Letter('H')]);
        assert!(matches!(events[0], PipelineEvent::Feedback { .. }));

        let t1 = t0 + Duration::from_secs(5);
        pipeline.command(Command::Space, t1);
        pipeline.on_prediction(&prediction("del"), t1 + Duration::from_secs(2));
        assert_eq!(pipeline.transcript(), Some("H"));
    }

    #[test]
    fn test_sign_changed_during_cooldown_commits_after_it() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);

        // A se confirma a los 2.5 s; B llega con el cooldown aún activo
        let mut events = hold(&mut pipeline, "A", t0, 3);
        events.extend(hold(&mut pipeline, "B", t0 + Duration::from_secs(3), 6));

        assert_eq!(
            commits(&events),
            vec![Committed::Letter('A'), Committed::Letter('B')]
        );
        assert_eq!(pipeline.transcript(), Some("AB"));
    }

    #[test]
    fn test_command_during_hold_lets_sign_commit_later() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);

        let mut events = hold(&mut pipeline, "A", t0, 1);
        let t1 = t0 + Duration::from_secs(1);
        events.extend(pipeline.command(Command::Space, t1));
        events.extend(hold(&mut pipeline, "A", t1, 4));

        assert_eq!(
            commits(&events),
            vec![Committed::Command(Command::Space), Committed::Letter('A')]
        );
        assert_eq!(pipeline.transcript(), Some(" A"));
    }

    #[test]
    fn test_held_del_sign_deletes_once() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        hold(&mut pipeline, "H", t0, 3);
        pipeline.on_no_hand(t0 + Duration::from_secs(3));
        hold(&mut pipeline, "I", t0 + Duration::from_secs(4), 3);
        assert_eq!(pipeline.transcript(), Some("HI"));

        let events = hold(&mut pipeline, "del", t0 + Duration::from_secs(8), 4);
        assert_eq!(commits(&events), vec![Committed::Command(Command::Delete)]);
        assert_eq!(pipeline.transcript(), Some("H"));
    }

    #[test]
    fn test_practice_session_completes_and_is_logged() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        pipeline.start_practice("ab", t0);

        let mut events = hold(&mut pipeline, "A", t0, 3);
        events.extend(pipeline.on_no_hand(t0 + Duration::from_secs(3)));
        events.extend(hold(&mut pipeline, "B", t0 + Duration::from_secs(5), 3));

        assert_eq!(
            commits(&events),
            vec![Committed::Letter('A'), Committed::Letter('B')]
        );
        let completed: Vec<&PracticeSession> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::SessionCompleted(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].accuracy, 1.0);
        assert_eq!(pipeline.session_log().len(), 1);
    }

    #[test]
    fn test_practice_feedback_compares_with_next_target() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        pipeline.start_practice("CAT", t0);

        let events = pipeline.on_prediction(&prediction("E"), t0);
        match &events[0] {
            PipelineEvent::Feedback { feedback, .. } => {
                assert!(!feedback.is_correct);
                assert_eq!(feedback.message, "Curve hand like C.");
            }
            other => panic!("evento inesperado: {:?}", other),
        }
    }

    #[test]
    fn test_disable_discards_hold_and_flushes_partial() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        pipeline.start_practice("GO", t0);
        hold(&mut pipeline, "G", t0, 3);

        let t1 = t0 + Duration::from_secs(5);
        pipeline.on_prediction(&prediction("O"), t1);
        assert!(pipeline.status(t1).candidate.is_some());

        pipeline.set_enabled(false, t1 + Duration::from_secs(1));
        assert_eq!(pipeline.status(t1).candidate, None);
        assert!(pipeline.tick(t1 + Duration::from_secs(10)).is_empty());

        let saved = &pipeline.session_log().sessions()[0];
        assert_eq!(saved.progress.len(), 1);
        assert!(saved.completed_at.is_none());
        assert_eq!(saved.duration_seconds, 6);
    }

    #[test]
    fn test_unavailable_ignores_frames() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        let event = pipeline.mark_unavailable("pesos corruptos");
        assert!(matches!(event, PipelineEvent::RecognitionUnavailable(_)));
        assert!(hold(&mut pipeline, "A", t0, 4).is_empty());

        // La práctica manual sigue funcionando
        let events = pipeline.command(Command::Space, t0);
        assert_eq!(commits(&events), vec![Committed::Command(Command::Space)]);
    }

    #[test]
    fn test_unloaded_engine_skips_frames() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        let frame = HandFrame {
            landmarks: vec![Default::default(); 21],
            handedness: crate::types::Handedness::Left,
        };
        assert!(pipeline.on_frame(Some(&frame), t0).is_empty());
        assert!(pipeline.is_available());
    }

    #[test]
    fn test_next_sentence_cycles() {
        let t0 = Instant::now();
        let mut pipeline = pipeline(t0);
        for _ in 0..PRACTICE_SENTENCES.len() {
            pipeline.next_sentence(t0);
        }
        assert_eq!(pipeline.current_sentence(), PRACTICE_SENTENCES[0]);
        assert!(matches!(pipeline.mode(), PracticeMode::Practice(_)));
    }
}
