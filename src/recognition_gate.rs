use crate::config::RecognitionConfig;
use crate::types::{ClassLabel, PredictionResult, RecognitionEvent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Filtro del flujo de predicciones por frame.
///
/// Convierte ~30 predicciones/s en eventos sólo cuando cambia la etiqueta:
/// descarta las de baja confianza, las que llegan dentro del anti-rebote y
/// trata `nothing` como transitorio (reinicia la última etiqueta sin emitir).
pub struct RecognitionGate {
    confidence_threshold: f32,
    cooldown: Duration,
    last_label: Option<ClassLabel>,
    last_emit: Option<Instant>,

    /// Callback que se ejecuta por cada evento emitido
    callback: Option<Box<dyn FnMut(&RecognitionEvent) + Send>>,
}

impl RecognitionGate {
    pub fn new(confidence_threshold: f32, cooldown: Duration) -> Self {
        Self {
            confidence_threshold,
            cooldown,
            last_label: None,
            last_emit: None,
            callback: None,
        }
    }

    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self::new(config.confidence_threshold, config.gate_cooldown())
    }

    /// Establece el callback que recibe cada `RecognitionEvent` emitido
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&RecognitionEvent) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Procesa una predicción cruda. Devuelve el evento si pasa el filtro.
    pub fn ingest(&mut self, prediction: &PredictionResult, now: Instant) -> Option<RecognitionEvent> {
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < self.cooldown {
                return None;
            }
        }

        if prediction.confidence < self.confidence_threshold {
            return None;
        }

        if prediction.label.is_nothing() {
            self.last_label = None;
            return None;
        }

        if self.last_label == Some(prediction.label) {
            return None;
        }

        let event = RecognitionEvent {
            label: prediction.label,
            confidence: prediction.confidence,
            at: now,
        };
        self.last_label = Some(prediction.label);
        self.last_emit = Some(now);

        debug!(
            "[GATE] {} ({:.1}%)",
            prediction.label,
            prediction.confidence * 100.0
        );

        if let Some(ref mut callback) = self.callback {
            callback(&event);
        }

        Some(event)
    }

    /// Olvida la última etiqueta y el anti-rebote. Tras una confirmación
    /// permite volver a emitir el mismo símbolo.
    pub fn reset(&mut self) {
        self.last_label = None;
        self.last_emit = None;
    }

    /// Olvida sólo la última etiqueta: el signo actual se vuelve a emitir en
    /// cuanto pase el anti-rebote
    pub fn forget_last_label(&mut self) {
        self.last_label = None;
    }

    pub fn last_label(&self) -> Option<ClassLabel> {
        self.last_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NUM_CLASSES;

    fn prediction(label: &str, confidence: f32) -> PredictionResult {
        let label = ClassLabel::parse(label).unwrap();
        let mut distribution = vec![(1.0 - confidence) / (NUM_CLASSES - 1) as f32; NUM_CLASSES];
        distribution[label.index()] = confidence;
        PredictionResult {
            label,
            confidence,
            distribution,
        }
    }

    fn gate() -> RecognitionGate {
        RecognitionGate::new(0.75, Duration::from_millis(100))
    }

    #[test]
    fn test_low_confidence_dropped() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.ingest(&prediction("A", 0.5), t0).is_none());
        assert!(gate.ingest(&prediction("A", 0.9), t0).is_some());
    }

    #[test]
    fn test_only_label_changes_are_emitted() {
        let mut gate = gate();
        let t0 = Instant::now();
        let mut emitted = Vec::new();

        for (i, label) in ["A", "A", "A", "B", "B", "A"].iter().enumerate() {
            let now = t0 + Duration::from_millis(200 * i as u64);
            if let Some(ev) = gate.ingest(&prediction(label, 0.9), now) {
                emitted.push(ev.label.as_str());
            }
        }

        assert_eq!(emitted, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_cooldown_suppresses_fast_changes() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.ingest(&prediction("A", 0.9), t0).is_some());
        assert!(gate
            .ingest(&prediction("B", 0.9), t0 + Duration::from_millis(50))
            .is_none());
        assert!(gate
            .ingest(&prediction("B", 0.9), t0 + Duration::from_millis(120))
            .is_some());
    }

    #[test]
    fn test_nothing_resets_without_emitting() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.ingest(&prediction("A", 0.9), t0).is_some());

        let t1 = t0 + Duration::from_millis(200);
        assert!(gate.ingest(&prediction("nothing", 0.95), t1).is_none());
        assert_eq!(gate.last_label(), None);

        // El mismo signo vuelve a emitirse tras soltar la mano
        let t2 = t1 + Duration::from_millis(200);
        assert_eq!(
            gate.ingest(&prediction("A", 0.9), t2).map(|e| e.label.as_str()),
            Some("A")
        );
    }

    #[test]
    fn test_forget_last_label_keeps_debounce() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.ingest(&prediction("B", 0.9), t0).is_some());
        gate.forget_last_label();

        assert!(gate
            .ingest(&prediction("B", 0.9), t0 + Duration::from_millis(50))
            .is_none());
        assert!(gate
            .ingest(&prediction("B", 0.9), t0 + Duration::from_millis(150))
            .is_some());
    }

    #[test]
    fn test_callback_receives_events() {
        use std::sync::{Arc, Mutex};

        let mut gate = gate();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        gate.set_callback(move |ev| seen_clone.lock().unwrap().push(ev.label));

        let t0 = Instant::now();
        gate.ingest(&prediction("L", 0.8), t0);
        gate.ingest(&prediction("L", 0.8), t0 + Duration::from_millis(300));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
