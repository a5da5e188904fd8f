use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parámetros ajustables del reconocimiento y de las estadísticas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Probabilidad mínima para considerar una predicción (default: 0.75)
    pub confidence_threshold: f32,
    /// Anti-rebote interno del filtro de predicciones (default: 100 ms)
    pub gate_cooldown_ms: u64,
    /// Periodo refractario tras confirmar un símbolo (default: 1500 ms)
    pub cooldown_ms: u64,
    /// Tiempo que hay que mantener un signo para confirmarlo (default: 3.0 s)
    pub hold_time_seconds: f32,
    /// Ventana de "práctica reciente" en días (default: 7)
    pub recency_window_days: u32,
    /// Intentos mínimos para considerar débil un símbolo (default: 3)
    pub min_attempts_for_weakness: u32,
    /// Máximo de sesiones guardadas en el registro (default: 100)
    pub session_log_cap: usize,
    /// Frecuencia del tick de la máquina de confirmación (default: 20 Hz)
    pub tick_hz: u32,
    /// Fichero del registro de sesiones (default: "sesiones.json")
    pub session_log_path: PathBuf,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            gate_cooldown_ms: 100,
            cooldown_ms: 1500,
            hold_time_seconds: 3.0,
            recency_window_days: 7,
            min_attempts_for_weakness: 3,
            session_log_cap: 100,
            tick_hz: 20,
            session_log_path: PathBuf::from("sesiones.json"),
        }
    }
}

impl RecognitionConfig {
    /// Lee la configuración desde un JSON; las claves ausentes toman el
    /// valor por defecto.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("No se pudo leer la configuración {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Configuración inválida en {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.confidence_threshold),
            "confidence_threshold fuera de [0, 1]: {}",
            self.confidence_threshold
        );
        ensure!(
            self.hold_time_seconds.is_finite() && self.hold_time_seconds > 0.0,
            "hold_time_seconds debe ser positivo: {}",
            self.hold_time_seconds
        );
        ensure!(self.tick_hz > 0, "tick_hz debe ser mayor que 0");
        ensure!(self.session_log_cap > 0, "session_log_cap debe ser mayor que 0");
        Ok(())
    }

    pub fn gate_cooldown(&self) -> Duration {
        Duration::from_millis(self.gate_cooldown_ms)
    }

    pub fn commit_cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn hold_time(&self) -> Duration {
        Duration::from_secs_f32(self.hold_time_seconds)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz as f64)
    }
}
