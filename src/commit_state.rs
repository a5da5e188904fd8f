//! Lógica "mantener para confirmar".
//!
//! La transición es una función pura `step(estado, entrada, ahora)`; el
//! reloj (tick a ~20 Hz) y la cola de eventos la alimentan desde fuera.
//! `CommitStateMachine` sólo guarda el estado actual y notifica las
//! confirmaciones.

use crate::config::RecognitionConfig;
use crate::types::{ClassLabel, Command, RecognitionEvent};
use std::time::{Duration, Instant};
use tracing::debug;

/// Estados de la máquina de confirmación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// Sin candidato
    Idle,
    /// Acumulando tiempo sobre un candidato estable
    Holding { candidate: char, since: Instant },
    /// Periodo refractario tras una confirmación
    Cooldown { until: Instant },
}

/// Entradas de la función de transición
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitInput {
    Recognition(ClassLabel),
    Command(Command),
    Tick,
}

/// Símbolo confirmado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Committed {
    Letter(char),
    Command(Command),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTiming {
    pub hold: Duration,
    pub cooldown: Duration,
}

impl CommitTiming {
    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self {
            hold: config.hold_time(),
            cooldown: config.commit_cooldown(),
        }
    }
}

/// Función de transición: `(estado, entrada, ahora) → (estado, confirmación)`
pub fn step(
    state: CommitState,
    input: CommitInput,
    now: Instant,
    timing: &CommitTiming,
) -> (CommitState, Option<Committed>) {
    let cooldown_from_now = CommitState::Cooldown {
        until: now + timing.cooldown,
    };

    // Un cooldown vencido equivale a Idle aunque el tick aún no haya llegado
    let state = match state {
        CommitState::Cooldown { until } if now >= until => CommitState::Idle,
        other => other,
    };

    match input {
        // Los comandos confirman al instante desde cualquier estado
        CommitInput::Command(cmd) => (cooldown_from_now, Some(Committed::Command(cmd))),
        CommitInput::Recognition(label) if label.is_del() => {
            (cooldown_from_now, Some(Committed::Command(Command::Delete)))
        }

        CommitInput::Recognition(label) => match state {
            CommitState::Cooldown { .. } => (state, None),
            _ if label.is_nothing() => (CommitState::Idle, None),
            CommitState::Holding { candidate, .. } if label.as_letter() == Some(candidate) => {
                (state, None)
            }
            // Cambiar de candidato reinicia el temporizador
            _ => match label.as_letter() {
                Some(candidate) => (
                    CommitState::Holding {
                        candidate,
                        since: now,
                    },
                    None,
                ),
                None => (state, None),
            },
        },

        CommitInput::Tick => match state {
            CommitState::Holding { candidate, since }
                if now.saturating_duration_since(since) >= timing.hold =>
            {
                (cooldown_from_now, Some(Committed::Letter(candidate)))
            }
            other => (other, None),
        },
    }
}

/// Estado observable para la interfaz (barra de progreso)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldStatus {
    pub candidate: Option<char>,
    pub hold_started_at: Option<Instant>,
    /// min(1, transcurrido / umbral) mientras hay candidato, si no 0
    pub hold_fraction: f32,
    pub cooldown_active: bool,
    /// Tiempo que falta para confirmar el candidato actual
    pub remaining: Duration,
}

pub struct CommitStateMachine {
    state: CommitState,
    timing: CommitTiming,

    /// Callback que se ejecuta por cada confirmación
    callback: Option<Box<dyn FnMut(Committed) + Send>>,
}

impl CommitStateMachine {
    pub fn new(timing: CommitTiming) -> Self {
        Self {
            state: CommitState::Idle,
            timing,
            callback: None,
        }
    }

    pub fn from_config(config: &RecognitionConfig) -> Self {
        Self::new(CommitTiming::from_config(config))
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Committed) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn on_event(&mut self, event: &RecognitionEvent) -> Option<Committed> {
        self.apply(CommitInput::Recognition(event.label), event.at)
    }

    pub fn command(&mut self, command: Command, now: Instant) -> Option<Committed> {
        self.apply(CommitInput::Command(command), now)
    }

    pub fn tick(&mut self, now: Instant) -> Option<Committed> {
        self.apply(CommitInput::Tick, now)
    }

    /// Descarta cualquier mantenimiento o cooldown en curso
    pub fn cancel(&mut self) {
        self.state = CommitState::Idle;
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn status(&self, now: Instant) -> HoldStatus {
        match self.state {
            CommitState::Holding { candidate, since } => {
                let elapsed = now.saturating_duration_since(since);
                let fraction = if self.timing.hold.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f32() / self.timing.hold.as_secs_f32()).min(1.0)
                };
                HoldStatus {
                    candidate: Some(candidate),
                    hold_started_at: Some(since),
                    hold_fraction: fraction,
                    cooldown_active: false,
                    remaining: self.timing.hold.saturating_sub(elapsed),
                }
            }
            CommitState::Cooldown { until } => HoldStatus {
                candidate: None,
                hold_started_at: None,
                hold_fraction: 0.0,
                cooldown_active: now < until,
                remaining: Duration::ZERO,
            },
            CommitState::Idle => HoldStatus {
                candidate: None,
                hold_started_at: None,
                hold_fraction: 0.0,
                cooldown_active: false,
                remaining: Duration::ZERO,
            },
        }
    }

    fn apply(&mut self, input: CommitInput, now: Instant) -> Option<Committed> {
        let (next, committed) = step(self.state, input, now, &self.timing);

        if next != self.state {
            debug!("[COMMIT] {:?} → {:?}", self.state, next);
        }
        self.state = next;

        if let Some(symbol) = committed {
            debug!("[COMMIT] Confirmado: {:?}", symbol);
            if let Some(ref mut callback) = self.callback {
                callback(symbol);
            }
        }
        committed
    }
}
