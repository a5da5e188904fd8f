use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Constantes del sistema
pub const NUM_LANDMARKS: usize = 21;
pub const COORDS_PER_LANDMARK: usize = 3; // x, y, z
pub const FEATURE_LEN: usize = NUM_LANDMARKS * COORDS_PER_LANDMARK; // 63
pub const HIDDEN_1: usize = 128;
pub const HIDDEN_2: usize = 64;
pub const NUM_CLASSES: usize = 28; // A-Z + del + nothing

/// Tabla fija de clases del clasificador, en el orden de salida del modelo
pub const CLASS_LABELS: [&str; NUM_CLASSES] = [
    "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
    "S", "T", "U", "V", "W", "X", "Y", "Z", "del", "nothing",
];

/// Vector de características: 21 landmarks × (x, y, z) intercalados
pub type FeatureVector = Vec<f32>;

/// Un punto de la mano normalizado al frame de video
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Left" | "left" => Some(Self::Left),
            "Right" | "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// Frame de una sola mano tal como lo entrega el detector de landmarks externo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandFrame {
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
}

/// Etiqueta de salida del clasificador (índice en `CLASS_LABELS`).
///
/// El campo es privado: sólo se construyen etiquetas válidas.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassLabel(u8);

impl ClassLabel {
    pub const DEL: ClassLabel = ClassLabel(26);
    pub const NOTHING: ClassLabel = ClassLabel(27);

    pub fn from_index(idx: usize) -> Option<Self> {
        if idx < NUM_CLASSES {
            Some(Self(idx as u8))
        } else {
            None
        }
    }

    /// Etiqueta para una letra A-Z (acepta minúsculas)
    pub fn letter(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        if upper.is_ascii_uppercase() {
            Some(Self(upper as u8 - b'A'))
        } else {
            None
        }
    }

    /// Interpreta una etiqueta textual sin distinguir mayúsculas
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        CLASS_LABELS
            .iter()
            .position(|label| label.eq_ignore_ascii_case(s))
            .and_then(Self::from_index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn as_str(&self) -> &'static str {
        CLASS_LABELS[self.index()]
    }

    pub fn as_letter(&self) -> Option<char> {
        if self.0 < 26 {
            Some((b'A' + self.0) as char)
        } else {
            None
        }
    }

    pub fn is_nothing(&self) -> bool {
        *self == Self::NOTHING
    }

    pub fn is_del(&self) -> bool {
        *self == Self::DEL
    }
}

impl fmt::Debug for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassLabel({})", self.as_str())
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comandos de la capa de práctica. Se mantienen separados de las clases
/// del clasificador: `Delete` lo produce la clase `del`, `Space` llega
/// desde un control de la interfaz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    Space,
    Delete,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Space => "SPACE",
            Self::Delete => "DEL",
        }
    }
}

/// Resultado de una inferencia
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: ClassLabel,
    pub confidence: f32,
    /// Probabilidades por clase, en el orden de `CLASS_LABELS`
    pub distribution: Vec<f32>,
}

impl PredictionResult {
    /// Las `k` clases más probables, de mayor a menor
    pub fn top_k(&self, k: usize) -> Vec<(ClassLabel, f32)> {
        let mut scores: Vec<(ClassLabel, f32)> = self
            .distribution
            .iter()
            .enumerate()
            .filter_map(|(idx, &p)| ClassLabel::from_index(idx).map(|label| (label, p)))
            .collect();
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        scores.truncate(k);
        scores
    }
}

/// Predicción filtrada y deduplicada que llega a la lógica de confirmación
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionEvent {
    pub label: ClassLabel,
    pub confidence: f32,
    pub at: Instant,
}
