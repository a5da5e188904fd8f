use thiserror::Error;

/// Errores del reconocimiento en dispositivo (extracción + inferencia)
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// Número de landmarks o longitud del vector incorrectos.
    /// Sólo afecta a ese frame: quien llama lo descarta y sigue.
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InputShape { expected: usize, actual: usize },

    /// `predict` antes de una carga exitosa; reintentar más tarde
    #[error("Non-finite value in {stage} at index {index}")]
    NonFinite { stage: &'static str, index: usize },

    #[error("Model parameters not loaded")]
    NotLoaded,

    /// Artefacto de parámetros malformado o con dimensiones inconsistentes
    #[error("Model load error: {0}")]
    ModelLoad(String),
}

/// Errores de escritura/lectura del registro de sesiones
#[derive(Error, Debug)]
pub enum SessionLogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
