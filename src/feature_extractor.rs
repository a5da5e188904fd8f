use crate::error::RecognitionError;
use crate::types::{FeatureVector, Handedness, Landmark, COORDS_PER_LANDMARK, FEATURE_LEN, NUM_LANDMARKS};

/// Convierte los 21 landmarks de un frame en el vector plano de 63 valores
/// que espera el clasificador.
///
/// No normaliza: los valores ya vienen normalizados al frame de video por
/// el detector. La coordenada z se copia tal cual.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extrae [x0, y0, z0, x1, y1, z1, ...]; con mano derecha x → 1 - x
    /// para llevar ambas manos a la orientación con la que se entrenó.
    pub fn extract(
        &self,
        landmarks: &[Landmark],
        handedness: Handedness,
    ) -> Result<FeatureVector, RecognitionError> {
        if landmarks.len() != NUM_LANDMARKS {
            return Err(RecognitionError::InputShape {
                expected: NUM_LANDMARKS,
                actual: landmarks.len(),
            });
        }

        let mut features = Vec::with_capacity(FEATURE_LEN);
        for lm in landmarks {
            features.push(lm.x);
            features.push(lm.y);
            features.push(lm.z);
        }
        if let Some(index) = features.iter().position(|v| !v.is_finite()) {
            return Err(RecognitionError::NonFinite {
                stage: "landmarks",
                index,
            });
        }

        // Espejar la mano derecha
        if handedness == Handedness::Right {
            for x in features.iter_mut().step_by(COORDS_PER_LANDMARK) {
                *x = 1.0 - *x;
            }
        }

        debug_assert_eq!(features.len(), FEATURE_LEN);
        Ok(features)
    }
}
