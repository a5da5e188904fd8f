use crate::error::RecognitionError;
use crate::types::{ClassLabel, FeatureVector, PredictionResult, FEATURE_LEN, HIDDEN_1, HIDDEN_2, NUM_CLASSES};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Capa tal como aparece en el JSON exportado (kernel [entrada][salida])
#[derive(Debug, Deserialize)]
struct LayerJson {
    kernel: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct WeightsJson {
    dense: LayerJson,
    dense_1: LayerJson,
    dense_2: LayerJson,
}

/// Capa densa validada. El kernel se guarda aplanado fila-mayor:
/// `kernel[i * outputs + o]`.
#[derive(Debug, Clone)]
struct DenseLayer {
    inputs: usize,
    outputs: usize,
    kernel: Vec<f32>,
    bias: Vec<f32>,
}

impl DenseLayer {
    fn from_json(
        name: &str,
        layer: LayerJson,
        inputs: usize,
        outputs: usize,
    ) -> Result<Self, RecognitionError> {
        if layer.bias.len() != outputs {
            return Err(RecognitionError::ModelLoad(format!(
                "{}: bias de {} valores, se esperaban {}",
                name,
                layer.bias.len(),
                outputs
            )));
        }
        if layer.kernel.len() != inputs {
            return Err(RecognitionError::ModelLoad(format!(
                "{}: kernel con {} filas, se esperaban {}",
                name,
                layer.kernel.len(),
                inputs
            )));
        }

        let mut kernel = Vec::with_capacity(inputs * outputs);
        for (row_idx, row) in layer.kernel.into_iter().enumerate() {
            if row.len() != outputs {
                return Err(RecognitionError::ModelLoad(format!(
                    "{}: fila {} del kernel con {} columnas, se esperaban {}",
                    name,
                    row_idx,
                    row.len(),
                    outputs
                )));
            }
            kernel.extend(row);
        }

        if kernel.iter().chain(&layer.bias).any(|w| !w.is_finite()) {
            return Err(RecognitionError::ModelLoad(format!(
                "{}: pesos no finitos",
                name
            )));
        }

        Ok(Self {
            inputs,
            outputs,
            kernel,
            bias: layer.bias,
        })
    }

    /// output = input · kernel + bias
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut output = self.bias.clone();
        for (i, &x) in input.iter().enumerate().take(self.inputs) {
            if x == 0.0 {
                continue;
            }
            let row = &self.kernel[i * self.outputs..(i + 1) * self.outputs];
            for (out, &w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
        output
    }
}

/// Pesos del MLP 63 → 128 → 64 → 28, inmutables una vez validados
#[derive(Debug, Clone)]
pub struct ModelParameters {
    layers: [DenseLayer; 3],
}

impl ModelParameters {
    /// Valida y construye los parámetros desde el documento JSON
    /// con las capas "dense", "dense_1" y "dense_2".
    pub fn from_json(blob: &str) -> Result<Self, RecognitionError> {
        let raw: WeightsJson = serde_json::from_str(blob)
            .map_err(|e| RecognitionError::ModelLoad(format!("JSON inválido: {}", e)))?;

        Ok(Self {
            layers: [
                DenseLayer::from_json("dense", raw.dense, FEATURE_LEN, HIDDEN_1)?,
                DenseLayer::from_json("dense_1", raw.dense_1, HIDDEN_1, HIDDEN_2)?,
                DenseLayer::from_json("dense_2", raw.dense_2, HIDDEN_2, NUM_CLASSES)?,
            ],
        })
    }

    pub fn num_classes(&self) -> usize {
        self.layers[2].outputs
    }
}

/// Motor de inferencia. Se construye una vez y se comparte por referencia
/// (`&InferenceEngine` o `Arc<InferenceEngine>`); tras la carga sólo se lee,
/// así que `predict` puede llamarse en paralelo sin sincronización.
#[derive(Debug, Default)]
pub struct InferenceEngine {
    params: OnceLock<ModelParameters>,
}

impl InferenceEngine {
    pub fn new() -> Self {
        Self {
            params: OnceLock::new(),
        }
    }

    /// Motor ya cargado con un conjunto de parámetros concreto
    pub fn with_parameters(params: ModelParameters) -> Self {
        let engine = Self::new();
        let _ = engine.params.set(params);
        engine
    }

    /// Carga los parámetros desde el JSON. Si ya hay parámetros cargados
    /// no hace nada.
    pub fn load(&self, blob: &str) -> Result<(), RecognitionError> {
        if self.is_loaded() {
            debug!("[MLP] Parámetros ya cargados, se ignora la recarga");
            return Ok(());
        }

        let params = ModelParameters::from_json(blob)?;
        if self.params.set(params).is_ok() {
            info!(
                "[MLP] Modelo cargado: {} → {} → {} → {}",
                FEATURE_LEN, HIDDEN_1, HIDDEN_2, NUM_CLASSES
            );
        }
        Ok(())
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<(), RecognitionError> {
        let path = path.as_ref();
        if self.is_loaded() {
            return Ok(());
        }
        let blob = fs::read_to_string(path).map_err(|e| {
            RecognitionError::ModelLoad(format!("No se pudo leer {:?}: {}", path, e))
        })?;
        self.load(&blob)
    }

    pub fn is_loaded(&self) -> bool {
        self.params.get().is_some()
    }

    /// Clasifica un vector de 63 características
    pub fn predict(&self, features: &[f32]) -> Result<PredictionResult, RecognitionError> {
        let params = self.params.get().ok_or(RecognitionError::NotLoaded)?;

        if features.len() != FEATURE_LEN {
            return Err(RecognitionError::InputShape {
                expected: FEATURE_LEN,
                actual: features.len(),
            });
        }

        check_finite("features", features)?;

        let [dense, dense_1, dense_2] = &params.layers;

        // Dense(128) + ReLU
        let mut hidden = dense.forward(features);
        relu(&mut hidden);

        // Dense(64) + ReLU
        let mut hidden = dense_1.forward(&hidden);
        relu(&mut hidden);

        // Dense(28) + Softmax
        let logits = dense_2.forward(&hidden);
        // Entradas enormes pueden desbordar las capas a ±inf
        check_finite("logits", &logits)?;
        let distribution = softmax(&logits);

        let (class_idx, &confidence) = distribution
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .ok_or(RecognitionError::InputShape {
                expected: NUM_CLASSES,
                actual: 0,
            })?;

        let label = ClassLabel::from_index(class_idx).ok_or(RecognitionError::InputShape {
            expected: NUM_CLASSES,
            actual: class_idx + 1,
        })?;

        Ok(PredictionResult {
            label,
            confidence,
            distribution,
        })
    }

    /// Clasifica varios frames en paralelo, conservando el orden de entrada
    pub fn predict_batch(
        &self,
        batch: &[FeatureVector],
    ) -> Vec<Result<PredictionResult, RecognitionError>> {
        batch.par_iter().map(|features| self.predict(features)).collect()
    }
}

fn relu(values: &mut [f32]) {
    for v in values.iter_mut() {
        *v = v.max(0.0);
    }
}

/// Softmax con resta del máximo. Se acumula en f64 para que la suma quede
/// a menos de 1e-6 de 1.
fn check_finite(stage: &'static str, values: &[f32]) -> Result<(), RecognitionError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(RecognitionError::NonFinite { stage, index }),
        None => Ok(()),
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b)) as f64;
    let exp: Vec<f64> = logits.iter().map(|&x| (x as f64 - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|&e| (e / sum) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    /// Pesos sintéticos: las 28 primeras características pasan tal cual por
    /// las capas ocultas y el logit de la clase `c` es `gain * features[c]`.
    fn identity_weights_json(gain: f32) -> String {
        let kernel = |inputs: usize, outputs: usize, diag: f32| -> Vec<Vec<f32>> {
            (0..inputs)
                .map(|i| (0..outputs).map(|o| if i == o { diag } else { 0.0 }).collect())
                .collect()
        };
        json!({
            "dense": { "kernel": kernel(FEATURE_LEN, HIDDEN_1, 1.0), "bias": vec![0.0; HIDDEN_1] },
            "dense_1": { "kernel": kernel(HIDDEN_1, HIDDEN_2, 1.0), "bias": vec![0.0; HIDDEN_2] },
            "dense_2": { "kernel": kernel(HIDDEN_2, NUM_CLASSES, gain), "bias": vec![0.0; NUM_CLASSES] },
        })
        .to_string()
    }

    fn random_weights_json(seed: u64) -> String {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut kernel = |inputs: usize, outputs: usize| -> Vec<Vec<f32>> {
            (0..inputs)
                .map(|_| (0..outputs).map(|_| rng.gen_range(-0.5..0.5)).collect())
                .collect()
        };
        let k1 = kernel(FEATURE_LEN, HIDDEN_1);
        let k2 = kernel(HIDDEN_1, HIDDEN_2);
        let k3 = kernel(HIDDEN_2, NUM_CLASSES);
        json!({
            "dense": { "kernel": k1, "bias": vec![0.01; HIDDEN_1] },
            "dense_1": { "kernel": k2, "bias": vec![0.01; HIDDEN_2] },
            "dense_2": { "kernel": k3, "bias": vec![0.0; NUM_CLASSES] },
        })
        .to_string()
    }

    #[test]
    fn test_predict_before_load() {
        let engine = InferenceEngine::new();
        assert!(matches!(
            engine.predict(&[0.0; FEATURE_LEN]),
            Err(RecognitionError::NotLoaded)
        ));
    }

    #[test]
    fn test_wrong_feature_length() {
        let engine = InferenceEngine::new();
        engine.load(&identity_weights_json(10.0)).unwrap();
        assert!(matches!(
            engine.predict(&[0.0; 62]),
            Err(RecognitionError::InputShape { expected: 63, actual: 62 })
        ));
    }

    #[test]
    fn test_argmax_label_and_confidence() {
        let engine = InferenceEngine::new();
        engine.load(&identity_weights_json(10.0)).unwrap();

        let mut features = vec![0.0; FEATURE_LEN];
        features[2] = 1.0; // clase 2 → "C"
        let result = engine.predict(&features).unwrap();

        assert_eq!(result.label.as_str(), "C");
        assert_eq!(result.confidence, result.distribution[2]);
        assert!(result.confidence > 0.99);
    }

    #[test]
    fn test_distribution_is_probability_and_deterministic() {
        let engine = InferenceEngine::new();
        engine.load(&random_weights_json(7)).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let features: Vec<f32> = (0..FEATURE_LEN).map(|_| rng.gen_range(-1.0..2.0)).collect();
            let first = engine.predict(&features).unwrap();
            let second = engine.predict(&features).unwrap();

            let sum: f64 = first.distribution.iter().map(|&p| p as f64).sum();
            assert!((sum - 1.0).abs() <= 1e-6, "suma = {}", sum);
            assert!(first.distribution.iter().all(|&p| (0.0..=1.0).contains(&p)));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_non_finite_features_rejected() {
        let engine = InferenceEngine::new();
        engine.load(&identity_weights_json(10.0)).unwrap();

        let mut features = vec![0.0; FEATURE_LEN];
        features[5] = f32::NAN;
        assert!(matches!(
            engine.predict(&features),
            Err(RecognitionError::NonFinite { stage: "features", index: 5 })
        ));

        features[5] = f32::INFINITY;
        assert!(engine.predict(&features).is_err());
    }

    #[test]
    fn test_overflowing_logits_rejected() {
        let ones = |inputs: usize, outputs: usize| vec![vec![1.0f32; outputs]; inputs];
        let weights = json!({
            "dense": { "kernel": ones(FEATURE_LEN, HIDDEN_1), "bias": vec![0.0; HIDDEN_1] },
            "dense_1": { "kernel": ones(HIDDEN_1, HIDDEN_2), "bias": vec![0.0; HIDDEN_2] },
            "dense_2": { "kernel": ones(HIDDEN_2, NUM_CLASSES), "bias": vec![0.0; NUM_CLASSES] },
        });
        let engine = InferenceEngine::new();
        engine.load(&weights.to_string()).unwrap();

        match engine.predict(&[1e37; FEATURE_LEN]) {
            Err(RecognitionError::NonFinite { stage, .. }) => assert_eq!(stage, "logits"),
            other => panic!("se esperaba NonFinite, no {:?}", other),
        }

        // Valores grandes pero representables siguen dando una distribución válida
        let result = engine.predict(&[1e3; FEATURE_LEN]).unwrap();
        let sum: f64 = result.distribution.iter().map(|&p| p as f64).sum();
        assert!((sum - 1.0).abs() <= 1e-6);
        assert!(result.confidence.is_finite());
    }

    #[test]
    fn test_load_rejects_dimension_mismatch() {
        let mut doc: serde_json::Value =
            serde_json::from_str(&identity_weights_json(1.0)).unwrap();
        doc["dense_1"]["bias"] = json!(vec![0.0; HIDDEN_2 + 1]);

        let engine = InferenceEngine::new();
        assert!(matches!(
            engine.load(&doc.to_string()),
            Err(RecognitionError::ModelLoad(_))
        ));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let engine = InferenceEngine::new();
        assert!(matches!(
            engine.load("{\"dense\": 3"),
            Err(RecognitionError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_load_is_idempotent() {
        let engine = InferenceEngine::new();
        engine.load(&identity_weights_json(10.0)).unwrap();
        // Un segundo artefacto (incluso inválido) no reemplaza al primero
        engine.load("no es json").unwrap();

        let mut features = vec![0.0; FEATURE_LEN];
        features[0] = 1.0;
        assert_eq!(engine.predict(&features).unwrap().label.as_str(), "A");
    }

    #[test]
    fn test_predict_batch_keeps_order() {
        let params = ModelParameters::from_json(&identity_weights_json(10.0)).unwrap();
        let engine = InferenceEngine::with_parameters(params);

        let batch: Vec<FeatureVector> = (0..NUM_CLASSES)
            .map(|c| {
                let mut f = vec![0.0; FEATURE_LEN];
                f[c] = 1.0;
                f
            })
            .collect();

        let results = engine.predict_batch(&batch);
        for (c, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().label.index(), c);
        }
    }
}
