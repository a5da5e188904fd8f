pub mod analytics;
pub mod commit_state;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod feedback;
pub mod landmark_csv;
pub mod pipeline;
pub mod recognition_gate;
pub mod session;
pub mod session_log;
pub mod sign_classifier;
pub mod types;

pub use config::RecognitionConfig;
pub use error::{RecognitionError, SessionLogError};
pub use pipeline::{PipelineEvent, RecognitionPipeline};
pub use sign_classifier::InferenceEngine;
