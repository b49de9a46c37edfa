pub mod anomaly;
pub mod autoencoder;
pub mod classifier;
pub mod features;
pub mod isolation_forest;
pub mod rules;

pub use anomaly::AnomalyScorer;
pub use autoencoder::ReconstructionModel;
pub use classifier::{AttackClassifier, CentroidModel, Classification};
pub use features::{FeatureExtractor, FEATURE_COUNT};
pub use isolation_forest::IsolationForestModel;
