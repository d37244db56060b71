//! Campaign success modelling: dataset partitioning, logistic regression,
//! the shared training pipeline and the pre-launch success classifier.

pub mod classifier;
pub mod dataset;
pub mod logistic;
pub mod trainer;

pub use classifier::{confidence_tier, risk_tier, SuccessClassifier};
pub use dataset::TrainingSet;
pub use trainer::ModelTrainer;
