//! Campaign prediction service: background training, versioned models and
//! synchronous scoring behind one facade.

pub mod jobs;
pub mod service;

pub use jobs::{JobStatus, TrainingHandle, TrainingJobs};
pub use service::PredictionService;
