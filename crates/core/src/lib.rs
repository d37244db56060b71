pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use cancel::CancelToken;
pub use config::AppConfig;
pub use error::{CampaignError, CampaignResult, ErrorKind};
pub use model::{ModelKind, ModelMetadata, ModelParameters, ModelVersion, TrainedModel};
pub use types::{
    CampaignRecord, CreativeType, DrivingFactor, EncodingVersion, FeatureVector, Objective,
    PredictionResult, Tier,
};
