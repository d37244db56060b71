use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type CampaignResult<T> = Result<T, CampaignError>;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient training data: {0}")]
    InsufficientData(String),

    #[error("No trained model available: {0}")]
    ModelNotTrained(String),

    #[error("Model version v{0} not found")]
    ModelVersionNotFound(u64),

    #[error("Budget allocation infeasible: {0}")]
    OptimizationInfeasible(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Training cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Machine-readable error category carried alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    InsufficientData,
    ModelNotTrained,
    ModelVersionNotFound,
    OptimizationInfeasible,
    Artifact,
    Cancelled,
    Config,
    Serialization,
    Io,
    Internal,
}

impl CampaignError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CampaignError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CampaignError::Validation(_) => ErrorKind::Validation,
            CampaignError::InsufficientData(_) => ErrorKind::InsufficientData,
            CampaignError::ModelNotTrained(_) => ErrorKind::ModelNotTrained,
            CampaignError::ModelVersionNotFound(_) => ErrorKind::ModelVersionNotFound,
            CampaignError::OptimizationInfeasible(_) => ErrorKind::OptimizationInfeasible,
            CampaignError::Artifact(_) => ErrorKind::Artifact,
            CampaignError::Cancelled => ErrorKind::Cancelled,
            CampaignError::Config(_) => ErrorKind::Config,
            CampaignError::Serialization(_) => ErrorKind::Serialization,
            CampaignError::Io(_) => ErrorKind::Io,
            CampaignError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<config::ConfigError> for CampaignError {
    fn from(e: config::ConfigError) -> Self {
        CampaignError::Config(e.to_string())
    }
}
