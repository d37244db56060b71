//! Self-describing on-disk form of a published model.

use campaign_core::{CampaignError, CampaignResult, ModelVersion, TrainedModel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ARTIFACT_SCHEMA: &str = "campaign-predict/model-artifact/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: String,
    pub version: ModelVersion,
    /// SHA-256 (hex) of the serialized `model`.
    pub checksum: String,
    pub model: TrainedModel,
}

impl ModelArtifact {
    /// Wrap a model that has already been assigned a version.
    pub fn seal(model: TrainedModel) -> CampaignResult<Self> {
        let version = model
            .version()
            .ok_or_else(|| CampaignError::Artifact("cannot seal an unversioned model".into()))?;
        Ok(Self {
            schema: ARTIFACT_SCHEMA.to_string(),
            version,
            checksum: checksum(&model)?,
            model,
        })
    }

    pub fn verify(&self) -> CampaignResult<()> {
        if self.schema != ARTIFACT_SCHEMA {
            return Err(unsupported_schema(&self.schema));
        }
        if self.model.version() != Some(self.version) {
            return Err(CampaignError::Artifact(format!(
                "artifact {} wraps model stamped {:?}",
                self.version,
                self.model.version()
            )));
        }
        let actual = checksum(&self.model)?;
        if actual != self.checksum {
            return Err(CampaignError::Artifact(format!(
                "checksum mismatch for {}: expected {}, computed {}",
                self.version, self.checksum, actual
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> CampaignResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and verify. The schema tag is checked before the body is
    /// decoded, so a future format fails with a clear message instead of a
    /// field-level parse error.
    pub fn from_json(bytes: &[u8]) -> CampaignResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match value.get("schema").and_then(|s| s.as_str()) {
            Some(ARTIFACT_SCHEMA) => {}
            Some(other) => return Err(unsupported_schema(other)),
            None => return Err(CampaignError::Artifact("artifact has no schema tag".into())),
        }
        let artifact: ModelArtifact = serde_json::from_value(value)?;
        artifact.verify()?;
        Ok(artifact)
    }
}

fn checksum(model: &TrainedModel) -> CampaignResult<String> {
    let bytes = serde_json::to_vec(model)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn unsupported_schema(schema: &str) -> CampaignError {
    CampaignError::Artifact(format!(
        "unsupported artifact schema '{schema}', expected '{ARTIFACT_SCHEMA}'"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::model;
    use campaign_core::ModelKind;

    #[test]
    fn sealed_artifact_survives_json() {
        let artifact = ModelArtifact::seal(model(ModelKind::CampaignSuccess, Some(3))).unwrap();
        let bytes = artifact.to_json().unwrap();
        let back = ModelArtifact::from_json(&bytes).unwrap();
        assert_eq!(back, artifact);
        assert_eq!(back.checksum.len(), 64);
    }

    #[test]
    fn unversioned_model_cannot_be_sealed() {
        let err = ModelArtifact::seal(model(ModelKind::CampaignSuccess, None)).unwrap_err();
        assert!(matches!(err, CampaignError::Artifact(_)));
    }

    #[test]
    fn unknown_schema_fails_fast() {
        let bytes = br#"{"schema":"campaign-predict/model-artifact/v9","payload":42}"#;
        let err = ModelArtifact::from_json(bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported artifact schema"));
    }

    #[test]
    fn tampered_weights_fail_checksum() {
        let mut artifact = ModelArtifact::seal(model(ModelKind::EarlySignal, Some(1))).unwrap();
        artifact.model.parameters.weights[0] += 1.0;
        let bytes = serde_json::to_vec(&artifact).unwrap();
        let err = ModelArtifact::from_json(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }
}
