//! Campaign feature extraction for the success classifier.

pub mod extractor;

pub use extractor::{FeatureExtractor, OTHER_CHANNEL};
