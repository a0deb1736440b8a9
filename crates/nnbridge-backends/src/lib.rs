pub mod graph_backend;
pub mod staged_backend;
pub mod staging;

#[cfg(test)]
pub(crate) mod test_util;

pub use staged_backend::{NamedTensor, PredictRequest, Predictor, StagedBackend};
pub use staging::{tensor_names, OutputSlot, OutputStaging, StagingError};

#[cfg(feature = "onnx")]
pub use graph_backend::GraphBackend;
