pub mod buffers;
pub mod decoder;
pub mod handle;
pub mod model;
pub mod output;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_util;

pub use buffers::{BatchBufferSet, BatchInputs, RowElementCounts, StagedRow, NUM_SYMMETRY_BOOLS};
pub use decoder::{decode_score, OutputDecoder, RawOutputs, RawRowWidths};
pub use handle::{
    policy_size, Accelerator, AcceleratorParseError, ComputeContext, ComputeOptions,
    ContextConfig, InferenceHandle,
};
pub use model::{
    DescriptorError, ModelChannels, ModelDescriptor, ScoreFormat, DEFAULT_MODEL_VERSION,
    MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION,
};
pub use output::StructuredOutput;
pub use provider::{evaluate_batch, InferenceProvider, ProviderError, UniformProvider};
