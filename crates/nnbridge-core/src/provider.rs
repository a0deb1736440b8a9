use crate::buffers::{BatchBufferSet, BatchInputs, RowElementCounts};
use crate::decoder::{OutputDecoder, RawOutputs, RawRowWidths};
use crate::handle::InferenceHandle;
use crate::output::StructuredOutput;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ProviderError: error type for inference provider failures
// ---------------------------------------------------------------------------

/// Error reported by an inference provider (engine failure, model mismatch,
/// malformed outputs, ...).
///
/// Displays as the underlying failure. When built from another error, that
/// error is kept as the [`source`](std::error::Error::source) so engine
/// specific types can still be downcast by the caller.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Wrap any error, keeping it as the source.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create from a string message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            source: None,
        }
    }
}

impl From<String> for ProviderError {
    fn from(s: String) -> Self {
        Self::msg(s)
    }
}

// ---------------------------------------------------------------------------
// InferenceProvider trait
// ---------------------------------------------------------------------------

/// Boundary between the buffer protocol and whatever actually runs the
/// network.
///
/// One synchronous call per batch: packed inputs in, raw row-major result
/// arrays out. The returned views borrow provider-owned staging and stay
/// valid until the next call. Providers are driven by one worker thread at
/// a time, hence `&mut self`.
pub trait InferenceProvider {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn run_batch(
        &mut self,
        handle: &InferenceHandle,
        inputs: BatchInputs<'_>,
    ) -> Result<RawOutputs<'_>, ProviderError>;
}

/// Run rows `0..batch_size` of `buffers` through `provider` and decode the
/// results into `outputs`.
///
/// Provider failures are logged here and returned unchanged; retrying is up
/// to the caller that owns the batching loop.
pub fn evaluate_batch<P: InferenceProvider + ?Sized>(
    provider: &mut P,
    handle: &InferenceHandle,
    buffers: &BatchBufferSet,
    batch_size: usize,
    outputs: &mut [StructuredOutput],
) -> Result<(), ProviderError> {
    check_buffers(handle, buffers);
    let inputs = buffers.inputs(batch_size);
    let raw = match provider.run_batch(handle, inputs) {
        Ok(raw) => raw,
        Err(e) => {
            log::error!(
                "inference failed for {} (batch of {batch_size}): {e}",
                handle.model().name()
            );
            return Err(e);
        }
    };
    OutputDecoder::new(handle).decode(&raw, batch_size, outputs);
    Ok(())
}

/// `buffers` must have been allocated for `handle` (or a handle with the
/// same model and extents).
fn check_buffers(handle: &InferenceHandle, buffers: &BatchBufferSet) {
    assert!(
        buffers.x_size() == handle.nn_x_len() && buffers.y_size() == handle.nn_y_len(),
        "buffers are {}x{}, handle is {}x{}",
        buffers.x_size(),
        buffers.y_size(),
        handle.nn_x_len(),
        handle.nn_y_len()
    );
    assert!(
        buffers.max_batch_size() <= handle.max_batch_size(),
        "buffers hold {} rows, handle max_batch_size is {}",
        buffers.max_batch_size(),
        handle.max_batch_size()
    );
    assert_eq!(
        buffers.row_element_counts(),
        RowElementCounts::new(handle.model(), handle.nn_x_len(), handle.nn_y_len()),
        "buffers built for another model"
    );
}

// ---------------------------------------------------------------------------
// UniformProvider: no-NN mode
// ---------------------------------------------------------------------------

/// All-zero outputs: uniform policy and value after the engine's softmax,
/// zero score, neutral ownership.
///
/// This is the no-NN mode, also handy for measuring adapter overhead.
pub struct UniformProvider {
    max_batch_size: usize,
    widths: RawRowWidths,
    zeros: Vec<f32>,
}

impl UniformProvider {
    pub fn new(handle: &InferenceHandle) -> Self {
        let widths = RawRowWidths::for_handle(handle);
        let widest = widths
            .policy
            .max(widths.value)
            .max(widths.misc)
            .max(widths.ownership);
        Self {
            max_batch_size: handle.max_batch_size(),
            widths,
            zeros: vec![0.0; widest * handle.max_batch_size()],
        }
    }
}

impl InferenceProvider for UniformProvider {
    fn name(&self) -> &str {
        "uniform"
    }

    fn run_batch(
        &mut self,
        _handle: &InferenceHandle,
        inputs: BatchInputs<'_>,
    ) -> Result<RawOutputs<'_>, ProviderError> {
        let n = inputs.batch_size;
        if n > self.max_batch_size {
            return Err(ProviderError::msg(format!(
                "batch size {n} exceeds provider capacity {}",
                self.max_batch_size
            )));
        }
        let w = self.widths;
        Ok(RawOutputs {
            policy: &self.zeros[..n * w.policy],
            value: &self.zeros[..n * w.value],
            misc: &self.zeros[..n * w.misc],
            ownership: &self.zeros[..n * w.ownership],
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
