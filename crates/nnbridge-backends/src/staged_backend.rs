use crate::staging::{OutputSlot, OutputStaging};
use nnbridge_core::{
    Accelerator, BatchInputs, ComputeContext, InferenceHandle, InferenceProvider, ProviderError,
    RawOutputs,
};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Predictor: external engine that owns the loaded model
// ---------------------------------------------------------------------------

/// Flat input tensors for one predict call.
///
/// `spatial` is `[batch_size, board_area, num_spatial_channels]`, `global`
/// is `[batch_size, num_global_channels]`.
#[derive(Clone, Copy, Debug)]
pub struct PredictRequest<'a> {
    pub batch_size: usize,
    pub board_area: usize,
    pub num_spatial_channels: usize,
    pub num_global_channels: usize,
    pub spatial: &'a [f32],
    pub global: &'a [f32],
}

/// One named output tensor, flattened row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub data: Vec<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// An engine that loads a model by name and answers predict calls with
/// named output tensors.
pub trait Predictor {
    fn set_accelerator(&mut self, accelerator: Accelerator);

    fn load_model(&mut self, name: &str) -> Result<(), ProviderError>;

    /// Release the loaded model. Called when the backend is dropped.
    fn unload_model(&mut self) {}

    /// Version of the loaded model.
    fn model_version(&self) -> u32;

    fn predict(&mut self, request: &PredictRequest<'_>) -> Result<Vec<NamedTensor>, ProviderError>;
}

// ---------------------------------------------------------------------------
// StagedBackend
// ---------------------------------------------------------------------------

/// Adapts a [`Predictor`] to [`InferenceProvider`]: selects the device,
/// loads the model, checks its version, and copies each predict call's
/// outputs into staging sized for the handle.
pub struct StagedBackend<P: Predictor> {
    predictor: P,
    staging: OutputStaging,
}

impl<P: Predictor> StagedBackend<P> {
    pub fn new(
        context: &ComputeContext,
        handle: &InferenceHandle,
        mut predictor: P,
    ) -> Result<Self, ProviderError> {
        let model = handle.model();
        predictor.set_accelerator(context.accelerator());

        if let Err(e) = predictor.load_model(model.name()) {
            log::error!("failed to load model {}: {e}", model.name());
            return Err(e);
        }

        let version = predictor.model_version();
        if version != model.version() {
            predictor.unload_model();
            return Err(ProviderError::msg(format!(
                "predictor loaded {} as version {version}, descriptor says {}",
                model.name(),
                model.version()
            )));
        }

        log::info!(
            "loaded {} (version {version}) on {}, max batch {}",
            model.name(),
            context.accelerator(),
            handle.max_batch_size()
        );

        Ok(Self {
            predictor,
            staging: OutputStaging::new(handle),
        })
    }

    pub fn predictor(&self) -> &P {
        &self.predictor
    }
}

impl<P: Predictor> Drop for StagedBackend<P> {
    fn drop(&mut self) {
        self.predictor.unload_model();
    }
}

impl<P: Predictor> InferenceProvider for StagedBackend<P> {
    fn name(&self) -> &str {
        "staged"
    }

    fn run_batch(
        &mut self,
        handle: &InferenceHandle,
        inputs: BatchInputs<'_>,
    ) -> Result<RawOutputs<'_>, ProviderError> {
        let n = inputs.batch_size;
        self.staging.begin_batch(n).map_err(ProviderError::new)?;

        let model = handle.model();
        let request = PredictRequest {
            batch_size: n,
            board_area: inputs.x_size * inputs.y_size,
            num_spatial_channels: model.num_input_channels(),
            num_global_channels: model.num_input_global_channels(),
            spatial: inputs.spatial,
            global: inputs.global,
        };

        let start = Instant::now();
        let tensors = self.predictor.predict(&request)?;
        log::debug!(
            "predict time(ms): {:.3}",
            start.elapsed().as_secs_f64() * 1000.0
        );

        for tensor in &tensors {
            match OutputSlot::from_tensor_name(&tensor.name) {
                Some(slot) => self
                    .staging
                    .write(slot, n, &tensor.data)
                    .map_err(ProviderError::new)?,
                None => log::trace!("ignoring output {}", tensor.name),
            }
        }

        self.staging.view(n).map_err(ProviderError::new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
