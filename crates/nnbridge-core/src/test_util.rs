use crate::buffers::{BatchInputs, NUM_SYMMETRY_BOOLS};
use crate::decoder::{RawOutputs, RawRowWidths};
use crate::handle::{ComputeContext, ComputeOptions, InferenceHandle};
use crate::model::ModelDescriptor;
use crate::provider::{InferenceProvider, ProviderError};
use std::sync::Arc;

pub fn v5_model() -> ModelDescriptor {
    ModelDescriptor::load("test-v5").unwrap()
}

pub fn v3_model() -> ModelDescriptor {
    ModelDescriptor::for_version("test-v3", 3).unwrap()
}

pub fn handle_for(
    model: ModelDescriptor,
    max_batch_size: usize,
    x: usize,
    y: usize,
) -> InferenceHandle {
    InferenceHandle::create(
        &ComputeContext::default(),
        Arc::new(model),
        max_batch_size,
        x,
        y,
        ComputeOptions::default(),
    )
}

/// Owned raw output arrays laid out for a handle.
#[derive(Clone, Debug)]
pub struct RawBatch {
    pub policy: Vec<f32>,
    pub value: Vec<f32>,
    pub misc: Vec<f32>,
    pub ownership: Vec<f32>,
    widths: RawRowWidths,
}

impl RawBatch {
    pub fn zeros(handle: &InferenceHandle, rows: usize) -> Self {
        let widths = RawRowWidths::for_handle(handle);
        Self {
            policy: vec![0.0; rows * widths.policy],
            value: vec![0.0; rows * widths.value],
            misc: vec![0.0; rows * widths.misc],
            ownership: vec![0.0; rows * widths.ownership],
            widths,
        }
    }

    pub fn set_value(&mut self, row: usize, value: [f32; 3]) {
        let w = self.widths.value;
        self.value[row * w..row * w + 3].copy_from_slice(&value);
    }

    /// Write the leading entries of a misc row.
    pub fn set_misc(&mut self, row: usize, misc: &[f32]) {
        let w = self.widths.misc;
        self.misc[row * w..row * w + misc.len()].copy_from_slice(misc);
    }

    pub fn as_raw(&self) -> RawOutputs<'_> {
        RawOutputs {
            policy: &self.policy,
            value: &self.value,
            misc: &self.misc,
            ownership: &self.ownership,
        }
    }
}

/// Copy of what a provider was handed.
#[derive(Clone, Debug)]
pub struct RecordedInputs {
    pub batch_size: usize,
    pub spatial: Vec<f32>,
    pub global: Vec<f32>,
    pub symmetries: [bool; NUM_SYMMETRY_BOOLS],
}

/// Provider that replays a fixed batch (or a fixed failure) and records
/// its inputs.
pub struct ScriptedProvider {
    outputs: Result<RawBatch, String>,
    pub last_inputs: Option<RecordedInputs>,
}

impl ScriptedProvider {
    pub fn new(outputs: RawBatch) -> Self {
        Self {
            outputs: Ok(outputs),
            last_inputs: None,
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            outputs: Err(msg.to_string()),
            last_inputs: None,
        }
    }
}

impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run_batch(
        &mut self,
        _handle: &InferenceHandle,
        inputs: BatchInputs<'_>,
    ) -> Result<RawOutputs<'_>, ProviderError> {
        self.last_inputs = Some(RecordedInputs {
            batch_size: inputs.batch_size,
            spatial: inputs.spatial.to_vec(),
            global: inputs.global.to_vec(),
            symmetries: *inputs.symmetries,
        });
        match &self.outputs {
            Ok(batch) => Ok(batch.as_raw()),
            Err(msg) => Err(ProviderError::msg(msg.clone())),
        }
    }
}
