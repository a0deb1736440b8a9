//! Compute context configuration and the per-worker inference handle.

use crate::buffers::BatchBufferSet;
use crate::model::ModelDescriptor;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Policy entries for an `x` by `y` board: one per cell plus pass.
pub fn policy_size(nn_x_len: usize, nn_y_len: usize) -> usize {
    nn_x_len * nn_y_len + 1
}

// ---------------------------------------------------------------------------
// Accelerator
// ---------------------------------------------------------------------------

/// Which device class a provider should run on.
///
/// Providers map this onto whatever they actually support; the core only
/// forwards it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Accelerator {
    #[default]
    Cpu,
    Gpu,
    /// Let the provider pick (GPU when one is usable).
    Auto,
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Accelerator::Cpu => "cpu",
            Accelerator::Gpu => "gpu",
            Accelerator::Auto => "auto",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown accelerator {0:?} (expected cpu, gpu or auto)")]
pub struct AcceleratorParseError(pub String);

impl FromStr for Accelerator {
    type Err = AcceleratorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Accelerator::Cpu),
            // "webgl" is what browser-side predictors call their GPU path.
            "gpu" | "cuda" | "webgl" => Ok(Accelerator::Gpu),
            "auto" => Ok(Accelerator::Auto),
            _ => Err(AcceleratorParseError(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextConfig / ComputeContext
// ---------------------------------------------------------------------------

/// Configuration consumed when a [`ComputeContext`] is created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextConfig {
    pub accelerator: Accelerator,
}

impl ContextConfig {
    /// Config key naming the accelerator.
    pub const BACKEND_KEY: &'static str = "backend";

    /// Build from any key/value source (config file, env, CLI). A missing
    /// `backend` key keeps the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AcceleratorParseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let accelerator = match lookup(Self::BACKEND_KEY) {
            Some(value) => value.parse()?,
            None => Accelerator::default(),
        };
        Ok(Self { accelerator })
    }
}

/// Process-wide settings shared by every handle created from it.
#[derive(Clone, Debug)]
pub struct ComputeContext {
    config: ContextConfig,
}

impl ComputeContext {
    pub fn new(config: ContextConfig) -> Self {
        log::info!("backend: {}", config.accelerator);
        Self { config }
    }

    pub fn accelerator(&self) -> Accelerator {
        self.config.accelerator
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ComputeContext {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

// ---------------------------------------------------------------------------
// ComputeOptions
// ---------------------------------------------------------------------------

/// Per-handle options forwarded untouched to the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComputeOptions {
    /// Board extents must equal the model's trained extents.
    pub require_exact_nn_len: bool,
    /// Packed spatial inputs are channels-last.
    pub inputs_use_nhwc: bool,
    /// Device index for this worker, `None` for the provider default.
    pub gpu_idx: Option<usize>,
    pub use_fp16: bool,
    /// Provider-internal tensors are channels-last.
    pub use_nhwc: bool,
}

// ---------------------------------------------------------------------------
// InferenceHandle
// ---------------------------------------------------------------------------

/// Binds a model to fixed board extents for one compute worker.
///
/// Immutable after creation. One thread uses a handle at a time; create one
/// handle per worker instead of sharing.
#[derive(Clone, Debug)]
pub struct InferenceHandle {
    model: Arc<ModelDescriptor>,
    accelerator: Accelerator,
    options: ComputeOptions,
    max_batch_size: usize,
    nn_x_len: usize,
    nn_y_len: usize,
    policy_size: usize,
}

impl InferenceHandle {
    pub fn create(
        context: &ComputeContext,
        model: Arc<ModelDescriptor>,
        max_batch_size: usize,
        nn_x_len: usize,
        nn_y_len: usize,
        options: ComputeOptions,
    ) -> Self {
        assert!(max_batch_size > 0, "max_batch_size must be positive");
        assert!(
            nn_x_len > 0 && nn_y_len > 0,
            "board extents must be positive, got {nn_x_len}x{nn_y_len}"
        );
        log::debug!(
            "handle for {}: {nn_x_len}x{nn_y_len}, max batch {max_batch_size}, {} {options:?}",
            model.name(),
            context.accelerator()
        );
        Self {
            model,
            accelerator: context.accelerator(),
            options,
            max_batch_size,
            nn_x_len,
            nn_y_len,
            policy_size: policy_size(nn_x_len, nn_y_len),
        }
    }

    /// Buffers matching this handle's model, capacity and extents.
    pub fn allocate_buffers(&self) -> BatchBufferSet {
        BatchBufferSet::allocate(
            &self.model,
            self.max_batch_size,
            self.nn_x_len,
            self.nn_y_len,
        )
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn shared_model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    pub fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    pub fn options(&self) -> &ComputeOptions {
        &self.options
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn nn_x_len(&self) -> usize {
        self.nn_x_len
    }

    pub fn nn_y_len(&self) -> usize {
        self.nn_y_len
    }

    pub fn policy_size(&self) -> usize {
        self.policy_size
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
