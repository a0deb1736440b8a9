#[cfg(feature = "onnx")]
mod inner {
    use crate::staging::{tensor_names, OutputSlot, OutputStaging};
    use nnbridge_core::{
        Accelerator, BatchInputs, ComputeContext, InferenceHandle, InferenceProvider,
        ProviderError, RawOutputs,
    };
    use ort::session::builder::SessionBuilder;
    use ort::session::Session;
    use ort::value::Tensor;
    use std::fmt::Display;
    use std::path::Path;
    use std::time::Instant;

    fn ort_error<E: Display>(what: &'static str) -> impl FnOnce(E) -> ProviderError {
        move |e| ProviderError::msg(format!("{what}: {e}"))
    }

    /// Runs an exported graph in-process with ONNX Runtime.
    ///
    /// Inputs go in as `swa_model/bin_inputs` `[batch, area, channels]` and
    /// `swa_model/global_inputs` `[batch, channels]`; the four decoded
    /// outputs are copied into staging after each run.
    pub struct GraphBackend {
        session: Session,
        staging: OutputStaging,
    }

    impl GraphBackend {
        pub fn new(
            context: &ComputeContext,
            handle: &InferenceHandle,
            model_path: impl AsRef<Path>,
        ) -> Result<Self, ProviderError> {
            let model_path = model_path.as_ref();
            let model = handle.model();
            if !handle.options().inputs_use_nhwc {
                log::warn!(
                    "{}: graph expects channels-last inputs, rows will be passed as packed",
                    model.name()
                );
            }

            let builder = Session::builder()
                .map_err(ort_error("create session builder"))?
                .with_intra_threads(1)
                .map_err(ort_error("set intra-op thread count"))?;
            let builder = register_execution_provider(builder, context.accelerator(), handle)?;
            let session = match builder.commit_from_file(model_path) {
                Ok(session) => session,
                Err(e) => {
                    log::error!("failed to load {}: {e}", model_path.display());
                    return Err(ProviderError::msg(format!(
                        "load {}: {e}",
                        model_path.display()
                    )));
                }
            };

            log::info!(
                "loaded {} from {} on {}, max batch {}",
                model.name(),
                model_path.display(),
                context.accelerator(),
                handle.max_batch_size()
            );

            Ok(Self {
                session,
                staging: OutputStaging::new(handle),
            })
        }
    }

    #[allow(unused_variables, unreachable_code)]
    fn register_execution_provider(
        builder: SessionBuilder,
        accelerator: Accelerator,
        handle: &InferenceHandle,
    ) -> Result<SessionBuilder, ProviderError> {
        if accelerator == Accelerator::Cpu {
            return Ok(builder);
        }

        #[cfg(feature = "onnx-cuda")]
        {
            let device = handle.options().gpu_idx.unwrap_or(0) as i32;
            return builder
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(device)
                        .build(),
                ])
                .map_err(ort_error("register CUDA execution provider"));
        }

        #[cfg(feature = "onnx-coreml")]
        {
            return builder
                .with_execution_providers([
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                ])
                .map_err(ort_error("register CoreML execution provider"));
        }

        if accelerator == Accelerator::Gpu {
            log::warn!("no GPU execution provider compiled in, running on CPU");
        }
        Ok(builder)
    }

    impl InferenceProvider for GraphBackend {
        fn name(&self) -> &str {
            "onnx"
        }

        fn run_batch(
            &mut self,
            handle: &InferenceHandle,
            inputs: BatchInputs<'_>,
        ) -> Result<RawOutputs<'_>, ProviderError> {
            let n = inputs.batch_size;
            self.staging.begin_batch(n).map_err(ProviderError::new)?;

            let model = handle.model();
            let area = inputs.x_size * inputs.y_size;
            let bin = Tensor::from_array((
                [n, area, model.num_input_channels()],
                inputs.spatial.to_vec(),
            ))
            .map_err(ort_error("build bin_inputs tensor"))?;
            let global = Tensor::from_array((
                [n, model.num_input_global_channels()],
                inputs.global.to_vec(),
            ))
            .map_err(ort_error("build global_inputs tensor"))?;

            let start = Instant::now();
            let outputs = self
                .session
                .run(ort::inputs![
                    tensor_names::BIN_INPUTS => bin,
                    tensor_names::GLOBAL_INPUTS => global,
                ])
                .map_err(ort_error("run session"))?;
            log::debug!(
                "predict time(ms): {:.3}",
                start.elapsed().as_secs_f64() * 1000.0
            );

            for slot in OutputSlot::ALL {
                let (_, data) = outputs[slot.tensor_name()]
                    .try_extract_tensor::<f32>()
                    .map_err(ort_error(slot.tensor_name()))?;
                self.staging
                    .write(slot, n, data)
                    .map_err(ProviderError::new)?;
            }
            drop(outputs);

            self.staging.view(n).map_err(ProviderError::new)
        }
    }

}

#[cfg(feature = "onnx")]
pub use inner::GraphBackend;
