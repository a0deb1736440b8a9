use crate::staged_backend::{NamedTensor, PredictRequest, Predictor};
use crate::staging::tensor_names;
use nnbridge_core::{
    policy_size, Accelerator, ComputeContext, ComputeOptions, InferenceHandle, ModelChannels,
    ModelDescriptor, ProviderError,
};
use std::sync::{Arc, Mutex};

pub fn handle_for(version: u32, max_batch_size: usize, x: usize, y: usize) -> InferenceHandle {
    let model = ModelDescriptor::for_version(format!("test-v{version}"), version).unwrap();
    InferenceHandle::create(
        &ComputeContext::default(),
        Arc::new(model),
        max_batch_size,
        x,
        y,
        ComputeOptions::default(),
    )
}

/// Shape of a predict request, without the data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSummary {
    pub batch_size: usize,
    pub board_area: usize,
    pub num_spatial_channels: usize,
    pub num_global_channels: usize,
    pub spatial_len: usize,
    pub global_len: usize,
}

#[derive(Default)]
struct LogInner {
    accelerator: Option<Accelerator>,
    loaded: Vec<String>,
    unloaded: bool,
    last_request: Option<RequestSummary>,
}

/// What a [`ScriptedPredictor`] was asked to do. Shared so tests can look
/// after the predictor has moved into a backend.
#[derive(Clone, Default)]
pub struct PredictorLog(Arc<Mutex<LogInner>>);

impl PredictorLog {
    pub fn accelerator(&self) -> Option<Accelerator> {
        self.0.lock().unwrap().accelerator
    }

    pub fn loaded(&self) -> Vec<String> {
        self.0.lock().unwrap().loaded.clone()
    }

    pub fn unloaded(&self) -> bool {
        self.0.lock().unwrap().unloaded
    }

    pub fn last_request(&self) -> Option<RequestSummary> {
        self.0.lock().unwrap().last_request.clone()
    }
}

type Responder = Box<dyn FnMut(&PredictRequest<'_>) -> Vec<NamedTensor>>;

/// Predictor that answers with zeros (or a custom responder) and records
/// every call in a [`PredictorLog`].
pub struct ScriptedPredictor {
    version: u32,
    log: PredictorLog,
    load_error: Option<String>,
    predict_error: Option<String>,
    responder: Option<Responder>,
}

impl ScriptedPredictor {
    pub fn new(version: u32, log: PredictorLog) -> Self {
        Self {
            version,
            log,
            load_error: None,
            predict_error: None,
            responder: None,
        }
    }

    pub fn failing_load(mut self, msg: &str) -> Self {
        self.load_error = Some(msg.to_string());
        self
    }

    pub fn fail_predict(&mut self, msg: &str) {
        self.predict_error = Some(msg.to_string());
    }

    pub fn respond_with<F>(&mut self, f: F)
    where
        F: FnMut(&PredictRequest<'_>) -> Vec<NamedTensor> + 'static,
    {
        self.responder = Some(Box::new(f));
    }

    fn zeros(&self, req: &PredictRequest<'_>) -> Vec<NamedTensor> {
        let n = req.batch_size;
        let misc = ModelChannels::for_version(self.version)
            .map(|c| c.num_misc_value_channels)
            .unwrap_or(6);
        // Square boards only; the policy row carries one extra pass entry.
        let side = (req.board_area as f64).sqrt() as usize;
        let policy = 2 * policy_size(side, side);
        vec![
            NamedTensor::new(tensor_names::POLICY, vec![0.0; n * policy]),
            NamedTensor::new(tensor_names::VALUE, vec![0.0; n * 3]),
            NamedTensor::new(tensor_names::MISC_VALUES, vec![0.0; n * misc]),
            NamedTensor::new(tensor_names::OWNERSHIP, vec![0.0; n * req.board_area]),
        ]
    }
}

impl Predictor for ScriptedPredictor {
    fn set_accelerator(&mut self, accelerator: Accelerator) {
        self.log.0.lock().unwrap().accelerator = Some(accelerator);
    }

    fn load_model(&mut self, name: &str) -> Result<(), ProviderError> {
        if let Some(msg) = &self.load_error {
            return Err(ProviderError::msg(msg.clone()));
        }
        self.log.0.lock().unwrap().loaded.push(name.to_string());
        Ok(())
    }

    fn unload_model(&mut self) {
        self.log.0.lock().unwrap().unloaded = true;
    }

    fn model_version(&self) -> u32 {
        self.version
    }

    fn predict(&mut self, req: &PredictRequest<'_>) -> Result<Vec<NamedTensor>, ProviderError> {
        self.log.0.lock().unwrap().last_request = Some(RequestSummary {
            batch_size: req.batch_size,
            board_area: req.board_area,
            num_spatial_channels: req.num_spatial_channels,
            num_global_channels: req.num_global_channels,
            spatial_len: req.spatial.len(),
            global_len: req.global.len(),
        });
        if let Some(msg) = &self.predict_error {
            return Err(ProviderError::msg(msg.clone()));
        }
        Ok(match self.responder.as_mut() {
            Some(f) => f(req),
            None => self.zeros(req),
        })
    }
}
