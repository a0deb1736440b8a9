//! Provider-owned host staging for raw outputs, sized once for the
//! handle's max batch and reused by every call.

use nnbridge_core::{InferenceHandle, RawOutputs, RawRowWidths};
use thiserror::Error;

/// Graph tensor names shared by both providers.
pub mod tensor_names {
    pub const BIN_INPUTS: &str = "swa_model/bin_inputs";
    pub const GLOBAL_INPUTS: &str = "swa_model/global_inputs";

    pub const POLICY: &str = "swa_model/policy_output";
    pub const VALUE: &str = "swa_model/value_output";
    pub const MISC_VALUES: &str = "swa_model/miscvalues_output";
    pub const OWNERSHIP: &str = "swa_model/ownership_output";

    /// Exported by the graph but not decoded.
    pub const SCORE_BELIEF: &str = "swa_model/scorebelief_output";
    pub const BONUS_BELIEF: &str = "swa_model/bonusbelief_output";
}

/// Decoded output kinds, one staging buffer each.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSlot {
    Policy,
    Value,
    Misc,
    Ownership,
}

impl OutputSlot {
    pub const ALL: [OutputSlot; 4] = [
        OutputSlot::Policy,
        OutputSlot::Value,
        OutputSlot::Misc,
        OutputSlot::Ownership,
    ];

    pub fn tensor_name(self) -> &'static str {
        match self {
            OutputSlot::Policy => tensor_names::POLICY,
            OutputSlot::Value => tensor_names::VALUE,
            OutputSlot::Misc => tensor_names::MISC_VALUES,
            OutputSlot::Ownership => tensor_names::OWNERSHIP,
        }
    }

    /// `None` for outputs that are not decoded (belief heads, anything
    /// unknown).
    pub fn from_tensor_name(name: &str) -> Option<Self> {
        OutputSlot::ALL
            .into_iter()
            .find(|slot| slot.tensor_name() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StagingError {
    #[error("output {tensor}: {len} floats is not a whole number of {width}-float rows")]
    RowWidth {
        tensor: &'static str,
        len: usize,
        width: usize,
    },

    #[error("output {tensor}: {rows} rows for a batch of {batch_size}")]
    RowCount {
        tensor: &'static str,
        rows: usize,
        batch_size: usize,
    },

    #[error("batch of {batch_size} exceeds staging capacity {capacity}")]
    Capacity { batch_size: usize, capacity: usize },

    #[error("provider produced no {0} output")]
    MissingOutput(&'static str),
}

/// Four flat buffers of `max_batch_size` raw rows each.
pub struct OutputStaging {
    max_batch_size: usize,
    widths: RawRowWidths,
    buffers: [Vec<f32>; 4],
    filled: [bool; 4],
}

impl OutputStaging {
    pub fn new(handle: &InferenceHandle) -> Self {
        let widths = RawRowWidths::for_handle(handle);
        let n = handle.max_batch_size();
        let buffers = OutputSlot::ALL.map(|slot| vec![0.0; n * Self::width_of(&widths, slot)]);
        Self {
            max_batch_size: n,
            widths,
            buffers,
            filled: [false; 4],
        }
    }

    fn width_of(widths: &RawRowWidths, slot: OutputSlot) -> usize {
        match slot {
            OutputSlot::Policy => widths.policy,
            OutputSlot::Value => widths.value,
            OutputSlot::Misc => widths.misc,
            OutputSlot::Ownership => widths.ownership,
        }
    }

    pub fn widths(&self) -> RawRowWidths {
        self.widths
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Forget which slots the previous batch filled.
    pub fn begin_batch(&mut self, batch_size: usize) -> Result<(), StagingError> {
        if batch_size > self.max_batch_size {
            return Err(StagingError::Capacity {
                batch_size,
                capacity: self.max_batch_size,
            });
        }
        self.filled = [false; 4];
        Ok(())
    }

    /// Copy one output tensor of `batch_size` rows into its slot.
    pub fn write(
        &mut self,
        slot: OutputSlot,
        batch_size: usize,
        data: &[f32],
    ) -> Result<(), StagingError> {
        let tensor = slot.tensor_name();
        let width = Self::width_of(&self.widths, slot);
        if data.len() % width != 0 {
            return Err(StagingError::RowWidth {
                tensor,
                len: data.len(),
                width,
            });
        }
        let rows = data.len() / width;
        if rows != batch_size {
            return Err(StagingError::RowCount {
                tensor,
                rows,
                batch_size,
            });
        }
        if rows > self.max_batch_size {
            return Err(StagingError::Capacity {
                batch_size: rows,
                capacity: self.max_batch_size,
            });
        }
        self.buffers[slot.index()][..data.len()].copy_from_slice(data);
        self.filled[slot.index()] = true;
        Ok(())
    }

    /// Views of the first `batch_size` rows, once every slot was written.
    pub fn view(&self, batch_size: usize) -> Result<RawOutputs<'_>, StagingError> {
        if let Some(slot) = OutputSlot::ALL.into_iter().find(|s| !self.filled[s.index()]) {
            return Err(StagingError::MissingOutput(slot.tensor_name()));
        }
        let rows = |slot: OutputSlot| {
            let len = batch_size * Self::width_of(&self.widths, slot);
            &self.buffers[slot.index()][..len]
        };
        Ok(RawOutputs {
            policy: rows(OutputSlot::Policy),
            value: rows(OutputSlot::Value),
            misc: rows(OutputSlot::Misc),
            ownership: rows(OutputSlot::Ownership),
        })
    }
}
