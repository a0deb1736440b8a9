//! Version-aware decoding of raw provider outputs into per-row predictions.
//!
//! Raw arrays hold `batch_size` consecutive fixed-width rows, in the same
//! row order as the packed inputs:
//! ```text
//! policy    [2 * policy_size]     even = logits, odd = side channel (unused)
//! value     [num_value_channels]  win, loss, no-result
//! misc      [num_misc_channels]   score stats, layout per ScoreFormat
//! ownership [x * y]               row-major
//! ```

use crate::buffers::{BatchBufferSet, StagedRowMut};
use crate::handle::InferenceHandle;
use crate::model::ScoreFormat;
use crate::output::StructuredOutput;

// ---------------------------------------------------------------------------
// RawOutputs
// ---------------------------------------------------------------------------

/// Raw result arrays of one inference call, borrowed from the provider.
#[derive(Clone, Copy, Debug)]
pub struct RawOutputs<'a> {
    pub policy: &'a [f32],
    pub value: &'a [f32],
    pub misc: &'a [f32],
    pub ownership: &'a [f32],
}

/// Row widths of the raw arrays for one handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRowWidths {
    pub policy: usize,
    pub value: usize,
    pub misc: usize,
    pub ownership: usize,
}

impl RawRowWidths {
    pub fn for_handle(handle: &InferenceHandle) -> Self {
        let model = handle.model();
        Self {
            policy: 2 * handle.policy_size(),
            value: model.num_value_channels(),
            misc: model.num_misc_value_channels(),
            ownership: model.num_ownership_channels() * handle.nn_x_len() * handle.nn_y_len(),
        }
    }
}

/// One row sliced out of every raw array.
struct RawRow<'a> {
    policy: &'a [f32],
    value: &'a [f32],
    misc: &'a [f32],
    ownership: &'a [f32],
}

impl<'a> RawRow<'a> {
    #[inline]
    fn at(raw: &RawOutputs<'a>, widths: &RawRowWidths, row: usize) -> Self {
        #[inline]
        fn slice(data: &[f32], width: usize, row: usize) -> &[f32] {
            &data[row * width..(row + 1) * width]
        }
        Self {
            policy: slice(raw.policy, widths.policy, row),
            value: slice(raw.value, widths.value, row),
            misc: slice(raw.misc, widths.misc, row),
            ownership: slice(raw.ownership, widths.ownership, row),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-field decoding
// ---------------------------------------------------------------------------

#[inline]
fn decode_value(value: &[f32]) -> (f32, f32, f32) {
    (value[0], value[1], value[2])
}

/// Even-indexed entries are the policy; odd entries are skipped.
#[inline]
fn decode_policy(raw: &[f32], policy: &mut [f32]) {
    for (dst, &src) in policy.iter_mut().zip(raw.iter().step_by(2)) {
        *dst = src;
    }
}

/// Returns `(score_mean, score_mean_sq)`.
#[inline]
pub fn decode_score(format: ScoreFormat, misc: &[f32]) -> (f32, f32) {
    match format {
        ScoreFormat::MeanAndSecondMoment => (misc[0], misc[1]),
        ScoreFormat::MeanOnly => {
            let mean = misc[0];
            (mean, mean * mean)
        }
    }
}

// ---------------------------------------------------------------------------
// OutputDecoder
// ---------------------------------------------------------------------------

/// Walks a completed batch and fills one record per row.
///
/// Built once per handle; the score format is fixed at that point and only
/// matched per row. Never allocates.
#[derive(Clone, Copy, Debug)]
pub struct OutputDecoder {
    max_batch_size: usize,
    nn_x_len: usize,
    nn_y_len: usize,
    policy_size: usize,
    num_ownership_channels: usize,
    score_format: ScoreFormat,
    widths: RawRowWidths,
}

impl OutputDecoder {
    pub fn new(handle: &InferenceHandle) -> Self {
        Self {
            max_batch_size: handle.max_batch_size(),
            nn_x_len: handle.nn_x_len(),
            nn_y_len: handle.nn_y_len(),
            policy_size: handle.policy_size(),
            num_ownership_channels: handle.model().num_ownership_channels(),
            score_format: handle.model().score_format(),
            widths: RawRowWidths::for_handle(handle),
        }
    }

    pub fn widths(&self) -> RawRowWidths {
        self.widths
    }

    pub fn score_format(&self) -> ScoreFormat {
        self.score_format
    }

    /// Batch-size and array-length preconditions. A violation is a
    /// scheduling bug upstream, so it panics instead of truncating.
    fn check_batch(&self, raw: &RawOutputs<'_>, batch_size: usize) {
        assert!(batch_size > 0, "empty batch");
        assert!(
            batch_size <= self.max_batch_size,
            "batch size {batch_size} exceeds max_batch_size {}",
            self.max_batch_size
        );
        for (name, len, width) in [
            ("policy", raw.policy.len(), self.widths.policy),
            ("value", raw.value.len(), self.widths.value),
            ("misc", raw.misc.len(), self.widths.misc),
            ("ownership", raw.ownership.len(), self.widths.ownership),
        ] {
            assert!(
                len >= batch_size * width,
                "raw {name} output has {len} floats, batch of {batch_size} needs {}",
                batch_size * width
            );
        }
        debug_assert!(
            !raw.value[0].is_nan(),
            "provider returned NaN win probability"
        );
    }

    /// Decode rows `0..batch_size` into `outputs[0..batch_size]`.
    ///
    /// Ownership is written only into records that carry an `owner_map`.
    pub fn decode(
        &self,
        raw: &RawOutputs<'_>,
        batch_size: usize,
        outputs: &mut [StructuredOutput],
    ) {
        self.check_batch(raw, batch_size);
        assert!(
            outputs.len() >= batch_size,
            "{} output records for a batch of {batch_size}",
            outputs.len()
        );

        let area = self.nn_x_len * self.nn_y_len;
        for (row, output) in outputs[..batch_size].iter_mut().enumerate() {
            assert!(
                output.nn_x_len == self.nn_x_len && output.nn_y_len == self.nn_y_len,
                "output record {row} is {}x{}, handle is {}x{}",
                output.nn_x_len,
                output.nn_y_len,
                self.nn_x_len,
                self.nn_y_len
            );
            assert_eq!(output.policy.len(), self.policy_size, "policy length, row {row}");

            let r = RawRow::at(raw, &self.widths, row);

            let (win, loss, no_result) = decode_value(r.value);
            output.white_win_prob = win;
            output.white_loss_prob = loss;
            output.white_no_result_prob = no_result;

            decode_policy(r.policy, &mut output.policy);

            if let Some(owner_map) = output.owner_map.as_mut() {
                assert_eq!(self.num_ownership_channels, 1);
                assert_eq!(owner_map.len(), area, "ownership length, row {row}");
                owner_map.copy_from_slice(r.ownership);
            }

            let (mean, mean_sq) = decode_score(self.score_format, r.misc);
            output.white_score_mean = mean;
            output.white_score_mean_sq = mean_sq;
        }
    }

    /// Decode rows `0..batch_size` into the staging buffers of `buffers`
    /// instead of caller records. Read them back with
    /// [`BatchBufferSet::staged_row`].
    pub fn stage(&self, raw: &RawOutputs<'_>, batch_size: usize, buffers: &mut BatchBufferSet) {
        self.check_batch(raw, batch_size);
        assert!(
            buffers.x_size() == self.nn_x_len && buffers.y_size() == self.nn_y_len,
            "buffers are {}x{}, handle is {}x{}",
            buffers.x_size(),
            buffers.y_size(),
            self.nn_x_len,
            self.nn_y_len
        );
        assert!(
            batch_size <= buffers.max_batch_size(),
            "batch size {batch_size} exceeds buffer capacity {}",
            buffers.max_batch_size()
        );
        assert_eq!(buffers.score_format(), self.score_format, "buffers built for another model");

        for row in 0..batch_size {
            let r = RawRow::at(raw, &self.widths, row);
            let StagedRowMut {
                policy,
                value,
                score_value,
                ownership,
            } = buffers.staged_row_mut(row);

            value.copy_from_slice(&r.value[..value.len()]);
            decode_policy(r.policy, policy);
            ownership.copy_from_slice(r.ownership);

            let (mean, mean_sq) = decode_score(self.score_format, r.misc);
            score_value[0] = mean;
            if let Some(slot) = score_value.get_mut(1) {
                *slot = mean_sq;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
