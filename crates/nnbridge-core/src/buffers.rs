//! Host-side arena for one batch: packed inputs, symmetry selectors and
//! decoded-output staging, all addressed by row.
//!
//! Every buffer is one contiguous `Vec<f32>` of `max_batch_size` equal-sized
//! rows. Row `i` of a buffer with row width `w` lives at `[i * w, (i + 1) * w)`.

use crate::model::{ModelDescriptor, ScoreFormat};
use std::ops::Range;

/// Number of symmetry flags: transpose, flip-x, flip-y. Together they name
/// one of the 8 board symmetries.
pub const NUM_SYMMETRY_BOOLS: usize = 3;

const F32_BYTES: usize = std::mem::size_of::<f32>();

// ---------------------------------------------------------------------------
// RowElementCounts
// ---------------------------------------------------------------------------

/// Per-row element counts of every buffer kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowElementCounts {
    pub spatial_input: usize,
    pub global_input: usize,
    /// Board cells plus the pass move.
    pub policy_result: usize,
    pub value_result: usize,
    pub score_value_result: usize,
    pub ownership_result: usize,
}

impl RowElementCounts {
    pub fn new(model: &ModelDescriptor, x_size: usize, y_size: usize) -> Self {
        let area = x_size * y_size;
        Self {
            spatial_input: model.num_input_channels() * area,
            global_input: model.num_input_global_channels(),
            policy_result: 1 + area,
            value_result: model.num_value_channels(),
            score_value_result: model.num_score_value_channels(),
            ownership_result: model.num_ownership_channels() * area,
        }
    }

    /// Bytes of one row of `elts` f32 elements.
    pub fn bytes(elts: usize) -> usize {
        elts * F32_BYTES
    }

    /// Total bytes of all float buffers for `max_batch_size` rows.
    pub fn total_bytes(&self, max_batch_size: usize) -> usize {
        let per_row = self.spatial_input
            + self.global_input
            + self.policy_result
            + self.value_result
            + self.score_value_result
            + self.ownership_result;
        Self::bytes(per_row * max_batch_size)
    }
}

// ---------------------------------------------------------------------------
// BatchInputs: what a provider consumes
// ---------------------------------------------------------------------------

/// Borrowed view of the first `batch_size` packed rows.
#[derive(Clone, Copy, Debug)]
pub struct BatchInputs<'a> {
    pub batch_size: usize,
    pub x_size: usize,
    pub y_size: usize,
    /// `batch_size * spatial_input` floats.
    pub spatial: &'a [f32],
    /// `batch_size * global_input` floats.
    pub global: &'a [f32],
    pub symmetries: &'a [bool; NUM_SYMMETRY_BOOLS],
}

// ---------------------------------------------------------------------------
// StagedRow: decoded results held in the arena
// ---------------------------------------------------------------------------

/// One row of decoded results in the staging buffers.
#[derive(Clone, Copy, Debug)]
pub struct StagedRow<'a> {
    pub policy: &'a [f32],
    pub value: &'a [f32],
    pub score_value: &'a [f32],
    pub ownership: &'a [f32],
    score_format: ScoreFormat,
}

impl StagedRow<'_> {
    pub fn win_prob(&self) -> f32 {
        self.value[0]
    }

    pub fn loss_prob(&self) -> f32 {
        self.value[1]
    }

    pub fn no_result_prob(&self) -> f32 {
        self.value[2]
    }

    pub fn score_mean(&self) -> f32 {
        self.score_value[0]
    }

    /// Mean of squares. Version 3 staging holds only the mean, so the
    /// square of the mean stands in.
    pub fn score_mean_sq(&self) -> f32 {
        match self.score_format {
            ScoreFormat::MeanOnly => self.score_value[0] * self.score_value[0],
            ScoreFormat::MeanAndSecondMoment => self.score_value[1],
        }
    }
}

/// Mutable staging row, written by the decoder.
pub(crate) struct StagedRowMut<'a> {
    pub policy: &'a mut [f32],
    pub value: &'a mut [f32],
    pub score_value: &'a mut [f32],
    pub ownership: &'a mut [f32],
}

// ---------------------------------------------------------------------------
// BatchBufferSet
// ---------------------------------------------------------------------------

/// Host memory for one batch, allocated once per (model, max batch, board
/// size) and reused across inference calls.
///
/// Not thread-safe by design: one compute worker owns one set.
pub struct BatchBufferSet {
    max_batch_size: usize,
    x_size: usize,
    y_size: usize,
    score_format: ScoreFormat,
    counts: RowElementCounts,

    spatial_input: Vec<f32>,
    global_input: Vec<f32>,
    symmetries: [bool; NUM_SYMMETRY_BOOLS],

    policy_results: Vec<f32>,
    value_results: Vec<f32>,
    score_value_results: Vec<f32>,
    ownership_results: Vec<f32>,
}

impl BatchBufferSet {
    /// Allocate every buffer for `max_batch_size` rows of an `x_size` by
    /// `y_size` board.
    ///
    /// Row contents are unspecified until the caller fills them; rows that
    /// were not filled for a batch must not be handed to a provider.
    pub fn allocate(
        model: &ModelDescriptor,
        max_batch_size: usize,
        x_size: usize,
        y_size: usize,
    ) -> Self {
        assert!(max_batch_size > 0, "max_batch_size must be positive");
        assert!(
            x_size > 0 && y_size > 0,
            "board extents must be positive, got {x_size}x{y_size}"
        );

        let counts = RowElementCounts::new(model, x_size, y_size);
        log::debug!(
            "allocating batch buffers for {}: {max_batch_size} rows of {x_size}x{y_size}, {} bytes",
            model.name(),
            counts.total_bytes(max_batch_size)
        );

        Self {
            max_batch_size,
            x_size,
            y_size,
            score_format: model.score_format(),
            counts,
            spatial_input: vec![0.0; max_batch_size * counts.spatial_input],
            global_input: vec![0.0; max_batch_size * counts.global_input],
            symmetries: [false; NUM_SYMMETRY_BOOLS],
            policy_results: vec![0.0; max_batch_size * counts.policy_result],
            value_results: vec![0.0; max_batch_size * counts.value_result],
            score_value_results: vec![0.0; max_batch_size * counts.score_value_result],
            ownership_results: vec![0.0; max_batch_size * counts.ownership_result],
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn x_size(&self) -> usize {
        self.x_size
    }

    pub fn y_size(&self) -> usize {
        self.y_size
    }

    pub fn row_element_counts(&self) -> RowElementCounts {
        self.counts
    }

    /// Bytes of the whole packed spatial input buffer.
    pub fn spatial_input_bytes(&self) -> usize {
        RowElementCounts::bytes(self.spatial_input.len())
    }

    /// Bytes of the whole packed global input buffer.
    pub fn global_input_bytes(&self) -> usize {
        RowElementCounts::bytes(self.global_input.len())
    }

    #[inline]
    fn row_range(&self, row: usize, width: usize) -> Range<usize> {
        assert!(
            row < self.max_batch_size,
            "row {row} out of range for max_batch_size {}",
            self.max_batch_size
        );
        row * width..(row + 1) * width
    }

    // ---- Inputs ----

    /// Writable spatial input of one row (`spatial_input` floats).
    ///
    /// Panics if `row >= max_batch_size`.
    pub fn spatial_row_mut(&mut self, row: usize) -> &mut [f32] {
        let range = self.row_range(row, self.counts.spatial_input);
        &mut self.spatial_input[range]
    }

    pub fn spatial_row(&self, row: usize) -> &[f32] {
        let range = self.row_range(row, self.counts.spatial_input);
        &self.spatial_input[range]
    }

    /// Writable global input of one row (`global_input` floats).
    ///
    /// Panics if `row >= max_batch_size`.
    pub fn global_row_mut(&mut self, row: usize) -> &mut [f32] {
        let range = self.row_range(row, self.counts.global_input);
        &mut self.global_input[range]
    }

    pub fn global_row(&self, row: usize) -> &[f32] {
        let range = self.row_range(row, self.counts.global_input);
        &self.global_input[range]
    }

    pub fn symmetries(&self) -> &[bool; NUM_SYMMETRY_BOOLS] {
        &self.symmetries
    }

    pub fn symmetries_mut(&mut self) -> &mut [bool; NUM_SYMMETRY_BOOLS] {
        &mut self.symmetries
    }

    /// Inputs of rows `0..batch_size`, ready for a provider.
    pub fn inputs(&self, batch_size: usize) -> BatchInputs<'_> {
        assert!(batch_size > 0, "empty batch");
        assert!(
            batch_size <= self.max_batch_size,
            "batch size {batch_size} exceeds max_batch_size {}",
            self.max_batch_size
        );
        BatchInputs {
            batch_size,
            x_size: self.x_size,
            y_size: self.y_size,
            spatial: &self.spatial_input[..batch_size * self.counts.spatial_input],
            global: &self.global_input[..batch_size * self.counts.global_input],
            symmetries: &self.symmetries,
        }
    }

    // ---- Staging ----

    /// Decoded results of one row, as written by
    /// [`OutputDecoder::stage`](crate::OutputDecoder::stage).
    pub fn staged_row(&self, row: usize) -> StagedRow<'_> {
        let c = self.counts;
        StagedRow {
            policy: &self.policy_results[self.row_range(row, c.policy_result)],
            value: &self.value_results[self.row_range(row, c.value_result)],
            score_value: &self.score_value_results[self.row_range(row, c.score_value_result)],
            ownership: &self.ownership_results[self.row_range(row, c.ownership_result)],
            score_format: self.score_format,
        }
    }

    pub(crate) fn staged_row_mut(&mut self, row: usize) -> StagedRowMut<'_> {
        let c = self.counts;
        let policy = self.row_range(row, c.policy_result);
        let value = self.row_range(row, c.value_result);
        let score_value = self.row_range(row, c.score_value_result);
        let ownership = self.row_range(row, c.ownership_result);
        StagedRowMut {
            policy: &mut self.policy_results[policy],
            value: &mut self.value_results[value],
            score_value: &mut self.score_value_results[score_value],
            ownership: &mut self.ownership_results[ownership],
        }
    }

    pub(crate) fn score_format(&self) -> ScoreFormat {
        self.score_format
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{v3_model, v5_model};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn row_counts_19x19() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 16, 19, 19);
        let c = buffers.row_element_counts();
        assert_eq!(c.spatial_input, 22 * 361);
        assert_eq!(c.global_input, 14);
        assert_eq!(c.policy_result, 362);
        assert_eq!(c.value_result, 3);
        assert_eq!(c.score_value_result, 2);
        assert_eq!(c.ownership_result, 361);
    }

    #[test]
    fn row_counts_v3_score() {
        let buffers = BatchBufferSet::allocate(&v3_model(), 4, 9, 9);
        assert_eq!(buffers.row_element_counts().score_value_result, 1);
    }

    #[test]
    fn rectangular_board_counts() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 2, 7, 5);
        let c = buffers.row_element_counts();
        assert_eq!(c.spatial_input, 22 * 35);
        assert_eq!(c.policy_result, 36);
        assert_eq!(c.ownership_result, 35);
    }

    #[test]
    fn byte_sizes() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 8, 9, 9);
        assert_eq!(buffers.spatial_input_bytes(), 8 * 22 * 81 * 4);
        assert_eq!(buffers.global_input_bytes(), 8 * 14 * 4);
        let c = buffers.row_element_counts();
        let per_row = 22 * 81 + 14 + 82 + 3 + 2 + 81;
        assert_eq!(c.total_bytes(8), per_row * 8 * 4);
    }

    #[test]
    fn spatial_rows_are_contiguous_with_fixed_stride() {
        let mut buffers = BatchBufferSet::allocate(&v5_model(), 6, 9, 9);
        let stride = buffers.row_element_counts().spatial_input;
        let base = buffers.spatial_input.as_ptr() as usize;
        for row in 0..6 {
            let start = buffers.spatial_row_mut(row).as_ptr() as usize;
            assert_eq!((start - base) / std::mem::size_of::<f32>(), row * stride);
            assert_eq!(buffers.spatial_row(row).len(), stride);
        }
    }

    #[test]
    fn global_rows_are_contiguous_with_fixed_stride() {
        let mut buffers = BatchBufferSet::allocate(&v5_model(), 6, 9, 9);
        let stride = buffers.row_element_counts().global_input;
        for row in 0..5 {
            let a = buffers.global_row_mut(row).as_ptr() as usize;
            let b = buffers.global_row_mut(row + 1).as_ptr() as usize;
            assert_eq!((b - a) / std::mem::size_of::<f32>(), stride);
        }
    }

    #[test]
    fn rows_do_not_overlap() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut buffers = BatchBufferSet::allocate(&v5_model(), 5, 9, 9);
        let mut expected: Vec<Vec<f32>> = Vec::new();
        for row in 0..5 {
            let data: Vec<f32> = (0..buffers.row_element_counts().spatial_input)
                .map(|_| rng.gen_range(-1.0..1.0))
                .collect();
            buffers.spatial_row_mut(row).copy_from_slice(&data);
            expected.push(data);
        }
        for (row, data) in expected.iter().enumerate() {
            assert_eq!(buffers.spatial_row(row), &data[..]);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn spatial_row_past_end_panics() {
        let mut buffers = BatchBufferSet::allocate(&v5_model(), 4, 9, 9);
        let _ = buffers.spatial_row_mut(4);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn global_row_past_end_panics() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 4, 9, 9);
        let _ = buffers.global_row(17);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn staged_row_past_end_panics() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 2, 9, 9);
        let _ = buffers.staged_row(2);
    }

    #[test]
    fn symmetry_flags_independent_of_batch_size() {
        let mut small = BatchBufferSet::allocate(&v5_model(), 1, 9, 9);
        let big = BatchBufferSet::allocate(&v5_model(), 256, 9, 9);
        assert_eq!(small.symmetries().len(), NUM_SYMMETRY_BOOLS);
        assert_eq!(big.symmetries().len(), NUM_SYMMETRY_BOOLS);

        small.symmetries_mut()[1] = true;
        assert_eq!(small.symmetries(), &[false, true, false]);
    }

    #[test]
    fn inputs_view_covers_filled_rows_only() {
        let mut buffers = BatchBufferSet::allocate(&v5_model(), 8, 9, 9);
        buffers.spatial_row_mut(2).fill(2.0);
        buffers.global_row_mut(2).fill(3.0);
        buffers.symmetries_mut()[0] = true;

        let inputs = buffers.inputs(3);
        let c = buffers.row_element_counts();
        assert_eq!(inputs.batch_size, 3);
        assert_eq!((inputs.x_size, inputs.y_size), (9, 9));
        assert_eq!(inputs.spatial.len(), 3 * c.spatial_input);
        assert_eq!(inputs.global.len(), 3 * c.global_input);
        assert!(inputs.spatial[2 * c.spatial_input..].iter().all(|&v| v == 2.0));
        assert!(inputs.global[2 * c.global_input..].iter().all(|&v| v == 3.0));
        assert!(inputs.symmetries[0]);
    }

    #[test]
    #[should_panic(expected = "empty batch")]
    fn inputs_of_empty_batch_panics() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 8, 9, 9);
        let _ = buffers.inputs(0);
    }

    #[test]
    #[should_panic(expected = "exceeds max_batch_size")]
    fn inputs_of_oversized_batch_panics() {
        let buffers = BatchBufferSet::allocate(&v5_model(), 8, 9, 9);
        let _ = buffers.inputs(9);
    }

    #[test]
    #[should_panic(expected = "max_batch_size must be positive")]
    fn zero_capacity_panics() {
        let _ = BatchBufferSet::allocate(&v5_model(), 0, 9, 9);
    }

    #[test]
    #[should_panic(expected = "board extents")]
    fn zero_extent_panics() {
        let _ = BatchBufferSet::allocate(&v5_model(), 1, 0, 9);
    }
}
