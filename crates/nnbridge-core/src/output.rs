use crate::handle::{policy_size, InferenceHandle};

/// Decoded prediction for one position, owned by the search engine.
///
/// Values are from the perspective of the player to move, despite the
/// `white_` names; the search engine post-processes them. Policy entries
/// are raw network outputs, not yet softmaxed.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredOutput {
    pub nn_x_len: usize,
    pub nn_y_len: usize,

    pub white_win_prob: f32,
    pub white_loss_prob: f32,
    pub white_no_result_prob: f32,

    pub white_score_mean: f32,
    pub white_score_mean_sq: f32,

    /// `nn_x_len * nn_y_len + 1` entries, pass last.
    pub policy: Vec<f32>,
    /// Row-major ownership map. `None` means the caller does not want one
    /// and the decoder leaves it alone.
    pub owner_map: Option<Vec<f32>>,
}

impl StructuredOutput {
    /// Record without an ownership destination.
    pub fn new(nn_x_len: usize, nn_y_len: usize) -> Self {
        Self {
            nn_x_len,
            nn_y_len,
            white_win_prob: 0.0,
            white_loss_prob: 0.0,
            white_no_result_prob: 0.0,
            white_score_mean: 0.0,
            white_score_mean_sq: 0.0,
            policy: vec![0.0; policy_size(nn_x_len, nn_y_len)],
            owner_map: None,
        }
    }

    /// Record that also receives the ownership map.
    pub fn with_ownership(nn_x_len: usize, nn_y_len: usize) -> Self {
        Self {
            owner_map: Some(vec![0.0; nn_x_len * nn_y_len]),
            ..Self::new(nn_x_len, nn_y_len)
        }
    }

    /// One record per row of `handle`'s capacity.
    pub fn batch_for(handle: &InferenceHandle, want_ownership: bool) -> Vec<Self> {
        let (x, y) = (handle.nn_x_len(), handle.nn_y_len());
        (0..handle.max_batch_size())
            .map(|_| {
                if want_ownership {
                    Self::with_ownership(x, y)
                } else {
                    Self::new(x, y)
                }
            })
            .collect()
    }
}
