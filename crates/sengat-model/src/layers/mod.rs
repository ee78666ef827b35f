//! Neural sublayers with tensor-owned weights.

pub mod attention;
pub mod embedder;
pub mod feed_forward;
pub mod linear;
pub mod residual;

pub use attention::{GraphMultiHeadAttention, HeadMerge};
pub use embedder::NodeEmbedder;
pub use feed_forward::FeedForward;
pub use linear::Linear;
pub use residual::Residual;

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{map_candle, ModelResult};

/// Train/eval switch.
///
/// Training mode carries the rng that samples dropout masks, so a given
/// seed reproduces a run exactly; evaluation mode makes every dropout a
/// no-op.
pub enum RunMode {
    Train(StdRng),
    Eval,
}

impl RunMode {
    /// Training mode with a deterministic dropout rng.
    #[must_use]
    pub fn train(seed: u64) -> Self {
        RunMode::Train(StdRng::seed_from_u64(seed))
    }

    /// Inference mode; dropout layers pass inputs through unchanged.
    #[must_use]
    pub fn eval() -> Self {
        RunMode::Eval
    }

    #[must_use]
    pub fn is_train(&self) -> bool {
        matches!(self, RunMode::Train(_))
    }
}

/// Inverted dropout: zero each element with probability `p` and rescale the
/// survivors by `1/(1-p)`. No-op in eval mode or when `p == 0`.
pub(crate) fn apply_dropout(x: &Tensor, p: f32, mode: &mut RunMode) -> ModelResult<Tensor> {
    let rng = match mode {
        RunMode::Train(rng) if p > 0.0 => rng,
        _ => return Ok(x.clone()),
    };
    let keep = 1.0 - p;
    let mask: Vec<f32> = (0..x.elem_count())
        .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
        .collect();
    let mask = Tensor::from_vec(mask, x.dims().to_vec(), x.device()).map_err(map_candle)?;
    x.mul(&mask).map_err(map_candle)
}
