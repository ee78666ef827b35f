//! Position-wise feed-forward sublayer.

use candle_core::Device;
use candle_core::Tensor;
use rand::rngs::StdRng;

use crate::error::{map_candle, ModelResult};
use crate::layers::linear::Linear;
use crate::layers::{apply_dropout, RunMode};

/// Two-layer MLP applied independently at every node:
/// `dropout(W2 relu(W1 x + b1) + b2)`.
pub struct FeedForward {
    inner: Linear,
    outer: Linear,
    dropout_p: f32,
}

impl FeedForward {
    pub fn new(
        embedding_dim: usize,
        intermediate_dim: usize,
        dropout_p: f32,
        rng: &mut StdRng,
        device: &Device,
    ) -> ModelResult<Self> {
        Ok(Self {
            inner: Linear::new(embedding_dim, intermediate_dim, rng, device)?,
            outer: Linear::new(intermediate_dim, embedding_dim, rng, device)?,
            dropout_p,
        })
    }

    /// `[N, E] -> [N, E]`.
    pub fn forward(&self, input: &Tensor, mode: &mut RunMode) -> ModelResult<Tensor> {
        let hidden = self.inner.forward(input)?.relu().map_err(map_candle)?;
        let out = self.outer.forward(&hidden)?;
        apply_dropout(&out, self.dropout_p, mode)
    }
}
