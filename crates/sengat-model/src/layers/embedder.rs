//! Node embedding: vocabulary lookup plus sinusoidal positions.

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::Rng;
use sengat_core::VocabId;

use crate::error::{map_candle, ModelError, ModelResult};

/// Embeds each node's vocabulary id and adds a fixed sinusoidal encoding of
/// its within-graph position.
///
/// The table may be initialized from a pretrained matrix (the vocabulary
/// stage's embedding attribute); otherwise it is small-uniform initialized
/// with the PAD row (id 0) pinned to zero.
pub struct NodeEmbedder {
    table: Tensor,
    embedding_dim: usize,
}

impl NodeEmbedder {
    pub fn new(
        vocab_size: usize,
        embedding_dim: usize,
        pretrained: Option<Tensor>,
        rng: &mut StdRng,
        device: &Device,
    ) -> ModelResult<Self> {
        if vocab_size == 0 || embedding_dim == 0 {
            return Err(ModelError::configuration(format!(
                "embedding table dimensions must be > 0, got {}x{}",
                vocab_size, embedding_dim
            )));
        }
        let table = match pretrained {
            Some(matrix) => {
                let (rows, cols) = matrix.dims2().map_err(map_candle)?;
                if rows != vocab_size || cols != embedding_dim {
                    return Err(ModelError::configuration(format!(
                        "pretrained embedding matrix is {}x{}, expected {}x{}",
                        rows, cols, vocab_size, embedding_dim
                    )));
                }
                matrix.to_device(device).map_err(map_candle)?
            }
            None => {
                let mut data: Vec<f32> = vec![0.0; embedding_dim];
                data.extend(
                    (0..(vocab_size - 1) * embedding_dim).map(|_| rng.gen_range(-0.1..0.1f32)),
                );
                Tensor::from_vec(data, (vocab_size, embedding_dim), device).map_err(map_candle)?
            }
        };
        Ok(Self {
            table,
            embedding_dim,
        })
    }

    /// `vocab_ids` and `position_ids` are parallel per-node sequences from
    /// the coalesced batch. Returns `[N, embedding_dim]`.
    pub fn forward(&self, vocab_ids: &[VocabId], position_ids: &[usize]) -> ModelResult<Tensor> {
        if vocab_ids.len() != position_ids.len() {
            return Err(ModelError::configuration(format!(
                "vocab_ids ({}) and position_ids ({}) must have equal length",
                vocab_ids.len(),
                position_ids.len()
            )));
        }
        let device = self.table.device();
        let ids: Vec<u32> = vocab_ids.iter().map(|&id| id as u32).collect();
        let ids = Tensor::from_vec(ids, (vocab_ids.len(),), device).map_err(map_candle)?;
        let tokens = self.table.index_select(&ids, 0).map_err(map_candle)?;
        let positions = sinusoidal_encoding(position_ids, self.embedding_dim, device)?;
        (tokens + positions).map_err(map_candle)
    }

    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        self.table.device()
    }
}

/// Classic transformer sinusoid: even channels sine, odd channels cosine,
/// wavelengths geometric in `10000^(2i/dim)`.
fn sinusoidal_encoding(
    position_ids: &[usize],
    dim: usize,
    device: &Device,
) -> ModelResult<Tensor> {
    let mut data = Vec::with_capacity(position_ids.len() * dim);
    for &pos in position_ids {
        for channel in 0..dim {
            let exponent = (2 * (channel / 2)) as f64 / dim as f64;
            let angle = pos as f64 / 10000f64.powf(exponent);
            let value = if channel % 2 == 0 {
                angle.sin()
            } else {
                angle.cos()
            };
            data.push(value as f32);
        }
    }
    Tensor::from_vec(data, (position_ids.len(), dim), device).map_err(map_candle)
}
