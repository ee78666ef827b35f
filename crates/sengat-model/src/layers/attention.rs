//! Multi-head attention restricted to a graph's edge structure.
//!
//! Computes `softmax((QK^T + edge_key_bias) / sqrt(d) + mask_penalty) @ V`
//! per head over a flat node set. The adjacency mask is what makes the
//! attention graph-restricted rather than global: positions with no edge
//! receive a large negative additive penalty and end up with zero weight.
//!
//! Transposes are followed by `contiguous()` for matmul layout
//! compatibility.

use candle_core::{Device, Tensor, D};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::EncoderConfig;
use crate::error::{map_candle, ModelError, ModelResult};
use crate::layers::linear::Linear;
use crate::layers::{apply_dropout, RunMode};

/// Additive penalty for masked positions. Large enough that softmax assigns
/// them zero weight, finite so that fully-isolated rows stay NaN-free (they
/// are zeroed explicitly afterwards).
const MASK_PENALTY: f64 = -1e9;

/// How per-head outputs are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadMerge {
    /// Concatenate heads, then output-project. Used by every layer whose
    /// output feeds another attention layer.
    Concat,
    /// Mean of the per-head output projections (the concatenated projection
    /// scaled by `1/H`). Used by the final layer, whose multi-head structure
    /// no downstream layer consumes.
    Average,
}

/// One edge-masked multi-head attention layer.
///
/// Each head owns an independent slice of the Q/K/V projections. When edge
/// features are enabled, a learned `[num_edge_types + 1, head_dim]` table is
/// indexed by the batch's edge-type ids; the final row is the reserved
/// "no edge"/padding type and is pinned to zero so untyped positions
/// contribute no bias.
pub struct GraphMultiHeadAttention {
    w_q: Linear,
    w_k: Linear,
    w_v: Linear,
    w_o: Linear,
    key_edge_bias: Option<Tensor>,
    value_edge_bias: Option<Tensor>,
    num_heads: usize,
    head_dim: usize,
    edge_dropout_p: f32,
    merge: HeadMerge,
}

impl GraphMultiHeadAttention {
    /// Build a layer from the encoder configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if `embedding_dim` does not
    /// divide evenly into `num_heads`.
    pub fn new(
        config: &EncoderConfig,
        merge: HeadMerge,
        rng: &mut StdRng,
        device: &Device,
    ) -> ModelResult<Self> {
        if config.num_heads == 0 || config.embedding_dim % config.num_heads != 0 {
            return Err(ModelError::configuration(format!(
                "embedding_dim {} is not divisible by num_heads {}",
                config.embedding_dim, config.num_heads
            )));
        }
        let head_dim = config.head_dim();
        let embed_dim = config.embedding_dim;

        let key_edge_bias = if config.use_edge_key_bias {
            Some(edge_bias_table(config.num_edge_types, head_dim, rng, device)?)
        } else {
            None
        };
        let value_edge_bias = if config.use_edge_value_bias {
            Some(edge_bias_table(config.num_edge_types, head_dim, rng, device)?)
        } else {
            None
        };

        Ok(Self {
            w_q: Linear::new(embed_dim, embed_dim, rng, device)?,
            w_k: Linear::new(embed_dim, embed_dim, rng, device)?,
            w_v: Linear::new(embed_dim, embed_dim, rng, device)?,
            w_o: Linear::new(embed_dim, embed_dim, rng, device)?,
            key_edge_bias,
            value_edge_bias,
            num_heads: config.num_heads,
            head_dim,
            edge_dropout_p: config.edge_dropout_p,
            merge,
        })
    }

    /// Attend over the batch graph.
    ///
    /// - `node_features`: `[N, embedding_dim]`
    /// - `adjacency_mask`: `[N, N]` with `mask[src, dst] = 1` per edge;
    ///   diagonal self-loops are the caller's choice
    /// - `edge_type_ids`: `[N, N]` u32, defined wherever the mask is 1 and
    ///   holding the reserved padding id elsewhere
    ///
    /// A node whose mask row is all zero produces an exactly-zero output
    /// row: softmax over a row of penalties would be uniform (or NaN with a
    /// true `-inf`), so attention weights are multiplied by a per-row
    /// has-any-edge indicator before the value sum.
    pub fn forward(
        &self,
        node_features: &Tensor,
        adjacency_mask: &Tensor,
        edge_type_ids: Option<&Tensor>,
        mode: &mut RunMode,
    ) -> ModelResult<Tensor> {
        let (num_nodes, _embed_dim) = node_features.dims2().map_err(map_candle)?;

        let q = split_heads(&self.w_q.forward(node_features)?, num_nodes, self.num_heads, self.head_dim)?;
        let k = split_heads(&self.w_k.forward(node_features)?, num_nodes, self.num_heads, self.head_dim)?;
        let v = split_heads(&self.w_v.forward(node_features)?, num_nodes, self.num_heads, self.head_dim)?;

        // QK^T: [heads, N, N]
        let k_t = k
            .transpose(1, 2)
            .map_err(map_candle)?
            .contiguous()
            .map_err(map_candle)?;
        let mut scores = q.matmul(&k_t).map_err(map_candle)?;

        if let (Some(table), Some(ids)) = (&self.key_edge_bias, edge_type_ids) {
            let bias = edge_key_logits(&q, table, ids, num_nodes, self.head_dim)?;
            scores = (scores + bias).map_err(map_candle)?;
        }

        let scale = (self.head_dim as f64).sqrt();
        let scores = (scores / scale).map_err(map_candle)?;

        // Masked positions get a large negative penalty: (1 - mask) * -1e9.
        let penalty = adjacency_mask
            .affine(-1.0, 1.0)
            .map_err(map_candle)?
            .affine(MASK_PENALTY, 0.0)
            .map_err(map_candle)?;
        let scores = scores
            .broadcast_add(&penalty.unsqueeze(0).map_err(map_candle)?)
            .map_err(map_candle)?;

        let attn = candle_nn::ops::softmax(&scores, D::Minus1).map_err(map_candle)?;

        // Zero out rows with no edges at all.
        let row_indicator = adjacency_mask
            .sum_keepdim(D::Minus1)
            .map_err(map_candle)?
            .clamp(0f32, 1f32)
            .map_err(map_candle)?;
        let attn = attn
            .broadcast_mul(&row_indicator.unsqueeze(0).map_err(map_candle)?)
            .map_err(map_candle)?;

        let attn = apply_dropout(&attn, self.edge_dropout_p, mode)?;

        // Context: [heads, N, head_dim]
        let mut context = attn.matmul(&v).map_err(map_candle)?;

        if let (Some(table), Some(ids)) = (&self.value_edge_bias, edge_type_ids) {
            let extra = edge_value_context(&attn, table, ids, num_nodes, self.head_dim)?;
            context = (context + extra).map_err(map_candle)?;
        }

        // [heads, N, head_dim] -> [N, heads * head_dim]
        let merged = context
            .transpose(0, 1)
            .map_err(map_candle)?
            .contiguous()
            .map_err(map_candle)?
            .reshape((num_nodes, self.num_heads * self.head_dim))
            .map_err(map_candle)?;
        let projected = self.w_o.forward(&merged)?;

        match self.merge {
            HeadMerge::Concat => Ok(projected),
            HeadMerge::Average => projected
                .affine(1.0 / self.num_heads as f64, 0.0)
                .map_err(map_candle),
        }
    }

    #[must_use]
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.head_dim
    }
}

/// `[N, E] -> [heads, N, head_dim]`.
fn split_heads(x: &Tensor, num_nodes: usize, heads: usize, head_dim: usize) -> ModelResult<Tensor> {
    x.reshape((num_nodes, heads, head_dim))
        .map_err(map_candle)?
        .transpose(0, 1)
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)
}

/// Learned per-edge-type vectors, `[num_edge_types + 1, head_dim]`, with the
/// padding row pinned to zero.
fn edge_bias_table(
    num_edge_types: usize,
    head_dim: usize,
    rng: &mut StdRng,
    device: &Device,
) -> ModelResult<Tensor> {
    let rows = num_edge_types + 1;
    let limit = (6.0 / (rows + head_dim) as f64).sqrt();
    let mut data: Vec<f32> = (0..num_edge_types * head_dim)
        .map(|_| rng.gen_range(-limit..limit) as f32)
        .collect();
    data.extend(std::iter::repeat(0f32).take(head_dim));
    Tensor::from_vec(data, (rows, head_dim), device).map_err(map_candle)
}

/// Gather per-pair edge vectors: `[N, N] ids -> [N, N, head_dim]`.
fn lookup_edge_vectors(
    table: &Tensor,
    edge_type_ids: &Tensor,
    num_nodes: usize,
    head_dim: usize,
) -> ModelResult<Tensor> {
    let flat = edge_type_ids.flatten_all().map_err(map_candle)?;
    table
        .index_select(&flat, 0)
        .map_err(map_candle)?
        .reshape((num_nodes, num_nodes, head_dim))
        .map_err(map_candle)
}

/// Bias logits `b[h, i, j] = q[h, i, :] . edge_vec[i, j, :]`, batched over
/// the query node axis.
fn edge_key_logits(
    q: &Tensor,
    table: &Tensor,
    edge_type_ids: &Tensor,
    num_nodes: usize,
    head_dim: usize,
) -> ModelResult<Tensor> {
    let edge_vecs = lookup_edge_vectors(table, edge_type_ids, num_nodes, head_dim)?;
    // [N, head_dim, N]
    let edge_vecs_t = edge_vecs
        .transpose(1, 2)
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)?;
    // [N, heads, head_dim]
    let q_per_node = q
        .permute((1, 0, 2))
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)?;
    // [N, heads, N] -> [heads, N, N]
    q_per_node
        .matmul(&edge_vecs_t)
        .map_err(map_candle)?
        .permute((1, 0, 2))
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)
}

/// Extra context `c[h, i, :] += sum_j attn[h, i, j] * edge_vec[i, j, :]`.
fn edge_value_context(
    attn: &Tensor,
    table: &Tensor,
    edge_type_ids: &Tensor,
    num_nodes: usize,
    head_dim: usize,
) -> ModelResult<Tensor> {
    let edge_vecs = lookup_edge_vectors(table, edge_type_ids, num_nodes, head_dim)?;
    // [N, heads, N]
    let attn_per_node = attn
        .permute((1, 0, 2))
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)?;
    // [N, heads, head_dim] -> [heads, N, head_dim]
    attn_per_node
        .matmul(&edge_vecs)
        .map_err(map_candle)?
        .permute((1, 0, 2))
        .map_err(map_candle)?
        .contiguous()
        .map_err(map_candle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn small_config() -> EncoderConfig {
        EncoderConfig {
            embedding_dim: 8,
            num_heads: 2,
            num_layers: 1,
            intermediate_dim: 16,
            num_edge_types: 2,
            use_edge_key_bias: false,
            use_edge_value_bias: false,
            edge_dropout_p: 0.0,
            feat_dropout_p: 0.0,
            residual: crate::config::ResidualPolicy::Plain,
        }
    }

    fn features(num_nodes: usize, dim: usize) -> Tensor {
        let data: Vec<f32> = (0..num_nodes * dim)
            .map(|i| (i as f32 * 0.17).sin() * 0.5)
            .collect();
        Tensor::from_vec(data, (num_nodes, dim), &Device::Cpu).unwrap()
    }

    fn mask_from_edges(num_nodes: usize, edges: &[(usize, usize)]) -> Tensor {
        let mut data = vec![0f32; num_nodes * num_nodes];
        for &(src, dst) in edges {
            data[src * num_nodes + dst] = 1.0;
        }
        Tensor::from_vec(data, (num_nodes, num_nodes), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_output_shape() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(1);
        let layer =
            GraphMultiHeadAttention::new(&config, HeadMerge::Concat, &mut rng, &Device::Cpu)
                .unwrap();

        let x = features(4, 8);
        let mask = mask_from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]);
        let out = layer.forward(&x, &mask, None, &mut RunMode::eval()).unwrap();
        assert_eq!(out.dims(), &[4, 8]);
    }

    #[test]
    fn test_isolated_node_outputs_zero() {
        let config = small_config();
        let mut rng = StdRng::seed_from_u64(2);
        let layer =
            GraphMultiHeadAttention::new(&config, HeadMerge::Concat, &mut rng, &Device::Cpu)
                .unwrap();

        // Node 2 has no edges at all.
        let x = features(3, 8);
        let mask = mask_from_edges(3, &[(0, 1)]);
        let out = layer.forward(&x, &mask, None, &mut RunMode::eval()).unwrap();
        let rows = out.to_vec2::<f32>().unwrap();

        assert!(rows[2].iter().all(|v| v.abs() < 1e-6), "row 2 = {:?}", rows[2]);
        assert!(rows[2].iter().all(|v| v.is_finite()));
        // Bias of the output projection still applies nothing: the context
        // row is zero, so only w_o's zero-initialized bias remains.
        assert!(rows[0].iter().any(|v| v.abs() > 1e-6));
    }

    #[test]
    fn test_edge_bias_table_padding_row_is_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let table = edge_bias_table(3, 4, &mut rng, &Device::Cpu).unwrap();
        let rows = table.to_vec2::<f32>().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows[3].iter().all(|&v| v == 0.0));
        assert!(rows[0].iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_average_merge_scales_output() {
        let config = small_config();
        let concat = GraphMultiHeadAttention::new(
            &config,
            HeadMerge::Concat,
            &mut StdRng::seed_from_u64(4),
            &Device::Cpu,
        )
        .unwrap();
        let average = GraphMultiHeadAttention::new(
            &config,
            HeadMerge::Average,
            &mut StdRng::seed_from_u64(4),
            &Device::Cpu,
        )
        .unwrap();

        let x = features(3, 8);
        let mask = mask_from_edges(3, &[(0, 1), (1, 0), (2, 0)]);
        let a = concat.forward(&x, &mask, None, &mut RunMode::eval()).unwrap();
        let b = average.forward(&x, &mask, None, &mut RunMode::eval()).unwrap();

        let a = a.to_vec2::<f32>().unwrap();
        let b = b.to_vec2::<f32>().unwrap();
        for (row_a, row_b) in a.iter().zip(&b) {
            for (&va, &vb) in row_a.iter().zip(row_b) {
                assert!((va / 2.0 - vb).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_indivisible_head_count_rejected() {
        let config = EncoderConfig {
            embedding_dim: 10,
            num_heads: 4,
            ..small_config()
        };
        let result = GraphMultiHeadAttention::new(
            &config,
            HeadMerge::Concat,
            &mut StdRng::seed_from_u64(5),
            &Device::Cpu,
        );
        assert!(matches!(result, Err(ModelError::Configuration { .. })));
    }
}
