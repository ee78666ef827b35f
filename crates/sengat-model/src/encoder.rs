//! The stacked graph-attention encoder.

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use sengat_core::VocabId;

use crate::config::EncoderConfig;
use crate::error::ModelResult;
use crate::layers::{
    FeedForward, GraphMultiHeadAttention, HeadMerge, NodeEmbedder, Residual, RunMode,
};

/// One attention + feed-forward block with its residual connections.
struct EncoderBlock {
    attention: GraphMultiHeadAttention,
    attention_residual: Residual,
    feed_forward: FeedForward,
    feed_forward_residual: Residual,
}

impl EncoderBlock {
    fn forward(
        &self,
        input: &Tensor,
        adjacency_mask: &Tensor,
        edge_type_ids: Option<&Tensor>,
        mode: &mut RunMode,
    ) -> ModelResult<Tensor> {
        let attended = self
            .attention
            .forward(input, adjacency_mask, edge_type_ids, mode)?;
        let hidden = self.attention_residual.apply(input, &attended)?;
        let transformed = self.feed_forward.forward(&hidden, mode)?;
        self.feed_forward_residual.apply(&hidden, &transformed)
    }
}

/// L stacked blocks over an embedded, coalesced node set.
///
/// The first block applies no residual (the embeddings are inputs, not a
/// prior representation being refined); later blocks follow the configured
/// policy. The final block averages its heads instead of concatenating,
/// since nothing downstream consumes its multi-head structure.
pub struct GraphEncoder {
    embedder: NodeEmbedder,
    blocks: Vec<EncoderBlock>,
}

impl GraphEncoder {
    /// Build the full stack. `rng` drives every weight initialization, so
    /// one seed reproduces the model exactly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelError::Configuration`] if the configuration is
    /// invalid or a pretrained matrix has the wrong shape.
    pub fn new(
        config: &EncoderConfig,
        vocab_size: usize,
        pretrained_embeddings: Option<Tensor>,
        rng: &mut StdRng,
        device: &Device,
    ) -> ModelResult<Self> {
        config.validate()?;

        let embedder = NodeEmbedder::new(
            vocab_size,
            config.embedding_dim,
            pretrained_embeddings,
            rng,
            device,
        )?;

        let mut blocks = Vec::with_capacity(config.num_layers);
        for layer in 0..config.num_layers {
            let first = layer == 0;
            let last = layer + 1 == config.num_layers;
            let merge = if last {
                HeadMerge::Average
            } else {
                HeadMerge::Concat
            };
            let attention_residual = if first {
                Residual::none()
            } else {
                Residual::from_policy(config.residual, device)?
            };
            let feed_forward_residual = if first {
                Residual::none()
            } else {
                Residual::from_policy(config.residual, device)?
            };
            blocks.push(EncoderBlock {
                attention: GraphMultiHeadAttention::new(config, merge, rng, device)?,
                attention_residual,
                feed_forward: FeedForward::new(
                    config.embedding_dim,
                    config.intermediate_dim,
                    config.feat_dropout_p,
                    rng,
                    device,
                )?,
                feed_forward_residual,
            });
        }

        Ok(Self { embedder, blocks })
    }

    /// Encode a coalesced batch: `vocab_ids`/`position_ids` are the
    /// parallel per-node sequences, the mask and optional edge-type ids are
    /// `[N, N]`. Returns `[N, embedding_dim]`.
    pub fn forward(
        &self,
        vocab_ids: &[VocabId],
        position_ids: &[usize],
        adjacency_mask: &Tensor,
        edge_type_ids: Option<&Tensor>,
        mode: &mut RunMode,
    ) -> ModelResult<Tensor> {
        let mut hidden = self.embedder.forward(vocab_ids, position_ids)?;
        for block in &self.blocks {
            hidden = block.forward(&hidden, adjacency_mask, edge_type_ids, mode)?;
        }
        Ok(hidden)
    }

    #[must_use]
    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        self.embedder.device()
    }
}
