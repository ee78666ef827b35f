//! Sequence classification over sentence graphs.
//!
//! Per batch: inject a CLS node into every graph, optionally symmetrize,
//! coalesce, run the encoder over the flat node set, read out each
//! example's CLS row and project it to class logits.

use candle_core::{Device, Tensor, D};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sengat_core::{coalesce, inject_cls_node, symmetrize, CoalescedBatch, Graph};
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::encoder::GraphEncoder;
use crate::error::{map_candle, ModelError, ModelResult};
use crate::layers::{apply_dropout, Linear, RunMode};

/// Graph-attention classifier with a CLS pooling head.
pub struct SequenceClassifier {
    config: ClassifierConfig,
    encoder: GraphEncoder,
    output: Linear,
    device: Device,
}

impl SequenceClassifier {
    /// Build the classifier. `pretrained_embeddings`, if given, initializes
    /// the vocabulary table (shape `[vocab_size, embedding_dim]`); `seed`
    /// drives all weight initialization.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] on an invalid configuration,
    /// before any weights are built.
    pub fn new(
        config: ClassifierConfig,
        pretrained_embeddings: Option<Tensor>,
        seed: u64,
        device: &Device,
    ) -> ModelResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);

        let encoder = GraphEncoder::new(
            &config.encoder,
            config.vocab_size,
            pretrained_embeddings,
            &mut rng,
            device,
        )?;
        let output = Linear::new(
            config.encoder.embedding_dim,
            config.num_classes,
            &mut rng,
            device,
        )?;

        Ok(Self {
            config,
            encoder,
            output,
            device: device.clone(),
        })
    }

    /// Inject CLS nodes, optionally symmetrize, and coalesce the batch.
    ///
    /// After this every `key_node_groups` entry is the singleton CLS node
    /// of one example.
    pub fn prepare_batch(&self, graphs: &[Graph]) -> ModelResult<CoalescedBatch> {
        let injected = graphs
            .iter()
            .map(|graph| {
                inject_cls_node(graph, self.config.cls_vocab_id, self.config.cls_edge_type)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut batch = coalesce(&injected)?;

        if self.config.undirected {
            let (edges, edge_types) = symmetrize(&batch.edges, &batch.edge_types);
            batch.edges = edges;
            batch.edge_types = edge_types;
        }
        Ok(batch)
    }

    /// Dense `[N, N]` 0/1 mask with `mask[src, dst] = 1` per batch edge,
    /// plus the diagonal when self-loops are configured.
    pub fn adjacency_mask(&self, batch: &CoalescedBatch) -> ModelResult<Tensor> {
        let n = batch.num_nodes();
        let mut data = vec![0f32; n * n];
        for &(src, dst) in &batch.edges {
            data[src * n + dst] = 1.0;
        }
        if self.config.add_self_loops {
            for i in 0..n {
                data[i * n + i] = 1.0;
            }
        }
        Tensor::from_vec(data, (n, n), &self.device).map_err(map_candle)
    }

    /// Dense `[N, N]` u32 edge-type ids; positions without an edge (the
    /// self-loop diagonal included) hold the reserved padding id and so
    /// contribute no type-specific signal.
    pub fn edge_type_ids(&self, batch: &CoalescedBatch) -> ModelResult<Tensor> {
        let n = batch.num_nodes();
        let padding = self.config.encoder.padding_edge_type() as u32;
        let mut data = vec![padding; n * n];
        for (&(src, dst), &edge_type) in batch.edges.iter().zip(&batch.edge_types) {
            data[src * n + dst] = edge_type as u32;
        }
        Tensor::from_vec(data, (n, n), &self.device).map_err(map_candle)
    }

    /// Class logits for a batch of graphs: `[batch_size, num_classes]`.
    pub fn forward(&self, graphs: &[Graph], mode: &mut RunMode) -> ModelResult<Tensor> {
        if graphs.is_empty() {
            return Err(ModelError::configuration("cannot classify an empty batch"));
        }
        let batch = self.prepare_batch(graphs)?;
        debug!(
            examples = graphs.len(),
            nodes = batch.num_nodes(),
            edges = batch.edges.len(),
            "prepared batch"
        );

        let mask = self.adjacency_mask(&batch)?;
        let edge_ids = if self.config.encoder.use_edge_key_bias
            || self.config.encoder.use_edge_value_bias
        {
            Some(self.edge_type_ids(&batch)?)
        } else {
            None
        };

        let hidden = self.encoder.forward(
            &batch.node_to_vocab_id,
            &batch.position_ids,
            &mask,
            edge_ids.as_ref(),
            mode,
        )?;

        // One key node per example after CLS injection.
        let cls_rows: Vec<u32> = batch
            .key_node_groups
            .iter()
            .map(|group| group[0] as u32)
            .collect();
        let cls_rows =
            Tensor::from_vec(cls_rows, (batch.key_node_groups.len(),), &self.device)
                .map_err(map_candle)?;
        let pooled = hidden.index_select(&cls_rows, 0).map_err(map_candle)?;

        let pooled = apply_dropout(&pooled, self.config.encoder.feat_dropout_p, mode)?;
        self.output.forward(&pooled)
    }

    #[must_use]
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }
}

/// Mean negative log-likelihood of the labels under `softmax(logits)`.
///
/// `logits` is `[batch_size, num_classes]`; `label_ids` has one entry per
/// row. Returns a scalar tensor.
pub fn cross_entropy_loss(logits: &Tensor, label_ids: &[usize]) -> ModelResult<Tensor> {
    let (batch_size, num_classes) = logits.dims2().map_err(map_candle)?;
    if label_ids.len() != batch_size {
        return Err(ModelError::configuration(format!(
            "{} labels for {} logit rows",
            label_ids.len(),
            batch_size
        )));
    }

    // log_softmax over the class axis.
    let max = logits.max_keepdim(D::Minus1).map_err(map_candle)?;
    let shifted = logits.broadcast_sub(&max).map_err(map_candle)?;
    let log_sum = shifted
        .exp()
        .map_err(map_candle)?
        .sum_keepdim(D::Minus1)
        .map_err(map_candle)?
        .log()
        .map_err(map_candle)?;
    let log_softmax = shifted.broadcast_sub(&log_sum).map_err(map_candle)?;

    let mut nll = 0f64;
    for (row, &label) in label_ids.iter().enumerate() {
        if label >= num_classes {
            return Err(ModelError::configuration(format!(
                "label id {} out of range for {} classes",
                label, num_classes
            )));
        }
        let log_prob: f32 = log_softmax
            .get(row)
            .map_err(map_candle)?
            .get(label)
            .map_err(map_candle)?
            .to_scalar()
            .map_err(map_candle)?;
        nll -= f64::from(log_prob);
    }

    Tensor::new((nll / batch_size as f64) as f32, logits.device()).map_err(map_candle)
}
