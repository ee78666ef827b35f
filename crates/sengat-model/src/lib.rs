//! Neural layers for sentence-graph classification.
//!
//! The model consumes a coalesced batch from `sengat-core`: one flat node
//! set, an adjacency mask restricting attention to each graph's edge
//! structure, and optional edge-type ids conditioning the attention keys
//! and values. Layers own their weights as plain [`candle_core::Tensor`]s;
//! all randomized initialization and dropout sampling draws from an
//! explicitly-seeded rng threaded through by the caller — there is no
//! global random state.
//!
//! Layer stack, bottom up:
//!
//! - [`layers::NodeEmbedder`] — vocabulary lookup + sinusoidal positions
//! - [`layers::GraphMultiHeadAttention`] — edge-masked multi-head attention
//! - [`layers::FeedForward`] / [`layers::Residual`] — position-wise MLP and
//!   the rezero/plain residual policies
//! - [`GraphEncoder`] — the stacked blocks
//! - [`SequenceClassifier`] — CLS pooling and the linear output head

pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod layers;

pub use classifier::{cross_entropy_loss, SequenceClassifier};
pub use config::{ClassifierConfig, EncoderConfig, ResidualPolicy};
pub use encoder::GraphEncoder;
pub use error::{ModelError, ModelResult};
pub use layers::{GraphMultiHeadAttention, HeadMerge, RunMode};
