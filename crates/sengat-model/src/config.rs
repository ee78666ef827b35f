//! Model configuration.
//!
//! Configuration is a set of plain, statically-declared structs; validation
//! is a pure function over the fully-constructed value, invoked once before
//! any weights are built. Unknown fields simply do not exist, and an invalid
//! combination returns a structured [`ModelError::Configuration`] instead of
//! failing somewhere deep in a forward pass.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// How a block combines a sublayer's output with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResidualPolicy {
    /// `x + alpha * f(x)` with a learned scalar gate initialized to zero,
    /// so every block starts as the identity.
    Rezero,
    /// `x + f(x)`.
    Plain,
}

/// Configuration of the stacked graph-attention encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Node representation width. Must divide evenly by `num_heads`.
    pub embedding_dim: usize,
    /// Attention heads per layer.
    pub num_heads: usize,
    /// Number of attention + feed-forward blocks.
    pub num_layers: usize,
    /// Hidden width of the position-wise feed-forward sublayer.
    pub intermediate_dim: usize,
    /// Distinct edge-type ids the dataset produces (including any synthetic
    /// types such as the CLS connection). One extra id is reserved
    /// internally for "no edge"/padding.
    pub num_edge_types: usize,
    /// Condition attention logits on a learned per-edge-type key bias.
    pub use_edge_key_bias: bool,
    /// Add a learned per-edge-type value bias to the attention output.
    pub use_edge_value_bias: bool,
    /// Dropout on attention weights (training only).
    pub edge_dropout_p: f32,
    /// Dropout on node features after the feed-forward sublayer and before
    /// the classification head (training only).
    pub feat_dropout_p: f32,
    /// Residual policy for all blocks after the first. The first block
    /// applies no residual: embeddings are inputs to be transformed, not a
    /// prior representation being refined.
    pub residual: ResidualPolicy,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 128,
            num_heads: 4,
            num_layers: 2,
            intermediate_dim: 256,
            num_edge_types: 1,
            use_edge_key_bias: true,
            use_edge_value_bias: false,
            edge_dropout_p: 0.0,
            feat_dropout_p: 0.3,
            residual: ResidualPolicy::Rezero,
        }
    }
}

impl EncoderConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] for zero dimensions, a head
    /// count that does not divide the embedding dimension, or dropout
    /// probabilities outside `[0, 1)`.
    pub fn validate(&self) -> ModelResult<()> {
        if self.embedding_dim == 0 {
            return Err(ModelError::configuration("embedding_dim must be > 0"));
        }
        if self.num_heads == 0 {
            return Err(ModelError::configuration("num_heads must be > 0"));
        }
        if self.embedding_dim % self.num_heads != 0 {
            return Err(ModelError::configuration(format!(
                "embedding_dim {} is not divisible by num_heads {}",
                self.embedding_dim, self.num_heads
            )));
        }
        if self.num_layers == 0 {
            return Err(ModelError::configuration("num_layers must be > 0"));
        }
        if self.intermediate_dim == 0 {
            return Err(ModelError::configuration("intermediate_dim must be > 0"));
        }
        if self.num_edge_types == 0 {
            return Err(ModelError::configuration("num_edge_types must be > 0"));
        }
        for (name, p) in [
            ("edge_dropout_p", self.edge_dropout_p),
            ("feat_dropout_p", self.feat_dropout_p),
        ] {
            if !(0.0..1.0).contains(&p) {
                return Err(ModelError::configuration(format!(
                    "{} must be in [0, 1), got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }

    /// Per-head width.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.embedding_dim / self.num_heads
    }

    /// Reserved "no edge"/padding id, one past the last real edge type.
    #[must_use]
    pub fn padding_edge_type(&self) -> usize {
        self.num_edge_types
    }
}

/// Configuration of the full sequence classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub encoder: EncoderConfig,
    /// Vocabulary size, including the reserved ids.
    pub vocab_size: usize,
    /// Output classes.
    pub num_classes: usize,
    /// Reserved vocabulary id carried by injected CLS nodes. Must never be
    /// produced for an ordinary token.
    pub cls_vocab_id: usize,
    /// Edge type of the key-node → CLS connections.
    pub cls_edge_type: usize,
    /// Symmetrize the batch edge list before building the attention mask.
    pub undirected: bool,
    /// Put 1s on the mask diagonal so every node attends to itself.
    pub add_self_loops: bool,
}

impl ClassifierConfig {
    /// Validate this configuration and the nested encoder configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] on the first violated
    /// constraint.
    pub fn validate(&self) -> ModelResult<()> {
        self.encoder.validate()?;
        if self.vocab_size == 0 {
            return Err(ModelError::configuration("vocab_size must be > 0"));
        }
        if self.num_classes < 2 {
            return Err(ModelError::configuration(format!(
                "num_classes must be >= 2, got {}",
                self.num_classes
            )));
        }
        if self.cls_vocab_id >= self.vocab_size {
            return Err(ModelError::configuration(format!(
                "cls_vocab_id {} out of range for vocab of {}",
                self.cls_vocab_id, self.vocab_size
            )));
        }
        if self.cls_edge_type >= self.encoder.num_edge_types {
            return Err(ModelError::configuration(format!(
                "cls_edge_type {} out of range for {} edge types",
                self.cls_edge_type, self.encoder.num_edge_types
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_config() -> ClassifierConfig {
        ClassifierConfig {
            encoder: EncoderConfig::default(),
            vocab_size: 100,
            num_classes: 3,
            cls_vocab_id: 2,
            cls_edge_type: 0,
            undirected: true,
            add_self_loops: true,
        }
    }

    #[test]
    fn test_default_encoder_config_is_valid() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let config = EncoderConfig {
            embedding_dim: 10,
            num_heads: 4,
            ..EncoderConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not divisible"));
    }

    #[test]
    fn test_dropout_range_checked() {
        let config = EncoderConfig {
            feat_dropout_p: 1.0,
            ..EncoderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_classifier_config_valid() {
        assert!(classifier_config().validate().is_ok());
    }

    #[test]
    fn test_cls_edge_type_range_checked() {
        let mut config = classifier_config();
        config.cls_edge_type = config.encoder.num_edge_types;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = classifier_config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: ClassifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
