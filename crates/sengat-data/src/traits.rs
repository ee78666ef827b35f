//! External-collaborator seams.
//!
//! Linguistic tokenization, sentence-to-graph parsing and pretrained word
//! vectors are services this crate consumes, not implements. Each trait
//! exposes an `identity()` string that the stages fold into their cache
//! uniquers, so swapping a collaborator invalidates everything derived from
//! it. The bundled implementations are deterministic stand-ins for tests
//! and demos.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xxhash_rust::xxh64::xxh64;

use crate::error::{DataError, DataResult};

/// Splits text into tokens.
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;
    fn identity(&self) -> String;
}

/// Whitespace splitting. Real linguistic tokenization lives outside this
/// system; this is the minimal deterministic stand-in.
#[derive(Debug, Clone, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn identity(&self) -> String {
        "whitespace".to_string()
    }
}

/// Produces one embedding row per word.
pub trait WordEmbedder {
    /// Embedding width.
    fn dim(&self) -> usize;

    /// Embedding row for one word; length must equal [`Self::dim`].
    fn embed_word(&self, word: &str) -> Vec<f32>;

    fn identity(&self) -> String;
}

/// Deterministic hash-seeded embeddings: each word's vector is drawn from
/// an rng seeded by `xxh64(word) ^ seed` and unit-normalized. No semantics,
/// but stable across runs — exactly what cache tests need.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    seed: u64,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dim: usize, seed: u64) -> Self {
        Self { dim, seed }
    }
}

impl WordEmbedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_word(&self, word: &str) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(xxh64(word.as_bytes(), 0) ^ self.seed);
        let mut row: Vec<f32> = (0..self.dim).map(|_| rng.gen_range(-1.0..1.0f32)).collect();
        let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut row {
                *value /= norm;
            }
        }
        row
    }

    fn identity(&self) -> String {
        format!("hash{}d_{}", self.dim, self.seed)
    }
}

/// A tokenized sentence's graph structure, node ids aligned to token
/// positions (0-based, dense).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceStructure {
    pub key_nodes: Vec<usize>,
    pub edges: Vec<(usize, usize)>,
    pub edge_types: Vec<usize>,
}

/// Turns a tokenized sentence into graph structure.
pub trait SentenceToGraph {
    /// Extract structure for one sentence.
    ///
    /// # Errors
    ///
    /// Implementations fail on input they cannot parse; the bundled chain
    /// extractor only rejects empty sentences.
    fn to_graph(&self, words: &[String]) -> DataResult<SentenceStructure>;

    /// Number of distinct edge-type ids this extractor emits. Consumers
    /// reserve one extra id for "no edge"/padding on top of this (and any
    /// synthetic types they add themselves).
    fn num_edge_types(&self) -> usize;

    fn identity(&self) -> String;
}

/// Links each token to its successor with a single edge type and marks the
/// last token as the key node. A linear-chain stand-in for a real
/// dependency or semantic-role parser.
#[derive(Debug, Clone, Default)]
pub struct ChainSentenceToGraph;

impl SentenceToGraph for ChainSentenceToGraph {
    fn to_graph(&self, words: &[String]) -> DataResult<SentenceStructure> {
        if words.is_empty() {
            return Err(DataError::EmptyInput {
                context: "sentence with no tokens".to_string(),
            });
        }
        let edges: Vec<(usize, usize)> = (0..words.len() - 1).map(|i| (i, i + 1)).collect();
        let edge_types = vec![0; edges.len()];
        Ok(SentenceStructure {
            key_nodes: vec![words.len() - 1],
            edges,
            edge_types,
        })
    }

    fn num_edge_types(&self) -> usize {
        1
    }

    fn identity(&self) -> String {
        "chain".to_string()
    }
}
