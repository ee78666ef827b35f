//! Preprocessing stages feeding the sentence-graph classifier.
//!
//! Everything expensive here is deterministic in its inputs, so the two
//! stages — vocabulary construction ([`VocabStage`]) and graph extraction
//! ([`GraphDatasetStage`]) — implement the `sengat-cache` contract and are
//! computed at most once per configuration. The linguistic heavy lifting
//! (tokenization, sentence-to-graph parsing, word vectors) stays behind
//! collaborator traits; the bundled implementations are deterministic
//! stand-ins good enough for tests and demos.

pub mod error;
pub mod stages;
pub mod text;
pub mod traits;
pub mod vocab;

pub use error::{DataError, DataResult};
pub use stages::{GraphDatasetStage, VocabStage};
pub use text::{InMemoryTextSource, JsonLinesTextSource, TextExample, TextSource};
pub use traits::{
    ChainSentenceToGraph, HashEmbedder, SentenceStructure, SentenceToGraph, Tokenizer,
    WhitespaceTokenizer, WordEmbedder,
};
pub use vocab::{Vocab, CLS_ID, CLS_TOKEN, PAD_ID, PAD_TOKEN, UNK_ID, UNK_TOKEN};
