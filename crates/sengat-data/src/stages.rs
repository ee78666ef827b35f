//! The two cache-wrapped preprocessing stages.
//!
//! [`VocabStage`] turns a text source into a token vocabulary, a label
//! vocabulary and a pretrained embedding matrix; [`GraphDatasetStage`]
//! turns the same source into vocabulary-resolved [`Graph`]s plus label
//! ids. Both declare their persisted attributes and identity-determining
//! configuration through the `sengat-cache` contract, and both fold their
//! upstream collaborators' identity strings into their own, so changing a
//! tokenizer, embedder or source invalidates every derived cache entry.

use candle_core::Tensor;
use sengat_cache::{
    AttrPayload, BlobStore, CacheError, CacheResult, Cacheable, CachedAttr, Provenance,
    StorageKind,
};
use sengat_core::Graph;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

use crate::error::{DataError, DataResult};
use crate::text::TextSource;
use crate::traits::{SentenceToGraph, Tokenizer, WordEmbedder};
use crate::vocab::{Vocab, CLS_TOKEN, PAD_TOKEN, UNK_TOKEN};

fn missing(stage: &'static str, attr: &str) -> CacheError {
    CacheError::MissingAttribute {
        stage: stage.to_string(),
        attr: attr.to_string(),
    }
}

/// Builds the token/label vocabularies and the embedding matrix.
///
/// Tokens appearing fewer than `unk_thres` times collapse into `[UNK]`.
/// The embedding matrix has one row per vocabulary id: `[PAD]` is zero,
/// `[UNK]` and `[CLS]` are the mean of all real token rows, real tokens
/// come from the word embedder.
pub struct VocabStage<S, T, E> {
    source: S,
    tokenizer: T,
    embedder: E,
    lower_case: bool,
    unk_thres: usize,

    id_to_word: Option<Vec<String>>,
    id_to_label: Option<Vec<String>>,
    embeddings: Option<Tensor>,
}

impl<S: TextSource, T: Tokenizer, E: WordEmbedder> VocabStage<S, T, E> {
    pub fn new(source: S, tokenizer: T, embedder: E, lower_case: bool, unk_thres: usize) -> Self {
        Self {
            source,
            tokenizer,
            embedder,
            lower_case,
            unk_thres,
            id_to_word: None,
            id_to_label: None,
            embeddings: None,
        }
    }

    /// Compute-or-load against the given blob store.
    pub fn ensure(&mut self, blobs: &dyn BlobStore, ignore_cache: bool) -> DataResult<Provenance> {
        Ok(sengat_cache::ensure(self, blobs, ignore_cache)?)
    }

    /// The assembled vocabulary. Only available after [`Self::ensure`].
    pub fn vocab(&self) -> DataResult<Vocab> {
        let id_to_word = self
            .id_to_word
            .clone()
            .ok_or_else(|| missing("vocab", "id_to_word"))?;
        let id_to_label = self
            .id_to_label
            .clone()
            .ok_or_else(|| missing("vocab", "id_to_label"))?;
        Ok(Vocab::from_parts(id_to_word, id_to_label))
    }

    /// The `[vocab_size, dim]` embedding matrix. Only available after
    /// [`Self::ensure`].
    pub fn embeddings(&self) -> DataResult<&Tensor> {
        self.embeddings
            .as_ref()
            .ok_or_else(|| missing("vocab", "embeddings").into())
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        if self.lower_case {
            self.tokenizer.tokenize(&text.to_lowercase())
        } else {
            self.tokenizer.tokenize(text)
        }
    }
}

impl<S: TextSource, T: Tokenizer, E: WordEmbedder> Cacheable for VocabStage<S, T, E> {
    fn stage_type(&self) -> &'static str {
        "vocab"
    }

    fn cached_attrs(&self) -> Vec<CachedAttr> {
        vec![
            CachedAttr::new(StorageKind::Binary, "id_to_word"),
            CachedAttr::new(StorageKind::Binary, "id_to_label"),
            CachedAttr::new(StorageKind::Tensor, "embeddings"),
        ]
    }

    fn uniquers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("lower_case", self.lower_case.to_string()),
            ("unk_thres", self.unk_thres.to_string()),
            ("tokenizer", self.tokenizer.identity()),
            ("embedder", self.embedder.identity()),
            ("source", self.source.identity()),
        ]
    }

    fn process(&mut self) -> CacheResult<()> {
        // Count tokens in first-occurrence order so ids are deterministic.
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut labels: BTreeSet<String> = BTreeSet::new();

        for index in 0..self.source.len() {
            let example = self
                .source
                .get(index)
                .map_err(|e| CacheError::process(e.to_string()))?;
            for token in self.tokenize(&example.text) {
                if !counts.contains_key(&token) {
                    order.push(token.clone());
                }
                *counts.entry(token).or_insert(0) += 1;
            }
            labels.insert(example.label);
        }

        let mut id_to_word = vec![
            PAD_TOKEN.to_string(),
            UNK_TOKEN.to_string(),
            CLS_TOKEN.to_string(),
        ];
        id_to_word.extend(
            order
                .into_iter()
                .filter(|token| counts[token] >= self.unk_thres),
        );
        let id_to_label: Vec<String> = labels.into_iter().collect();
        info!(
            words = id_to_word.len(),
            labels = id_to_label.len(),
            "built vocabulary"
        );

        let dim = self.embedder.dim();
        let word_rows: Vec<Vec<f32>> = id_to_word[3..]
            .iter()
            .map(|word| {
                let row = self.embedder.embed_word(word);
                if row.len() == dim {
                    Ok(row)
                } else {
                    Err(CacheError::process(format!(
                        "embedder returned {} values for '{}', expected {}",
                        row.len(),
                        word,
                        dim
                    )))
                }
            })
            .collect::<CacheResult<_>>()?;

        // [UNK] and [CLS] start as the vocabulary mean.
        let mut mean = vec![0f32; dim];
        if !word_rows.is_empty() {
            for row in &word_rows {
                for (slot, value) in mean.iter_mut().zip(row) {
                    *slot += value;
                }
            }
            for slot in &mut mean {
                *slot /= word_rows.len() as f32;
            }
        }

        let mut data = Vec::with_capacity(id_to_word.len() * dim);
        data.extend(std::iter::repeat(0f32).take(dim)); // [PAD]
        data.extend_from_slice(&mean); // [UNK]
        data.extend_from_slice(&mean); // [CLS]
        for row in &word_rows {
            data.extend_from_slice(row);
        }
        let embeddings =
            Tensor::from_vec(data, (id_to_word.len(), dim), &candle_core::Device::Cpu).map_err(
                |e| CacheError::process(format!("embedding matrix build failed: {}", e)),
            )?;
        info!(shape = ?embeddings.dims(), "built embedding matrix");

        self.id_to_word = Some(id_to_word);
        self.id_to_label = Some(id_to_label);
        self.embeddings = Some(embeddings);
        Ok(())
    }

    fn export_attr(&self, name: &str) -> CacheResult<AttrPayload> {
        match name {
            "id_to_word" => AttrPayload::binary(
                self.id_to_word
                    .as_ref()
                    .ok_or_else(|| missing("vocab", name))?,
            ),
            "id_to_label" => AttrPayload::binary(
                self.id_to_label
                    .as_ref()
                    .ok_or_else(|| missing("vocab", name))?,
            ),
            "embeddings" => Ok(AttrPayload::tensor(
                self.embeddings
                    .as_ref()
                    .ok_or_else(|| missing("vocab", name))?
                    .clone(),
            )),
            other => Err(missing("vocab", other)),
        }
    }

    fn import_attr(&mut self, name: &str, payload: AttrPayload) -> CacheResult<()> {
        match name {
            "id_to_word" => self.id_to_word = Some(payload.into_binary()?),
            "id_to_label" => self.id_to_label = Some(payload.into_binary()?),
            "embeddings" => self.embeddings = Some(payload.into_tensor()?),
            other => return Err(missing("vocab", other)),
        }
        Ok(())
    }
}

/// Extracts one vocabulary-resolved [`Graph`] per example.
pub struct GraphDatasetStage<S, T, G> {
    source: S,
    tokenizer: T,
    extractor: G,
    vocab: Vocab,
    vocab_identity: String,
    lower_case: bool,

    graphs: Option<Vec<Graph>>,
    label_ids: Option<Vec<usize>>,
}

impl<S: TextSource, T: Tokenizer, G: SentenceToGraph> GraphDatasetStage<S, T, G> {
    /// `vocab_identity` is the upstream vocabulary stage's cache identity;
    /// folding it into this stage's uniquers makes invalidation transitive.
    pub fn new(
        source: S,
        tokenizer: T,
        extractor: G,
        vocab: Vocab,
        vocab_identity: String,
        lower_case: bool,
    ) -> Self {
        Self {
            source,
            tokenizer,
            extractor,
            vocab,
            vocab_identity,
            lower_case,
            graphs: None,
            label_ids: None,
        }
    }

    /// Compute-or-load against the given blob store.
    pub fn ensure(&mut self, blobs: &dyn BlobStore, ignore_cache: bool) -> DataResult<Provenance> {
        Ok(sengat_cache::ensure(self, blobs, ignore_cache)?)
    }

    /// One graph per example. Only available after [`Self::ensure`].
    pub fn graphs(&self) -> DataResult<&[Graph]> {
        self.graphs
            .as_deref()
            .ok_or_else(|| missing("graph_dataset", "graphs").into())
    }

    /// One label id per example, parallel to [`Self::graphs`].
    pub fn label_ids(&self) -> DataResult<&[usize]> {
        self.label_ids
            .as_deref()
            .ok_or_else(|| missing("graph_dataset", "label_ids").into())
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl<S: TextSource, T: Tokenizer, G: SentenceToGraph> Cacheable for GraphDatasetStage<S, T, G> {
    fn stage_type(&self) -> &'static str {
        "graph_dataset"
    }

    fn cached_attrs(&self) -> Vec<CachedAttr> {
        vec![
            CachedAttr::new(StorageKind::Binary, "graphs"),
            CachedAttr::new(StorageKind::Json, "label_ids"),
        ]
    }

    fn uniquers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("extractor", self.extractor.identity()),
            ("tokenizer", self.tokenizer.identity()),
            ("source", self.source.identity()),
            ("vocab", self.vocab_identity.clone()),
        ]
    }

    fn process(&mut self) -> CacheResult<()> {
        let mut graphs = Vec::with_capacity(self.source.len());
        let mut label_ids = Vec::with_capacity(self.source.len());

        info!(examples = self.source.len(), "extracting sentence graphs");
        for index in 0..self.source.len() {
            let example = self
                .source
                .get(index)
                .map_err(|e| CacheError::process(e.to_string()))?;

            let text = if self.lower_case {
                example.text.to_lowercase()
            } else {
                example.text.clone()
            };
            let words = self.tokenizer.tokenize(&text);
            let structure = self
                .extractor
                .to_graph(&words)
                .map_err(|e| CacheError::process(format!("example {}: {}", index, e)))?;

            let vocab_ids: Vec<usize> = words
                .iter()
                .map(|word| self.vocab.token_to_id(word))
                .collect();
            let graph = Graph::new(
                structure.edges,
                structure.edge_types,
                structure.key_nodes,
                Some(vocab_ids),
            )
            .map_err(|e| CacheError::process(format!("example {}: {}", index, e)))?;

            let label_id = self.vocab.label_to_id(&example.label).ok_or_else(|| {
                CacheError::process(format!("example {}: unknown label '{}'", index, example.label))
            })?;

            graphs.push(graph);
            label_ids.push(label_id);
        }

        self.graphs = Some(graphs);
        self.label_ids = Some(label_ids);
        Ok(())
    }

    fn export_attr(&self, name: &str) -> CacheResult<AttrPayload> {
        match name {
            "graphs" => AttrPayload::binary(
                self.graphs
                    .as_ref()
                    .ok_or_else(|| missing("graph_dataset", name))?,
            ),
            "label_ids" => AttrPayload::json(
                self.label_ids
                    .as_ref()
                    .ok_or_else(|| missing("graph_dataset", name))?,
            ),
            other => Err(missing("graph_dataset", other)),
        }
    }

    fn import_attr(&mut self, name: &str, payload: AttrPayload) -> CacheResult<()> {
        match name {
            "graphs" => self.graphs = Some(payload.into_binary()?),
            "label_ids" => self.label_ids = Some(payload.into_json()?),
            other => return Err(missing("graph_dataset", other)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::InMemoryTextSource;
    use crate::traits::{ChainSentenceToGraph, HashEmbedder, WhitespaceTokenizer};
    use crate::vocab::{CLS_ID, PAD_ID, UNK_ID};
    use sengat_cache::FsBlobStore;
    use tempfile::TempDir;

    fn source() -> InMemoryTextSource {
        InMemoryTextSource::new(
            "tiny",
            vec![
                ("Love never fails", "yes"),
                ("Guard your heart", "no"),
                ("Love your heart", "yes"),
            ],
        )
    }

    fn vocab_stage() -> VocabStage<InMemoryTextSource, WhitespaceTokenizer, HashEmbedder> {
        VocabStage::new(
            source(),
            WhitespaceTokenizer,
            HashEmbedder::new(8, 0),
            true,
            2,
        )
    }

    #[test]
    fn test_vocab_stage_layout_and_threshold() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        let mut stage = vocab_stage();
        assert_eq!(stage.ensure(&blobs, false).unwrap(), Provenance::Computed);

        let vocab = stage.vocab().unwrap();
        // "love", "your" and "heart" appear twice; the rest fall under the
        // threshold and are not in the vocabulary.
        assert_eq!(vocab.token_to_id("love"), 3);
        assert_ne!(vocab.token_to_id("your"), UNK_ID);
        assert_ne!(vocab.token_to_id("heart"), UNK_ID);
        assert_eq!(vocab.token_to_id("never"), UNK_ID);
        assert_eq!(vocab.token_to_id("fails"), UNK_ID);
        assert_eq!(vocab.labels(), &["no".to_string(), "yes".to_string()]);

        let embeddings = stage.embeddings().unwrap();
        assert_eq!(embeddings.dims(), &[vocab.len(), 8]);

        // PAD row is zero.
        let pad_row = embeddings.get(PAD_ID).unwrap().to_vec1::<f32>().unwrap();
        assert!(pad_row.iter().all(|&v| v == 0.0));
        // UNK and CLS share the vocabulary mean.
        let unk_row = embeddings.get(UNK_ID).unwrap().to_vec1::<f32>().unwrap();
        let cls_row = embeddings.get(CLS_ID).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(unk_row, cls_row);
        assert!(unk_row.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_vocab_stage_cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        let mut first = vocab_stage();
        assert_eq!(first.ensure(&blobs, false).unwrap(), Provenance::Computed);

        let mut second = vocab_stage();
        assert_eq!(second.ensure(&blobs, false).unwrap(), Provenance::Loaded);
        assert_eq!(
            second.vocab().unwrap().len(),
            first.vocab().unwrap().len()
        );
        assert_eq!(
            second.embeddings().unwrap().to_vec2::<f32>().unwrap(),
            first.embeddings().unwrap().to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_vocab_identity_tracks_configuration() {
        let loose = VocabStage::new(
            source(),
            WhitespaceTokenizer,
            HashEmbedder::new(8, 0),
            true,
            1,
        );
        let strict = vocab_stage();
        assert_ne!(sengat_cache::identity(&loose), sengat_cache::identity(&strict));
    }

    #[test]
    fn test_dataset_stage_resolves_graphs() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path());

        let mut vocab_stage = vocab_stage();
        vocab_stage.ensure(&blobs, false).unwrap();
        let vocab = vocab_stage.vocab().unwrap();
        let vocab_identity = sengat_cache::identity(&vocab_stage);

        let mut dataset = GraphDatasetStage::new(
            source(),
            WhitespaceTokenizer,
            ChainSentenceToGraph,
            vocab.clone(),
            vocab_identity,
            true,
        );
        assert_eq!(dataset.ensure(&blobs, false).unwrap(), Provenance::Computed);

        let graphs = dataset.graphs().unwrap();
        assert_eq!(graphs.len(), 3);
        // "love your heart": every token is in-vocabulary.
        let resolved = graphs[2].node_to_vocab_id().unwrap();
        assert_eq!(resolved.len(), 3);
        assert!(resolved.iter().all(|&id| id != UNK_ID));
        assert_eq!(graphs[2].edges(), &[(0, 1), (1, 2)]);
        assert_eq!(graphs[2].key_nodes(), &[2]);

        // "love never fails": "never"/"fails" resolve to UNK.
        let with_unk = graphs[0].node_to_vocab_id().unwrap();
        assert_eq!(with_unk.iter().filter(|&&id| id == UNK_ID).count(), 2);

        assert_eq!(dataset.label_ids().unwrap(), &[1, 0, 1]);
    }

    #[test]
    fn test_dataset_cache_invalidated_by_vocab_change() {
        let vocab = Vocab::from_parts(
            vec![
                PAD_TOKEN.to_string(),
                UNK_TOKEN.to_string(),
                CLS_TOKEN.to_string(),
            ],
            vec!["no".to_string(), "yes".to_string()],
        );
        let a = GraphDatasetStage::new(
            source(),
            WhitespaceTokenizer,
            ChainSentenceToGraph,
            vocab.clone(),
            "vocab-unk_thres_1".to_string(),
            true,
        );
        let b = GraphDatasetStage::new(
            source(),
            WhitespaceTokenizer,
            ChainSentenceToGraph,
            vocab,
            "vocab-unk_thres_2".to_string(),
            true,
        );
        assert_ne!(sengat_cache::identity(&a), sengat_cache::identity(&b));
    }
}
