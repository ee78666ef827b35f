//! End-to-end pipeline: text source → cached vocabulary → cached graph
//! extraction → graph-attention classifier.

use candle_core::Device;
use tempfile::TempDir;

use sengat_cache::{FsBlobStore, Provenance};
use sengat_data::{
    ChainSentenceToGraph, GraphDatasetStage, HashEmbedder, InMemoryTextSource, SentenceToGraph,
    VocabStage, WhitespaceTokenizer, CLS_ID,
};
use sengat_model::{
    cross_entropy_loss, ClassifierConfig, EncoderConfig, ResidualPolicy, RunMode,
    SequenceClassifier,
};

const EMBEDDING_DIM: usize = 8;

fn source() -> InMemoryTextSource {
    InMemoryTextSource::new(
        "pipeline",
        vec![
            ("Love never fails", "yes"),
            ("Guard your heart", "no"),
            ("Always be on guard", "no"),
            ("Love overcomes all things", "yes"),
        ],
    )
}

fn build_vocab_stage() -> VocabStage<InMemoryTextSource, WhitespaceTokenizer, HashEmbedder> {
    VocabStage::new(
        source(),
        WhitespaceTokenizer,
        HashEmbedder::new(EMBEDDING_DIM, 42),
        true,
        1,
    )
}

fn classifier_config(vocab_size: usize, num_classes: usize) -> ClassifierConfig {
    let extractor_types = ChainSentenceToGraph.num_edge_types();
    ClassifierConfig {
        encoder: EncoderConfig {
            embedding_dim: EMBEDDING_DIM,
            num_heads: 2,
            num_layers: 2,
            intermediate_dim: 16,
            // Extractor types plus the synthetic CLS connection type.
            num_edge_types: extractor_types + 1,
            use_edge_key_bias: true,
            use_edge_value_bias: false,
            edge_dropout_p: 0.0,
            feat_dropout_p: 0.0,
            residual: ResidualPolicy::Rezero,
        },
        vocab_size,
        num_classes,
        cls_vocab_id: CLS_ID,
        cls_edge_type: extractor_types,
        undirected: true,
        add_self_loops: true,
    }
}

#[test]
fn full_pipeline_computes_then_loads_then_classifies() {
    let cache_dir = TempDir::new().unwrap();
    let blobs = FsBlobStore::new(cache_dir.path());

    // First run: both stages compute.
    let mut vocab_stage = build_vocab_stage();
    assert_eq!(vocab_stage.ensure(&blobs, false).unwrap(), Provenance::Computed);
    let vocab = vocab_stage.vocab().unwrap();
    let vocab_identity = sengat_cache::identity(&vocab_stage);

    let mut dataset = GraphDatasetStage::new(
        source(),
        WhitespaceTokenizer,
        ChainSentenceToGraph,
        vocab.clone(),
        vocab_identity.clone(),
        true,
    );
    assert_eq!(dataset.ensure(&blobs, false).unwrap(), Provenance::Computed);

    // Second run against the same store: both stages load.
    let mut vocab_again = build_vocab_stage();
    assert_eq!(vocab_again.ensure(&blobs, false).unwrap(), Provenance::Loaded);
    let mut dataset_again = GraphDatasetStage::new(
        source(),
        WhitespaceTokenizer,
        ChainSentenceToGraph,
        vocab_again.vocab().unwrap(),
        sengat_cache::identity(&vocab_again),
        true,
    );
    assert_eq!(dataset_again.ensure(&blobs, false).unwrap(), Provenance::Loaded);

    // Classify the loaded graphs with the cached pretrained embeddings.
    let vocab = vocab_again.vocab().unwrap();
    let config = classifier_config(vocab.len(), vocab.num_labels());
    let classifier = SequenceClassifier::new(
        config,
        Some(vocab_again.embeddings().unwrap().clone()),
        7,
        &Device::Cpu,
    )
    .unwrap();

    let graphs = dataset_again.graphs().unwrap();
    let label_ids = dataset_again.label_ids().unwrap();
    assert_eq!(graphs.len(), 4);

    let logits = classifier.forward(graphs, &mut RunMode::eval()).unwrap();
    assert_eq!(logits.dims(), &[4, 2]);

    let loss: f32 = cross_entropy_loss(&logits, label_ids)
        .unwrap()
        .to_scalar()
        .unwrap();
    assert!(loss.is_finite() && loss > 0.0);
}

#[test]
fn training_mode_is_reproducible_per_seed() {
    let cache_dir = TempDir::new().unwrap();
    let blobs = FsBlobStore::new(cache_dir.path());

    let mut vocab_stage = build_vocab_stage();
    vocab_stage.ensure(&blobs, false).unwrap();
    let vocab = vocab_stage.vocab().unwrap();
    let mut dataset = GraphDatasetStage::new(
        source(),
        WhitespaceTokenizer,
        ChainSentenceToGraph,
        vocab.clone(),
        sengat_cache::identity(&vocab_stage),
        true,
    );
    dataset.ensure(&blobs, false).unwrap();

    let mut config = classifier_config(vocab.len(), vocab.num_labels());
    config.encoder.edge_dropout_p = 0.2;
    config.encoder.feat_dropout_p = 0.2;

    let classifier =
        SequenceClassifier::new(config, None, 7, &Device::Cpu).unwrap();
    let graphs = dataset.graphs().unwrap();

    let a = classifier
        .forward(graphs, &mut RunMode::train(123))
        .unwrap()
        .to_vec2::<f32>()
        .unwrap();
    let b = classifier
        .forward(graphs, &mut RunMode::train(123))
        .unwrap()
        .to_vec2::<f32>()
        .unwrap();
    let c = classifier
        .forward(graphs, &mut RunMode::train(456))
        .unwrap()
        .to_vec2::<f32>()
        .unwrap();

    assert_eq!(a, b, "same dropout seed must reproduce the same logits");
    assert_ne!(a, c, "different dropout seeds should sample different masks");
}

#[test]
fn changing_embedder_invalidates_downstream_caches() {
    let cache_dir = TempDir::new().unwrap();
    let blobs = FsBlobStore::new(cache_dir.path());

    let mut original = build_vocab_stage();
    original.ensure(&blobs, false).unwrap();

    // Same corpus, different embedder seed: new identity, fresh compute.
    let mut reseeded = VocabStage::new(
        source(),
        WhitespaceTokenizer,
        HashEmbedder::new(EMBEDDING_DIM, 43),
        true,
        1,
    );
    assert_ne!(
        sengat_cache::identity(&original),
        sengat_cache::identity(&reseeded)
    );
    assert_eq!(reseeded.ensure(&blobs, false).unwrap(), Provenance::Computed);

    // And the dataset stage keyed on the old vocab identity still loads,
    // while one keyed on the new identity computes.
    let vocab = original.vocab().unwrap();
    let mut old_dataset = GraphDatasetStage::new(
        source(),
        WhitespaceTokenizer,
        ChainSentenceToGraph,
        vocab.clone(),
        sengat_cache::identity(&original),
        true,
    );
    old_dataset.ensure(&blobs, false).unwrap();

    let mut new_dataset = GraphDatasetStage::new(
        source(),
        WhitespaceTokenizer,
        ChainSentenceToGraph,
        reseeded.vocab().unwrap(),
        sengat_cache::identity(&reseeded),
        true,
    );
    assert_eq!(new_dataset.ensure(&blobs, false).unwrap(), Provenance::Computed);
}
