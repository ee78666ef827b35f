//! Token and label vocabularies.

use std::collections::HashMap;

use sengat_core::VocabId;

/// Reserved padding id; its embedding row stays zero.
pub const PAD_ID: VocabId = 0;
/// Reserved unknown-token id; every out-of-vocabulary token maps here.
pub const UNK_ID: VocabId = 1;
/// Reserved id carried by injected CLS nodes. Never produced for an
/// ordinary token, which is what makes CLS injection's collision check
/// sound.
pub const CLS_ID: VocabId = 2;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const CLS_TOKEN: &str = "[CLS]";

/// Bidirectional token/id and label/id lookup.
///
/// Ids 0..=2 are always the reserved PAD/UNK/CLS tokens, in that order;
/// real tokens start at 3.
#[derive(Debug, Clone)]
pub struct Vocab {
    id_to_word: Vec<String>,
    word_to_id: HashMap<String, VocabId>,
    id_to_label: Vec<String>,
    label_to_id: HashMap<String, usize>,
}

impl Vocab {
    /// Rebuild the lookup maps from the persisted id lists.
    ///
    /// `id_to_word` must start with the three reserved tokens; the stages
    /// that produce it guarantee that.
    #[must_use]
    pub fn from_parts(id_to_word: Vec<String>, id_to_label: Vec<String>) -> Self {
        let word_to_id = id_to_word
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id))
            .collect();
        let label_to_id = id_to_label
            .iter()
            .enumerate()
            .map(|(id, label)| (label.clone(), id))
            .collect();
        Self {
            id_to_word,
            word_to_id,
            id_to_label,
            label_to_id,
        }
    }

    /// Token id, falling back to [`UNK_ID`] for out-of-vocabulary tokens.
    #[must_use]
    pub fn token_to_id(&self, token: &str) -> VocabId {
        self.word_to_id.get(token).copied().unwrap_or(UNK_ID)
    }

    /// Label id, `None` for unseen labels.
    #[must_use]
    pub fn label_to_id(&self, label: &str) -> Option<usize> {
        self.label_to_id.get(label).copied()
    }

    #[must_use]
    pub fn id_to_word(&self, id: VocabId) -> Option<&str> {
        self.id_to_word.get(id).map(String::as_str)
    }

    #[must_use]
    pub fn id_to_label(&self, id: usize) -> Option<&str> {
        self.id_to_label.get(id).map(String::as_str)
    }

    /// Vocabulary size including the reserved ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_word.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_word.is_empty()
    }

    #[must_use]
    pub fn num_labels(&self) -> usize {
        self.id_to_label.len()
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.id_to_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocab {
        Vocab::from_parts(
            vec![
                PAD_TOKEN.to_string(),
                UNK_TOKEN.to_string(),
                CLS_TOKEN.to_string(),
                "guard".to_string(),
                "heart".to_string(),
            ],
            vec!["no".to_string(), "yes".to_string()],
        )
    }

    #[test]
    fn test_reserved_layout() {
        let vocab = vocab();
        assert_eq!(vocab.token_to_id(PAD_TOKEN), PAD_ID);
        assert_eq!(vocab.token_to_id(UNK_TOKEN), UNK_ID);
        assert_eq!(vocab.token_to_id(CLS_TOKEN), CLS_ID);
        assert_eq!(vocab.token_to_id("guard"), 3);
    }

    #[test]
    fn test_unknown_token_falls_back_to_unk() {
        assert_eq!(vocab().token_to_id("zeppelin"), UNK_ID);
    }

    #[test]
    fn test_label_lookup() {
        let vocab = vocab();
        assert_eq!(vocab.label_to_id("yes"), Some(1));
        assert_eq!(vocab.label_to_id("maybe"), None);
        assert_eq!(vocab.id_to_label(0), Some("no"));
        assert_eq!(vocab.num_labels(), 2);
    }
}
