//! Labeled text sources.
//!
//! A source hands out `(text, label)` examples by index and exposes an
//! identity string that feeds the cache uniquer chain of every stage built
//! on top of it: change the underlying data and every downstream cache
//! entry is invalidated transitively.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// One labeled sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextExample {
    pub text: String,
    pub label: String,
}

/// An indexed collection of labeled sentences.
pub trait TextSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch one example.
    fn get(&self, index: usize) -> DataResult<TextExample>;

    /// String that changes whenever the underlying data would.
    fn identity(&self) -> String;
}

/// In-memory source, mainly for tests and small demos.
#[derive(Debug, Clone)]
pub struct InMemoryTextSource {
    name: String,
    examples: Vec<TextExample>,
}

impl InMemoryTextSource {
    pub fn new(name: impl Into<String>, pairs: Vec<(&str, &str)>) -> Self {
        Self {
            name: name.into(),
            examples: pairs
                .into_iter()
                .map(|(text, label)| TextExample {
                    text: text.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        }
    }
}

impl TextSource for InMemoryTextSource {
    fn len(&self) -> usize {
        self.examples.len()
    }

    fn get(&self, index: usize) -> DataResult<TextExample> {
        self.examples
            .get(index)
            .cloned()
            .ok_or_else(|| DataError::source(format!("index {} out of range", index)))
    }

    fn identity(&self) -> String {
        format!("mem_{}_{}", self.name, self.examples.len())
    }
}

/// File-backed source: one `{"text": …, "label": …}` JSON object per line.
///
/// The whole file is parsed eagerly at construction so malformed lines fail
/// the run up front rather than mid-epoch.
#[derive(Debug, Clone)]
pub struct JsonLinesTextSource {
    file_name: String,
    examples: Vec<TextExample>,
}

impl JsonLinesTextSource {
    pub fn open(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let contents = fs::read_to_string(path)?;

        let mut examples = Vec::new();
        for (line_number, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let example: TextExample = serde_json::from_str(line).map_err(|e| {
                DataError::source(format!(
                    "{}:{}: malformed example: {}",
                    file_name,
                    line_number + 1,
                    e
                ))
            })?;
            examples.push(example);
        }
        Ok(Self {
            file_name,
            examples,
        })
    }
}

impl TextSource for JsonLinesTextSource {
    fn len(&self) -> usize {
        self.examples.len()
    }

    fn get(&self, index: usize) -> DataResult<TextExample> {
        self.examples
            .get(index)
            .cloned()
            .ok_or_else(|| DataError::source(format!("index {} out of range", index)))
    }

    fn identity(&self) -> String {
        format!("jsonl_{}_{}", self.file_name, self.examples.len())
    }
}
