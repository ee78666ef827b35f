//! Storage kinds and the tagged payload moved between stages and the cache.
//!
//! The set of representations is a closed enum rather than a string branch:
//! adding a representation means adding a variant (and its serializer), and
//! every match over [`StorageKind`] is checked by the compiler. The only
//! place a kind ever appears as a string is the on-disk file extension.

use candle_core::Tensor;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, CacheResult};

/// How a cached attribute is represented on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Tensor-native binary (safetensors, f32).
    Tensor,
    /// Generic object bytes (bincode).
    Binary,
    /// Structured text (JSON).
    Json,
}

impl StorageKind {
    /// File extension used in the `{identity}/{attribute}.{extension}`
    /// layout. This naming is a stable contract: external tooling may rely
    /// on it for manual cache inspection and clearing.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            StorageKind::Tensor => "safetensors",
            StorageKind::Binary => "bin",
            StorageKind::Json => "json",
        }
    }

    /// Parse a file extension back into a kind.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::UnknownStorageKind`] for anything else.
    pub fn from_extension(ext: &str) -> CacheResult<Self> {
        match ext {
            "safetensors" => Ok(StorageKind::Tensor),
            "bin" => Ok(StorageKind::Binary),
            "json" => Ok(StorageKind::Json),
            other => Err(CacheError::UnknownStorageKind {
                name: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StorageKind::Tensor => "tensor",
            StorageKind::Binary => "binary",
            StorageKind::Json => "json",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single attribute's value in transit between a stage and the cache.
///
/// The cache never inspects the contents beyond the tag; typed
/// encoding/decoding happens at the stage boundary via the constructor and
/// extractor helpers below.
#[derive(Debug)]
pub enum AttrPayload {
    Tensor(Tensor),
    Binary(Vec<u8>),
    Json(serde_json::Value),
}

impl AttrPayload {
    /// The storage kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> StorageKind {
        match self {
            AttrPayload::Tensor(_) => StorageKind::Tensor,
            AttrPayload::Binary(_) => StorageKind::Binary,
            AttrPayload::Json(_) => StorageKind::Json,
        }
    }

    /// Encode a serde value as a binary payload.
    pub fn binary<T: Serialize>(value: &T) -> CacheResult<Self> {
        let bytes = bincode::serialize(value)
            .map_err(|e| CacheError::serialization(format!("bincode encode failed: {}", e)))?;
        Ok(AttrPayload::Binary(bytes))
    }

    /// Decode a binary payload back into a typed value.
    pub fn into_binary<T: DeserializeOwned>(self) -> CacheResult<T> {
        match self {
            AttrPayload::Binary(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| CacheError::serialization(format!("bincode decode failed: {}", e))),
            other => Err(kind_mismatch("binary payload", StorageKind::Binary, &other)),
        }
    }

    /// Encode a serde value as a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> CacheResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::serialization(format!("json encode failed: {}", e)))?;
        Ok(AttrPayload::Json(value))
    }

    /// Decode a JSON payload back into a typed value.
    pub fn into_json<T: DeserializeOwned>(self) -> CacheResult<T> {
        match self {
            AttrPayload::Json(value) => serde_json::from_value(value)
                .map_err(|e| CacheError::serialization(format!("json decode failed: {}", e))),
            other => Err(kind_mismatch("json payload", StorageKind::Json, &other)),
        }
    }

    /// Wrap a tensor payload.
    #[must_use]
    pub fn tensor(tensor: Tensor) -> Self {
        AttrPayload::Tensor(tensor)
    }

    /// Extract a tensor payload.
    pub fn into_tensor(self) -> CacheResult<Tensor> {
        match self {
            AttrPayload::Tensor(tensor) => Ok(tensor),
            other => Err(kind_mismatch("tensor payload", StorageKind::Tensor, &other)),
        }
    }
}

fn kind_mismatch(attr: &str, declared: StorageKind, actual: &AttrPayload) -> CacheError {
    CacheError::StorageKindMismatch {
        attr: attr.to_string(),
        declared: declared.name(),
        actual: actual.kind().name(),
    }
}
