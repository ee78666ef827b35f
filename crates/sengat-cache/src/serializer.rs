//! One serializer strategy per storage kind.
//!
//! Each strategy turns an [`AttrPayload`] of exactly one kind into blob
//! bytes and back. The blob formats themselves are internal; only the
//! directory/extension naming handled by the store is a stable contract.
//!
//! Tensor blobs are safetensors files holding a single f32 tensor named
//! `data`. Deserialization lands on the CPU device; stages that compute on
//! another device move the tensor in their `import_attr`.

use candle_core::{DType, Device, Tensor};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::{CacheError, CacheResult};
use crate::kind::{AttrPayload, StorageKind};

/// Name of the single tensor entry inside a tensor blob.
const TENSOR_NAME: &str = "data";

/// Serialize/deserialize blobs of exactly one [`StorageKind`].
pub trait BlobSerializer: Send + Sync {
    /// The kind this strategy handles.
    fn kind(&self) -> StorageKind;

    /// Encode a payload into blob bytes.
    ///
    /// # Errors
    ///
    /// [`CacheError::StorageKindMismatch`] if the payload's kind is not
    /// [`Self::kind`]; [`CacheError::Serialization`] on encoding failure.
    fn to_bytes(&self, payload: &AttrPayload) -> CacheResult<Vec<u8>>;

    /// Decode blob bytes back into a payload of [`Self::kind`].
    fn from_bytes(&self, bytes: &[u8]) -> CacheResult<AttrPayload>;
}

/// Look up the strategy for a kind. Total over the closed enum.
#[must_use]
pub fn serializer_for(kind: StorageKind) -> &'static dyn BlobSerializer {
    match kind {
        StorageKind::Tensor => &TensorSerializer,
        StorageKind::Binary => &BinarySerializer,
        StorageKind::Json => &JsonSerializer,
    }
}

/// safetensors encoding of a single f32 tensor.
pub struct TensorSerializer;

impl BlobSerializer for TensorSerializer {
    fn kind(&self) -> StorageKind {
        StorageKind::Tensor
    }

    fn to_bytes(&self, payload: &AttrPayload) -> CacheResult<Vec<u8>> {
        let tensor = match payload {
            AttrPayload::Tensor(tensor) => tensor,
            other => return Err(mismatch(self.kind(), other)),
        };
        let dims = tensor.dims().to_vec();
        let flat: Vec<f32> = tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| CacheError::Serialization {
                message: format!("tensor flatten failed: {}", e),
            })?;
        let bytes: Vec<u8> = flat.iter().flat_map(|v| v.to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F32, dims, &bytes).map_err(|e| {
            CacheError::Serialization {
                message: format!("safetensors view failed: {}", e),
            }
        })?;
        safetensors::serialize([(TENSOR_NAME.to_string(), view)], &None).map_err(|e| {
            CacheError::Serialization {
                message: format!("safetensors encode failed: {}", e),
            }
        })
    }

    fn from_bytes(&self, bytes: &[u8]) -> CacheResult<AttrPayload> {
        let safetensors =
            SafeTensors::deserialize(bytes).map_err(|e| CacheError::Serialization {
                message: format!("safetensors parse failed: {}", e),
            })?;
        let view = safetensors
            .tensor(TENSOR_NAME)
            .map_err(|e| CacheError::Serialization {
                message: format!("tensor entry '{}' not found: {}", TENSOR_NAME, e),
            })?;
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let tensor = Tensor::from_vec(data, shape, &Device::Cpu).map_err(|e| {
            CacheError::Serialization {
                message: format!("tensor rebuild failed: {}", e),
            }
        })?;
        Ok(AttrPayload::Tensor(tensor))
    }
}

/// Pass-through for bincode object bytes.
///
/// Typed encoding happened at the stage boundary ([`AttrPayload::binary`]);
/// the cache never inspects the contents.
pub struct BinarySerializer;

impl BlobSerializer for BinarySerializer {
    fn kind(&self) -> StorageKind {
        StorageKind::Binary
    }

    fn to_bytes(&self, payload: &AttrPayload) -> CacheResult<Vec<u8>> {
        match payload {
            AttrPayload::Binary(bytes) => Ok(bytes.clone()),
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn from_bytes(&self, bytes: &[u8]) -> CacheResult<AttrPayload> {
        Ok(AttrPayload::Binary(bytes.to_vec()))
    }
}

/// Human-readable JSON text.
pub struct JsonSerializer;

impl BlobSerializer for JsonSerializer {
    fn kind(&self) -> StorageKind {
        StorageKind::Json
    }

    fn to_bytes(&self, payload: &AttrPayload) -> CacheResult<Vec<u8>> {
        match payload {
            AttrPayload::Json(value) => {
                serde_json::to_vec_pretty(value).map_err(|e| CacheError::Serialization {
                    message: format!("json encode failed: {}", e),
                })
            }
            other => Err(mismatch(self.kind(), other)),
        }
    }

    fn from_bytes(&self, bytes: &[u8]) -> CacheResult<AttrPayload> {
        let value = serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization {
            message: format!("json parse failed: {}", e),
        })?;
        Ok(AttrPayload::Json(value))
    }
}

fn mismatch(declared: StorageKind, actual: &AttrPayload) -> CacheError {
    CacheError::StorageKindMismatch {
        attr: "<payload>".to_string(),
        declared: declared.name(),
        actual: actual.kind().name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_blob_roundtrip() {
        let tensor = Tensor::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3), &Device::Cpu)
            .unwrap();
        let serializer = serializer_for(StorageKind::Tensor);

        let bytes = serializer
            .to_bytes(&AttrPayload::Tensor(tensor.clone()))
            .unwrap();
        let back = serializer.from_bytes(&bytes).unwrap().into_tensor().unwrap();

        assert_eq!(back.dims(), &[2, 3]);
        assert_eq!(
            back.to_vec2::<f32>().unwrap(),
            tensor.to_vec2::<f32>().unwrap()
        );
    }

    #[test]
    fn test_binary_blob_roundtrip() {
        let payload = AttrPayload::binary(&vec!["x".to_string(), "y".to_string()]).unwrap();
        let serializer = serializer_for(StorageKind::Binary);

        let bytes = serializer.to_bytes(&payload).unwrap();
        let back: Vec<String> = serializer
            .from_bytes(&bytes)
            .unwrap()
            .into_binary()
            .unwrap();
        assert_eq!(back, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_json_blob_is_readable_text() {
        let payload = AttrPayload::json(&vec![1usize, 2, 3]).unwrap();
        let bytes = serializer_for(StorageKind::Json).to_bytes(&payload).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains('1'));
    }

    #[test]
    fn test_wrong_payload_kind_rejected() {
        let payload = AttrPayload::json(&1usize).unwrap();
        let result = serializer_for(StorageKind::Tensor).to_bytes(&payload);
        assert!(matches!(
            result,
            Err(CacheError::StorageKindMismatch { .. })
        ));
    }
}
