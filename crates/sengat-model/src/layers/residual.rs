//! Residual connection policies.

use candle_core::{DType, Device, Tensor};

use crate::config::ResidualPolicy;
use crate::error::{map_candle, ModelResult};

/// How a sublayer's output is combined with its input.
///
/// `Rezero` carries a learned scalar gate initialized to zero, so a freshly
/// constructed block is exactly the identity and the gate grows during
/// training. `None` is reserved for the first encoder block, where the
/// input embeddings are not a prior representation of the same kind as the
/// sublayer output.
pub enum Residual {
    None,
    Plain,
    Rezero { alpha: Tensor },
}

impl Residual {
    /// No residual; the sublayer output passes through alone.
    #[must_use]
    pub fn none() -> Self {
        Residual::None
    }

    /// Instantiate the configured policy.
    pub fn from_policy(policy: ResidualPolicy, device: &Device) -> ModelResult<Self> {
        match policy {
            ResidualPolicy::Plain => Ok(Residual::Plain),
            ResidualPolicy::Rezero => {
                let alpha = Tensor::zeros(1, DType::F32, device).map_err(map_candle)?;
                Ok(Residual::Rezero { alpha })
            }
        }
    }

    /// Combine a sublayer's `input` and `output`.
    pub fn apply(&self, input: &Tensor, output: &Tensor) -> ModelResult<Tensor> {
        match self {
            Residual::None => Ok(output.clone()),
            Residual::Plain => (input + output).map_err(map_candle),
            Residual::Rezero { alpha } => {
                let gated = output.broadcast_mul(alpha).map_err(map_candle)?;
                (input + gated).map_err(map_candle)
            }
        }
    }
}
