//! Linear projection layer.

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{map_candle, ModelError, ModelResult};

/// Fully-connected layer computing `y = x @ W^T + b`.
///
/// Weights are Xavier-uniform initialized, `U(-sqrt(6/(in+out)),
/// sqrt(6/(in+out)))`, from the caller's rng; bias starts at zero.
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight matrix: `[out_features, in_features]`.
    weight: Tensor,
    /// Bias vector: `[out_features]`.
    bias: Tensor,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a layer with fresh Xavier-initialized weights.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Configuration`] if either dimension is zero.
    pub fn new(
        in_features: usize,
        out_features: usize,
        rng: &mut StdRng,
        device: &Device,
    ) -> ModelResult<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(ModelError::configuration(format!(
                "linear layer dimensions must be > 0, got {}x{}",
                in_features, out_features
            )));
        }

        let limit = (6.0 / (in_features + out_features) as f64).sqrt();
        let weights: Vec<f32> = (0..out_features * in_features)
            .map(|_| rng.gen_range(-limit..limit) as f32)
            .collect();
        let weight =
            Tensor::from_vec(weights, (out_features, in_features), device).map_err(map_candle)?;
        let bias = Tensor::zeros(out_features, DType::F32, device).map_err(map_candle)?;

        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// `[N, in_features] -> [N, out_features]`.
    pub fn forward(&self, input: &Tensor) -> ModelResult<Tensor> {
        input
            .matmul(&self.weight.t().map_err(map_candle)?)
            .map_err(map_candle)?
            .broadcast_add(&self.bias)
            .map_err(map_candle)
    }

    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }
}
