use anyhow::Result;
use candle_core::{DType, Tensor, D};
use candle_nn::ops::{log_softmax, softmax};
use rand::{
    distributions::{Distribution as _, WeightedIndex},
    Rng,
};

/// Categorical distribution over discrete actions, parameterized by logits.
pub struct Categorical {
    logits: Tensor,
}

impl Categorical {
    /// Creates a distribution from `[batch_size, action_size]` logits.
    pub fn new(logits: Tensor) -> Self {
        Self { logits }
    }

    /// Action probabilities.
    pub fn probs(&self) -> Result<Tensor> {
        Ok(softmax(&self.logits, D::Minus1)?)
    }

    /// Log action probabilities.
    pub fn log_probs(&self) -> Result<Tensor> {
        Ok(log_softmax(&self.logits, D::Minus1)?)
    }

    /// The most probable action per batch row.
    pub fn best_action(&self) -> Result<Tensor> {
        Ok(self.logits.argmax(D::Minus1)?.to_dtype(DType::I64)?)
    }

    /// Draws one action per batch row.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<Tensor> {
        let probs = self.probs()?.to_vec2::<f32>()?;
        let device = self.logits.device();
        let actions = probs
            .iter()
            .map(|row| {
                let dist = WeightedIndex::new(row)?;
                Ok(dist.sample(rng) as i64)
            })
            .collect::<Result<Vec<_>>>()?;
        let batch_size = actions.len();
        Ok(Tensor::from_vec(actions, (batch_size,), device)?)
    }
}
