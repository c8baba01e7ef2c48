use anyhow::Result;
use candle_core::{Tensor, D};

/// Diagonal Gaussian distribution squashed by `tanh`.
///
/// Log probabilities are corrected for the Jacobian of the squashing
/// transform.
pub struct SquashedNormal {
    mean: Tensor,
    std: Tensor,
    epsilon: f64,
}

fn normal_logp(z: &Tensor, std: &Tensor) -> Result<Tensor> {
    let half_log_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
    let t = ((z.powf(2.0)? * 0.5)? + std.log()?)?;
    let t = ((t + half_log_2pi)? * -1f64)?;
    Ok(t.sum(D::Minus1)?)
}

impl SquashedNormal {
    /// Creates a distribution from the Gaussian parameters.
    ///
    /// `epsilon` stabilizes the logarithm in the Jacobian correction.
    pub fn new(mean: Tensor, std: Tensor, epsilon: f64) -> Self {
        Self { mean, std, epsilon }
    }

    /// Draws one action per batch row.
    pub fn sample(&self) -> Result<Tensor> {
        let z = self.mean.randn_like(0.0, 1.0)?;
        let x = (&self.mean + (z * &self.std)?)?;
        Ok(x.tanh()?)
    }

    /// Draws one action per batch row and returns its log probability.
    pub fn sample_with_log_prob(&self) -> Result<(Tensor, Tensor)> {
        let z = self.mean.randn_like(0.0, 1.0)?;
        let x = (&self.mean + (&z * &self.std)?)?;
        let a = x.tanh()?;
        let correction = ((1f64 - a.powf(2.0)?)? + self.epsilon)?
            .log()?
            .sum(D::Minus1)?;
        let log_p = (normal_logp(&z, &self.std)? - correction)?;
        Ok((a, log_p))
    }

    /// Returns the squashed mean, the deterministic greedy action.
    pub fn squashed_mean(&self) -> Result<Tensor> {
        Ok(self.mean.tanh()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_sample_is_bounded() -> Result<()> {
        let mean = Tensor::from_slice(&[0.0f32, 3.0, -3.0, 0.5], (2, 2), &Device::Cpu)?;
        let std = Tensor::from_slice(&[1.0f32, 1.0, 1.0, 1.0], (2, 2), &Device::Cpu)?;
        let dist = SquashedNormal::new(mean, std, 1e-6);

        let a = dist.sample()?;
        assert_eq!(a.dims(), [2, 2]);
        for v in a.flatten_all()?.to_vec1::<f32>()? {
            assert!(v > -1.0 && v < 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_log_prob_shape_and_finiteness() -> Result<()> {
        let mean = Tensor::zeros((3, 2), candle_core::DType::F32, &Device::Cpu)?;
        let std = (Tensor::ones((3, 2), candle_core::DType::F32, &Device::Cpu)? * 0.5)?;
        let dist = SquashedNormal::new(mean, std, 1e-6);

        let (a, log_p) = dist.sample_with_log_prob()?;
        assert_eq!(a.dims(), [3, 2]);
        assert_eq!(log_p.dims(), [3]);
        for v in log_p.to_vec1::<f32>()? {
            assert!(v.is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_squashed_mean() -> Result<()> {
        let mean = Tensor::from_slice(&[0.0f32, 10.0], (1, 2), &Device::Cpu)?;
        let std = Tensor::from_slice(&[1.0f32, 1.0], (1, 2), &Device::Cpu)?;
        let dist = SquashedNormal::new(mean, std, 1e-6);

        let a = dist.squashed_mean()?.flatten_all()?.to_vec1::<f32>()?;
        assert!(a[0].abs() < 1e-6);
        assert!((a[1] - 1.0).abs() < 1e-4);
        Ok(())
    }
}
