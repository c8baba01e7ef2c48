use super::MlpConfig;
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Returns the hidden layers shared by the two output heads.
fn create_linear_layers(prefix: &str, vs: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let mut in_out_pairs: Vec<(i64, i64)> = (0..config.units.len().saturating_sub(1))
        .map(|i| (config.units[i], config.units[i + 1]))
        .collect();
    in_out_pairs.insert(0, (config.in_dim, config.units[0]));
    let vs = vs.pp(prefix);

    Ok(in_out_pairs
        .iter()
        .enumerate()
        .map(|(i, &(in_dim, out_dim))| {
            linear(in_dim as _, out_dim as _, vs.pp(format!("ln{}", i))).unwrap()
        })
        .collect())
}

/// Multilayer perceptron that outputs the mean and the logarithm of the
/// standard deviation of a Gaussian distribution.
pub struct Mlp2 {
    _config: MlpConfig,
    device: Device,
    head_mean: Linear,
    head_lstd: Linear,
    layers: Vec<Linear>,
}

impl SubModel1 for Mlp2 {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, xs: &Self::Input) -> Self::Output {
        let mut xs = xs.to_device(&self.device).unwrap();
        for layer in self.layers.iter() {
            xs = layer.forward(&xs).unwrap().relu().unwrap();
        }
        let mean = self.head_mean.forward(&xs).unwrap();
        let lstd = self.head_lstd.forward(&xs).unwrap();
        (mean, lstd)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        let device = vs.device().clone();
        let layers = create_linear_layers("mlp", vs.clone(), &config).unwrap();
        let (head_mean, head_lstd) = {
            let in_dim = *config.units.last().unwrap();
            let out_dim = config.out_dim;
            let head_mean = linear(in_dim as _, out_dim as _, vs.pp("mean")).unwrap();
            let head_lstd = linear(in_dim as _, out_dim as _, vs.pp("lstd")).unwrap();
            (head_mean, head_lstd)
        };

        Self {
            _config: config,
            device,
            head_mean,
            head_lstd,
            layers,
        }
    }
}
