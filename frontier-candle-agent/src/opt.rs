//! Optimizers.
use anyhow::Result;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use serde::{Deserialize, Serialize};

/// Configuration of the optimizer of a trainable group of variables.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs the optimizer over the given variables.
    pub fn build(&self, vars: Vec<Var>) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                let opt = AdamW::new(vars, params)?;
                Ok(Optimizer::AdamW(opt))
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                let opt = Adam::new(vars, params)?;
                Ok(Optimizer::Adam(opt))
            }
        }
    }

    /// Overrides the learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let params = ParamsAdamW::default();
        Self::AdamW {
            lr: params.lr,
            beta1: params.beta1,
            beta2: params.beta2,
            eps: params.eps,
            weight_decay: params.weight_decay,
        }
    }
}

/// Optimizer of a trainable group of variables.
///
/// Gradients are recomputed from the loss on every [`Optimizer::backward_step`]
/// call, so gradient buffers start from zero on each update.
pub enum Optimizer {
    /// AdamW optimizer.
    AdamW(AdamW),

    /// Adam optimizer.
    Adam(Adam),
}

impl Optimizer {
    /// Performs a backward pass on the loss and applies one optimization step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::AdamW(opt) => Ok(opt.backward_step(loss)?),
            Self::Adam(opt) => Ok(opt.backward_step(loss)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarMap};

    fn step_on_quadratic(config: OptimizerConfig) -> Result<f32> {
        let varmap = VarMap::new();
        let x = varmap.get((1,), "x", Init::Const(1.0), DType::F32, &Device::Cpu)?;
        let mut opt = config.build(varmap.all_vars())?;

        // Minimize x^2; the steps must move x toward zero.
        for _ in 0..10 {
            let loss = x.powf(2.0)?.sum_all()?;
            opt.backward_step(&loss)?;
        }
        Ok(x.to_vec1::<f32>()?[0])
    }

    #[test]
    fn test_adamw_steps_toward_minimum() -> Result<()> {
        let x = step_on_quadratic(OptimizerConfig::default().learning_rate(0.1))?;
        assert!(x < 1.0);
        Ok(())
    }

    #[test]
    fn test_adam_steps_toward_minimum() -> Result<()> {
        let x = step_on_quadratic(OptimizerConfig::Adam { lr: 0.1 })?;
        assert!(x < 1.0);
        Ok(())
    }

    #[test]
    fn test_yaml_roundtrip() -> Result<()> {
        let config = OptimizerConfig::default().learning_rate(3e-4);
        let restored = serde_yaml::from_str(&serde_yaml::to_string(&config)?)?;
        assert_eq!(config, restored);
        Ok(())
    }
}
