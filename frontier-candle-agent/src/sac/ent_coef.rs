//! Entropy coefficient of SAC.
use crate::opt::{Optimizer, OptimizerConfig};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{init::Init, VarBuilder, VarMap};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),
    /// Automatic tuning with the given learning rate.
    Auto(f64),
}

/// The entropy coefficient of SAC.
///
/// The coefficient is stored in log space and exponentiated when used, so
/// the effective temperature is always non-negative.
pub struct EntCoef {
    varmap: VarMap,
    log_alpha: Tensor,
    opt: Option<Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let (log_alpha, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = Init::Const(alpha.ln());
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                (log_alpha, None)
            }
            EntCoefMode::Auto(learning_rate) => {
                let init = Init::Const(0.0);
                let log_alpha = vb.get_with_hints(1, "log_alpha", init)?;
                let opt = OptimizerConfig::default()
                    .learning_rate(learning_rate)
                    .build(varmap.all_vars())?;
                (log_alpha, Some(opt))
            }
        };

        Ok(Self {
            varmap,
            log_alpha,
            opt,
        })
    }

    /// Returns the entropy coefficient without gradient tracking.
    pub fn alpha(&self) -> Result<Tensor> {
        Ok(self.log_alpha.detach().exp()?)
    }

    /// Returns the entropy coefficient as a scalar.
    pub fn value(&self) -> Result<f32> {
        Ok(self.alpha()?.to_vec1::<f32>()?[0])
    }

    /// Updates the coefficient so that it tracks the given temperature target.
    ///
    /// The loss is `-mean(exp(log_alpha) * targ_temp)`. Returns the loss, or
    /// `None` when the coefficient is fixed.
    pub fn update(&mut self, targ_temp: &Tensor) -> Result<Option<f32>> {
        if let Some(opt) = &mut self.opt {
            let loss = {
                let tmp = self.log_alpha.exp()?.broadcast_mul(targ_temp)?;
                (tmp.mean_all()? * -1f64)?
            };
            opt.backward_step(&loss)?;
            Ok(Some(loss.to_scalar::<f32>()?))
        } else {
            Ok(None)
        }
    }

    /// Saves the parameter into a file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save entropy coefficient to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameter from a file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load entropy coefficient from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_fixed_coefficient() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.5), &Device::Cpu)?;
        assert!((ent_coef.value()? - 0.5).abs() < 1e-6);

        let targ = Tensor::from_slice(&[1.0f32], (1,), &Device::Cpu)?;
        assert!(ent_coef.update(&targ)?.is_none());
        assert!((ent_coef.value()? - 0.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_auto_tracks_target_direction() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(0.1), &Device::Cpu)?;
        assert!((ent_coef.value()? - 1.0).abs() < 1e-6);

        // Positive target drives the coefficient up.
        let targ = Tensor::from_slice(&[1.0f32, 1.0], (2,), &Device::Cpu)?;
        let loss = ent_coef.update(&targ)?.unwrap();
        assert!(loss < 0.0);
        assert!(ent_coef.value()? > 1.0);

        // Negative target drives it down again.
        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(0.1), &Device::Cpu)?;
        let targ = Tensor::from_slice(&[-1.0f32, -1.0], (2,), &Device::Cpu)?;
        ent_coef.update(&targ)?.unwrap();
        assert!(ent_coef.value()? < 1.0);
        Ok(())
    }

    #[test]
    fn test_save_load_roundtrip() -> Result<()> {
        let dir = TempDir::new("ent_coef")?;
        let path = dir.path().join("ent_coef.safetensors");

        let mut ent_coef = EntCoef::new(EntCoefMode::Auto(0.1), &Device::Cpu)?;
        let targ = Tensor::from_slice(&[1.0f32], (1,), &Device::Cpu)?;
        ent_coef.update(&targ)?;
        let value = ent_coef.value()?;
        ent_coef.save(&path)?;

        let mut restored = EntCoef::new(EntCoefMode::Auto(0.1), &Device::Cpu)?;
        restored.load(&path)?;
        assert!((restored.value()? - value).abs() < 1e-6);
        Ok(())
    }
}
