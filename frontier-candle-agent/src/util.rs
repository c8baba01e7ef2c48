//! Utilities.
use anyhow::{Context, Result};
use candle_core::{DType, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

/// Copies every variable of `src` into `dest`.
///
/// Variables are identified by their names. `dest` must contain exactly the
/// variables of `src`, which holds for networks built from the same
/// configuration.
pub fn hard_sync(dest: &VarMap, src: &VarMap) -> Result<()> {
    let dest = dest.data().lock().unwrap();
    let src = src.data().lock().unwrap();

    for (k, v_dest) in dest.iter() {
        let v_src = src
            .get(k)
            .with_context(|| format!("variable {} is missing in the source network", k))?;
        v_dest.set(v_src.as_tensor())?;
    }

    Ok(())
}

/// Per-sample discount factors `gamma^interval`.
///
/// `intervals` holds the number of environment steps spanned by each
/// transition, so multi-step transitions are discounted accordingly.
pub fn discount(gamma: f64, intervals: &Tensor) -> Result<Tensor> {
    let t = intervals.to_dtype(DType::F32)?;
    Ok(((t * gamma.ln())?).exp()?)
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = (1f64 - &m1)?;
    let quad = ((0.5 * m1)? * d.powf(2.0)?)?;
    let lin = (m2 * (d - 0.5)?)?;
    Ok((quad + lin)?.mean_all()?)
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::Init;

    fn varmap_with(name: &str, t: &Tensor) -> Result<VarMap> {
        let vm = VarMap::new();
        let init = Init::Const(0.0);
        vm.get(t.dims(), name, init, DType::F32, &Device::Cpu)?;
        vm.data().lock().unwrap().get(name).unwrap().set(t)?;
        Ok(vm)
    }

    #[test]
    fn test_hard_sync() -> Result<()> {
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let t_dest = Tensor::from_slice(&[4.0f32, 5.0, 6.0], (3,), &Device::Cpu)?;
        let vm_src = varmap_with("var1", &t_src)?;
        let vm_dest = varmap_with("var1", &t_dest)?;

        hard_sync(&vm_dest, &vm_src)?;

        let t = vm_dest
            .data()
            .lock()
            .unwrap()
            .get("var1")
            .unwrap()
            .as_tensor()
            .clone();
        assert_eq!(t.to_vec1::<f32>()?, vec![1.0f32, 2.0, 3.0]);

        Ok(())
    }

    #[test]
    fn test_discount() -> Result<()> {
        let intervals = Tensor::from_slice(&[1f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let d = discount(0.5, &intervals)?.to_vec1::<f32>()?;
        let expect = [0.5f32, 0.25, 0.125];
        for (a, b) in d.iter().zip(expect.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let x = Tensor::from_slice(&[0.0f32, 0.0], (2,), &Device::Cpu)?;
        let y = Tensor::from_slice(&[0.5f32, 2.0], (2,), &Device::Cpu)?;
        // 0.5 * 0.5^2 = 0.125 and 2.0 - 0.5 = 1.5, mean = 0.8125
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - 0.8125).abs() < 1e-6);
        Ok(())
    }
}
