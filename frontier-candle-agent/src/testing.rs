//! Deterministic models for unit tests.
//!
//! Parameters are overwritten through the `VarMap` so that tests can pin
//! network outputs exactly.
use crate::{
    model::{SubModel1, SubModel2},
    util::OutDim,
};
use anyhow::{Context, Result};
use candle_core::{Module, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct LinConfig {
    pub in_dim: i64,
    pub out_dim: i64,
}

impl LinConfig {
    pub fn new(in_dim: i64, out_dim: i64) -> Self {
        Self { in_dim, out_dim }
    }
}

impl OutDim for LinConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, v: i64) {
        self.out_dim = v;
    }
}

/// A single linear layer.
pub struct Lin {
    lin: Linear,
}

impl SubModel1 for Lin {
    type Config = LinConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        let lin = linear(config.in_dim as _, config.out_dim as _, vs.pp("lin")).unwrap();
        Self { lin }
    }

    fn forward(&self, input: &Self::Input) -> Self::Output {
        self.lin.forward(input).unwrap()
    }
}

impl SubModel2 for Lin {
    type Config = LinConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        <Self as SubModel1>::build(vs, config)
    }

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Self::Output {
        let input = Tensor::cat(&[input1, input2], D::Minus1).unwrap();
        self.lin.forward(&input).unwrap()
    }
}

/// Linear heads for the mean and log standard deviation of a Gaussian policy.
pub struct Lin2 {
    mean: Linear,
    lstd: Linear,
}

impl SubModel1 for Lin2 {
    type Config = LinConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        let mean = linear(config.in_dim as _, config.out_dim as _, vs.pp("mean")).unwrap();
        let lstd = linear(config.in_dim as _, config.out_dim as _, vs.pp("lstd")).unwrap();
        Self { mean, lstd }
    }

    fn forward(&self, input: &Self::Input) -> Self::Output {
        (
            self.mean.forward(input).unwrap(),
            self.lstd.forward(input).unwrap(),
        )
    }
}

/// Overwrites a variable of `varmap` with the given tensor.
pub fn set_var(varmap: &VarMap, name: &str, t: &Tensor) -> Result<()> {
    varmap
        .data()
        .lock()
        .unwrap()
        .get(name)
        .with_context(|| format!("variable {} not found", name))?
        .set(t)?;
    Ok(())
}

/// Overwrites the weight and bias of a [`Lin`] built under the `lin` prefix.
pub fn set_lin(varmap: &VarMap, w: &[f32], b: &[f32], out_dim: usize, in_dim: usize) -> Result<()> {
    let device = candle_core::Device::Cpu;
    let w = Tensor::from_slice(w, (out_dim, in_dim), &device)?;
    let b = Tensor::from_slice(b, (out_dim,), &device)?;
    set_var(varmap, "lin.weight", &w)?;
    set_var(varmap, "lin.bias", &b)?;
    Ok(())
}

/// Overwrites the heads of a [`Lin2`] built under the `mean` and `lstd` prefixes.
pub fn set_lin2(
    varmap: &VarMap,
    w_mean: &[f32],
    b_mean: &[f32],
    w_lstd: &[f32],
    b_lstd: &[f32],
    out_dim: usize,
    in_dim: usize,
) -> Result<()> {
    let device = candle_core::Device::Cpu;
    let w = Tensor::from_slice(w_mean, (out_dim, in_dim), &device)?;
    let b = Tensor::from_slice(b_mean, (out_dim,), &device)?;
    set_var(varmap, "mean.weight", &w)?;
    set_var(varmap, "mean.bias", &b)?;
    let w = Tensor::from_slice(w_lstd, (out_dim, in_dim), &device)?;
    let b = Tensor::from_slice(b_lstd, (out_dim,), &device)?;
    set_var(varmap, "lstd.weight", &w)?;
    set_var(varmap, "lstd.bias", &b)?;
    Ok(())
}
