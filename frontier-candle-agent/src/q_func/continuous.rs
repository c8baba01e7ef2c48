use super::Reduction;
use crate::{
    model::SubModel2,
    util::{hard_sync, smooth_l1_loss, CriticLoss},
};
use anyhow::{ensure, Context, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{loss::mse, VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// A single Q-network of a continuous-action ensemble.
///
/// Takes observations and actions and outputs one action value.
pub struct ContinuousQFunc<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    varmap: VarMap,
    q: Q,
}

impl<Q> ContinuousQFunc<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`ContinuousQFunc`].
    pub fn build(config: Q::Config, device: &Device) -> Self {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            Q::build(vb, config)
        };

        Self { varmap, q }
    }

    /// Outputs the action value for the given observations and actions.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.q.forward(obs, act)
    }

    /// Variables of the network.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters of the network.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save q-function to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters of the network.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load q-function from {:?}", path.as_ref());
        Ok(())
    }
}

/// Ensemble of continuous-action Q-networks.
pub struct ContinuousEnsembleQFunc<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    heads: Vec<ContinuousQFunc<Q>>,
}

impl<Q> ContinuousEnsembleQFunc<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs an ensemble of `n_heads` networks from a shared configuration.
    pub fn build(config: Q::Config, n_heads: usize, device: &Device) -> Result<Self> {
        ensure!(n_heads >= 1, "an ensemble requires at least one member");
        let heads = (0..n_heads)
            .map(|_| ContinuousQFunc::build(config.clone(), device))
            .collect();
        Ok(Self { heads })
    }

    /// The members of the ensemble.
    pub fn heads(&self) -> &[ContinuousQFunc<Q>] {
        &self.heads
    }

    /// Variables of all members, the trainable group of the ensemble.
    pub fn all_vars(&self) -> Vec<Var> {
        self.heads
            .iter()
            .flat_map(|head| head.varmap.all_vars())
            .collect()
    }

    /// Copies every parameter of `src` into this ensemble.
    pub fn sync_from(&self, src: &Self) -> Result<()> {
        ensure!(
            self.heads.len() == src.heads.len(),
            "ensembles differ in size"
        );
        for (dest, src) in self.heads.iter().zip(src.heads.iter()) {
            hard_sync(&dest.varmap, &src.varmap)?;
        }
        Ok(())
    }

    /// Expected action values `[batch_size]`, reduced across the ensemble.
    pub fn expected_q(&self, obs: &Tensor, act: &Tensor, reduction: Reduction) -> Result<Tensor> {
        let values: Vec<_> = self
            .heads
            .iter()
            .map(|head| head.forward(obs, act).squeeze(D::Minus1).unwrap())
            .collect();
        let values = Tensor::stack(&values, 0)?;
        let reduced = match reduction {
            Reduction::Min => values.min(0)?,
            Reduction::Mean => values.mean(0)?,
        };

        debug_assert_eq!(reduced.dims(), [obs.dims()[0]]);

        Ok(reduced)
    }

    /// Bootstrapped target values `[batch_size]`, reduced across the ensemble.
    pub fn compute_target(
        &self,
        obs: &Tensor,
        act: &Tensor,
        reduction: Reduction,
    ) -> Result<Tensor> {
        self.expected_q(obs, act, reduction)
    }

    /// Temporal-difference error of every member against a shared target.
    ///
    /// The target value is `rewards + discount * target * (1 - terminals)`,
    /// where `discount` carries the per-sample `gamma^interval`. Member
    /// losses are summed.
    pub fn compute_error(
        &self,
        obs: &Tensor,
        actions: &Tensor,
        rewards: &Tensor,
        target: &Tensor,
        terminals: &Tensor,
        discount: &Tensor,
        critic_loss: CriticLoss,
    ) -> Result<Tensor> {
        let target = match target.rank() {
            2 => target.squeeze(D::Minus1)?,
            _ => target.clone(),
        };
        let not_done = (1f64 - terminals)?;
        let y = (rewards + ((target * discount)? * not_done)?)?.detach();

        let mut total: Option<Tensor> = None;
        for head in &self.heads {
            let pred = head.forward(obs, actions).squeeze(D::Minus1)?;
            let loss = match critic_loss {
                CriticLoss::Mse => mse(&pred, &y)?,
                CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &y)?,
            };
            total = Some(match total {
                None => loss,
                Some(t) => (t + loss)?,
            });
        }
        total.context("ensemble has no members")
    }
}
