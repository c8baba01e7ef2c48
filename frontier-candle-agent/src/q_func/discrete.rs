use super::Reduction;
use crate::{
    model::SubModel1,
    util::{smooth_l1_loss, CriticLoss, hard_sync, OutDim},
};
use anyhow::{ensure, Context, Result};
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{loss::mse, VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// A single Q-network of a discrete-action ensemble.
///
/// Takes observations and outputs one value per action.
pub struct DiscreteQFunc<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    varmap: VarMap,
    q: Q,
}

impl<Q> DiscreteQFunc<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`DiscreteQFunc`].
    pub fn build(config: Q::Config, device: &Device) -> Self {
        let varmap = VarMap::new();
        let q = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            Q::build(vb, config)
        };

        Self { varmap, q }
    }

    /// Outputs action values for the given observations.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.q.forward(obs)
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

/// Ensemble of discrete-action Q-networks.
pub struct DiscreteEnsembleQFunc<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    heads: Vec<DiscreteQFunc<Q>>,
}

impl<Q> DiscreteEnsembleQFunc<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs an ensemble of `n_heads` networks from a shared configuration.
    pub fn build(config: Q::Config, n_heads: usize, device: &Device) -> Result<Self> {
        ensure!(n_heads >= 1, "an ensemble requires at least one member");
        let heads = (0..n_heads)
            .map(|_| DiscreteQFunc::build(config.clone(), device))
            .collect();
        Ok(Self { heads })
    }

    /// The members of the ensemble.
    pub fn heads(&self) -> &[DiscreteQFunc<Q>] {
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

    fn reduce(&self, obs: &Tensor, reduction: Reduction) -> Result<Tensor> {
        let values: Vec<_> = self.heads.iter().map(|head| head.forward(obs)).collect();
        let values = Tensor::stack(&values, 0)?;
        let reduced = match reduction {
            Reduction::Min => values.min(0)?,
            Reduction::Mean => values.mean(0)?,
        };
        Ok(reduced)
    }

    /// Expected action values, reduced across the ensemble.
    pub fn expected_q(&self, obs: &Tensor, reduction: Reduction) -> Result<Tensor> {
        self.reduce(obs, reduction)
    }

    /// Bootstrapped target values, reduced across the ensemble.
    ///
    /// With `action`, the reduced values are taken at the given action per
    /// batch row, giving a `[batch_size]` tensor; without, the full
    /// `[batch_size, action_size]` values are returned.
    pub fn compute_target(
        &self,
        obs: &Tensor,
        action: Option<&Tensor>,
        reduction: Reduction,
    ) -> Result<Tensor> {
        let values = self.reduce(obs, reduction)?;
        match action {
            Some(action) => {
                let action = action.to_dtype(DType::I64)?.unsqueeze(D::Minus1)?;
                Ok(values.gather(&action, D::Minus1)?.squeeze(D::Minus1)?)
            }
            None => Ok(values),
        }
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
        let actions = actions.to_dtype(DType::I64)?.unsqueeze(D::Minus1)?;
        let target = match target.rank() {
            2 => target.squeeze(D::Minus1)?,
            _ => target.clone(),
        };
        let not_done = (1f64 - terminals)?;
        let y = (rewards + ((target * discount)? * not_done)?)?.detach();

        let mut total: Option<Tensor> = None;
        for head in &self.heads {
            let pred = head
                .forward(obs)
                .gather(&actions, D::Minus1)?
                .squeeze(D::Minus1)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{set_lin, Lin, LinConfig};
    use candle_core::Device;

    fn ensemble(
        weights: &[([f32; 2], [f32; 2])],
        device: &Device,
    ) -> Result<DiscreteEnsembleQFunc<Lin>> {
        // One input, two actions per member.
        let config = LinConfig::new(1, 2);
        let ens = DiscreteEnsembleQFunc::<Lin>::build(config, weights.len(), device)?;
        for (head, (w, b)) in ens.heads().iter().zip(weights.iter()) {
            set_lin(head.varmap(), w, b, 2, 1)?;
        }
        Ok(ens)
    }

    #[test]
    fn test_min_reduction_across_members() -> Result<()> {
        let device = Device::Cpu;
        // Member 0: q(o) = [1, 4]; member 1: q(o) = [2, 3] for o = 1.
        let ens = ensemble(
            &[([1.0, 4.0], [0.0, 0.0]), ([2.0, 3.0], [0.0, 0.0])],
            &device,
        )?;
        let obs = Tensor::from_slice(&[1.0f32], (1, 1), &device)?;

        let q_min = ens.expected_q(&obs, Reduction::Min)?.to_vec2::<f32>()?;
        assert_eq!(q_min, vec![vec![1.0, 3.0]]);

        let q_mean = ens.expected_q(&obs, Reduction::Mean)?.to_vec2::<f32>()?;
        assert_eq!(q_mean, vec![vec![1.5, 3.5]]);

        let action = Tensor::from_slice(&[1i64], (1,), &device)?;
        let tgt = ens
            .compute_target(&obs, Some(&action), Reduction::Min)?
            .to_vec1::<f32>()?;
        assert_eq!(tgt, vec![3.0]);
        Ok(())
    }

    #[test]
    fn test_error_is_zero_for_consistent_transition() -> Result<()> {
        let device = Device::Cpu;
        // Single member with q(o) = [2o, 0].
        let ens = ensemble(&[([2.0, 0.0], [0.0, 0.0])], &device)?;
        let obs = Tensor::from_slice(&[1.0f32], (1, 1), &device)?;
        let actions = Tensor::from_slice(&[0i64], (1,), &device)?;
        // q(obs, 0) = 2 and reward + 0.5 * target = 1 + 0.5 * 2 = 2.
        let rewards = Tensor::from_slice(&[1.0f32], (1,), &device)?;
        let target = Tensor::from_slice(&[2.0f32], (1,), &device)?;
        let terminals = Tensor::from_slice(&[0.0f32], (1,), &device)?;
        let discount = Tensor::from_slice(&[0.5f32], (1,), &device)?;

        let loss = ens
            .compute_error(
                &obs,
                &actions,
                &rewards,
                &target,
                &terminals,
                &discount,
                CriticLoss::Mse,
            )?
            .to_scalar::<f32>()?;
        assert!(loss.abs() < 1e-10);
        Ok(())
    }

    #[test]
    fn test_sync_from() -> Result<()> {
        let device = Device::Cpu;
        let live = ensemble(&[([1.0, 2.0], [0.5, 0.5])], &device)?;
        let targ = ensemble(&[([0.0, 0.0], [0.0, 0.0])], &device)?;
        let obs = Tensor::from_slice(&[1.0f32], (1, 1), &device)?;

        targ.sync_from(&live)?;
        let q_live = live.expected_q(&obs, Reduction::Min)?.to_vec2::<f32>()?;
        let q_targ = targ.expected_q(&obs, Reduction::Min)?.to_vec2::<f32>()?;
        assert_eq!(q_live, q_targ);
        Ok(())
    }
}
