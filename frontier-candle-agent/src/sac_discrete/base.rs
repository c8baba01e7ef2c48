use super::DiscreteSacConfig;
use crate::{
    batch::TransitionBatch,
    model::SubModel1,
    opt::Optimizer,
    policy::CategoricalActor,
    q_func::{DiscreteEnsembleQFunc, Reduction},
    sac::EntCoef,
    util::{discount, CriticLoss, OutDim},
};
use anyhow::{bail, Context, Result};
use candle_core::{Tensor, D};
use frontier_core::{
    record::{Record, RecordValue},
    Agent,
};
use log::trace;
use rand::{rngs::SmallRng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};

/// Critic output classified by shape at the forwarder boundary.
///
/// Scalar critics give one value per action; distributional critics carry an
/// extra trailing axis of value-distribution atoms.
enum TargetQ {
    Scalar(Tensor),
    Distributional(Tensor),
}

impl TargetQ {
    fn classify(t: &Tensor) -> Result<Self> {
        match t.rank() {
            2 => Ok(Self::Scalar(t.clone())),
            3 => Ok(Self::Distributional(t.clone())),
            r => bail!("unsupported critic output rank {}", r),
        }
    }
}

/// Policy-weighted soft value `sum_a pi(a) * (q(a) - entropy(a))`.
///
/// For a scalar critic the action axis is reduced keeping its dim; for a
/// distributional critic the entropy and probabilities broadcast along the
/// atom axis and the reduction drops the action dim.
fn soft_value_target(probs: &Tensor, entropy: &Tensor, target: &Tensor) -> Result<Tensor> {
    match TargetQ::classify(target)? {
        TargetQ::Scalar(t) => {
            let v = ((t - entropy)? * probs)?;
            Ok(v.sum_keepdim(1)?)
        }
        TargetQ::Distributional(t) => {
            let entropy = entropy.unsqueeze(D::Minus1)?;
            let probs = probs.unsqueeze(D::Minus1)?;
            let v = t.broadcast_sub(&entropy)?.broadcast_mul(&probs)?;
            Ok(v.sum(1)?)
        }
    }
}

/// Sub-networks and optimizers of a discrete SAC agent.
///
/// The bundle is frozen after construction; only the parameters inside the
/// members mutate, through optimization steps and target synchronization.
pub struct DiscreteSacModules<Q, P>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Live critic ensemble.
    pub q_func: DiscreteEnsembleQFunc<Q>,

    /// Target critic ensemble, updated only by hard synchronization.
    pub targ_q_func: DiscreteEnsembleQFunc<Q>,

    /// Categorical policy.
    pub policy: CategoricalActor<P>,

    /// Learned entropy coefficient and its optimizer.
    pub ent_coef: EntCoef,

    /// Optimizer over the live critic ensemble.
    pub critic_optim: Optimizer,

    /// Optimizer over the policy.
    pub actor_optim: Optimizer,
}

impl<Q, P> DiscreteSacModules<Q, P>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs the bundle and hard-syncs the target ensemble.
    pub fn build(config: &DiscreteSacConfig<Q::Config, P::Config>) -> Result<Self> {
        let device = config.device.unwrap_or(crate::Device::Cpu).into();
        let q_config = config.q_config.clone().context("q_config is not set.")?;
        let q_func = DiscreteEnsembleQFunc::build(q_config.clone(), config.n_critics, &device)?;
        let targ_q_func = DiscreteEnsembleQFunc::build(q_config, config.n_critics, &device)?;
        let policy = CategoricalActor::build(config.actor_config.clone(), &device)?;
        let ent_coef = EntCoef::new(config.ent_coef_mode.clone(), &device)?;
        let critic_optim = config.critic_opt_config.build(q_func.all_vars())?;
        let actor_optim = config.actor_opt_config.build(policy.varmap().all_vars())?;
        targ_q_func.sync_from(&q_func)?;

        Ok(Self {
            q_func,
            targ_q_func,
            policy,
            ent_coef,
            critic_optim,
            actor_optim,
        })
    }
}

/// Soft actor-critic agent for discrete action spaces.
///
/// The bootstrapped target is the policy-weighted soft value over all
/// actions rather than a sampled one, and the temperature tracks a fixed
/// target of 98% of the maximum categorical entropy.
pub struct DiscreteSac<Q, P>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    modules: DiscreteSacModules<Q, P>,
    gamma: f64,
    action_size: i64,
    critic_loss: CriticLoss,
    rng: SmallRng,
}

impl<Q, P> DiscreteSac<Q, P>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs a [`DiscreteSac`] agent.
    pub fn build(config: DiscreteSacConfig<Q::Config, P::Config>) -> Result<Self> {
        let modules = DiscreteSacModules::build(&config)?;
        let action_size = modules.policy.action_size();

        Ok(Self {
            modules,
            gamma: config.gamma,
            action_size,
            critic_loss: config.critic_loss,
            rng: SmallRng::seed_from_u64(42),
        })
    }

    /// Soft value target for the next observations.
    ///
    /// Every action's target value is weighted by the policy's probability
    /// of taking it. The result carries no gradient.
    fn compute_target(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let dist = self.modules.policy.dist(&batch.next_observations)?;
        let log_probs = dist.log_probs()?;
        let probs = dist.probs()?;
        let entropy = self.modules.ent_coef.alpha()?.broadcast_mul(&log_probs)?;
        let target =
            self.modules
                .targ_q_func
                .compute_target(&batch.next_observations, None, Reduction::Min)?;
        Ok(soft_value_target(&probs, &entropy, &target)?.detach())
    }

    /// Updates the critic ensemble on the temporal-difference error.
    pub fn update_critic(&mut self, batch: &TransitionBatch) -> Result<Record> {
        let q_tpn = self.compute_target(batch)?;
        let discount = discount(self.gamma, &batch.intervals)?;
        let loss = self.modules.q_func.compute_error(
            &batch.observations,
            &batch.actions,
            &batch.rewards,
            &q_tpn,
            &batch.terminals,
            &discount,
            self.critic_loss,
        )?;
        self.modules.critic_optim.backward_step(&loss)?;

        Ok(Record::from_scalar("critic_loss", loss.to_scalar::<f32>()?))
    }

    /// Updates the policy on the probability-weighted soft values.
    pub fn update_actor(&mut self, batch: &TransitionBatch) -> Result<Record> {
        // Critic values are an inference-only quantity here; the backward
        // pass must not reach the critic ensemble.
        let q_t = self
            .modules
            .q_func
            .expected_q(&batch.observations, Reduction::Min)?
            .detach();
        let dist = self.modules.policy.dist(&batch.observations)?;
        let log_probs = dist.log_probs()?;
        let probs = dist.probs()?;
        let entropy = self.modules.ent_coef.alpha()?.broadcast_mul(&log_probs)?;
        let loss = ((entropy - q_t)? * probs)?.sum(1)?.mean_all()?;
        self.modules.actor_optim.backward_step(&loss)?;

        Ok(Record::from_scalar("actor_loss", loss.to_scalar::<f32>()?))
    }

    /// Updates the entropy coefficient toward a fixed entropy target.
    ///
    /// The target is 98% of the entropy of the uniform distribution over
    /// the action space, independent of batch content.
    pub fn update_temp(&mut self, batch: &TransitionBatch) -> Result<Record> {
        let targ_temp = {
            let dist = self.modules.policy.dist(&batch.observations)?;
            let log_probs = dist.log_probs()?.detach();
            let probs = dist.probs()?.detach();
            let expct_log_probs = (probs * log_probs)?.sum_keepdim(1)?;
            let entropy_target = 0.98 * (self.action_size as f64).ln();
            (expct_log_probs + entropy_target)?
        };
        let loss = self.modules.ent_coef.update(&targ_temp)?;

        let mut record = Record::from_scalar("temp", self.modules.ent_coef.value()?);
        if let Some(loss) = loss {
            record.insert("temp_loss", RecordValue::Scalar(loss));
        }
        Ok(record)
    }

    /// The module bundle of the agent.
    pub fn modules(&self) -> &DiscreteSacModules<Q, P> {
        &self.modules
    }

    /// The live critic ensemble.
    pub fn q_function(&self) -> &DiscreteEnsembleQFunc<Q> {
        &self.modules.q_func
    }

    /// The policy.
    pub fn policy(&self) -> &CategoricalActor<P> {
        &self.modules.policy
    }

    /// The optimizer of the live critic ensemble.
    pub fn q_function_optim(&self) -> &Optimizer {
        &self.modules.critic_optim
    }

    /// The optimizer of the policy.
    pub fn policy_optim(&self) -> &Optimizer {
        &self.modules.actor_optim
    }
}

impl<Q, P> Agent for DiscreteSac<Q, P>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    type Batch = TransitionBatch;
    type Obs = Tensor;
    type Act = Tensor;

    fn update(&mut self, batch: &Self::Batch) -> Result<Record> {
        trace!("update_critic()");
        let mut record = self.update_critic(batch)?;

        trace!("update_actor()");
        record.merge_inplace(self.update_actor(batch)?);

        trace!("update_temp()");
        record.merge_inplace(self.update_temp(batch)?);

        Ok(record)
    }

    fn update_target(&mut self) -> Result<()> {
        self.modules.targ_q_func.sync_from(&self.modules.q_func)
    }

    fn predict_best_action(&self, obs: &Self::Obs) -> Result<Self::Act> {
        self.modules.policy.dist(obs)?.best_action()
    }

    fn sample_action(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        self.modules.policy.dist(obs)?.sample(&mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::CategoricalActorConfig;
    use crate::sac::EntCoefMode;
    use crate::testing::{set_lin, Lin, LinConfig};
    use candle_core::{DType, Device};

    fn config() -> DiscreteSacConfig<LinConfig, LinConfig> {
        DiscreteSacConfig::default()
            .q_config(LinConfig::new(1, 2))
            .actor_config(CategoricalActorConfig::default().pi_config(LinConfig::new(1, 2)))
            .n_critics(2)
    }

    fn batch(obs: &[f32]) -> TransitionBatch {
        let device = Device::Cpu;
        let n = obs.len();
        TransitionBatch::new(
            Tensor::from_slice(obs, (n, 1), &device).unwrap(),
            Tensor::zeros((n,), DType::I64, &device).unwrap(),
            Tensor::from_slice(obs, (n, 1), &device).unwrap(),
            Tensor::zeros((n,), DType::F32, &device).unwrap(),
            Tensor::zeros((n,), DType::F32, &device).unwrap(),
            Tensor::ones((n,), DType::F32, &device).unwrap(),
        )
    }

    #[test]
    fn test_soft_value_target_scalar_keeps_dim() -> Result<()> {
        let device = Device::Cpu;
        let probs = Tensor::from_slice(&[0.5f32, 0.5], (1, 2), &device)?;
        let entropy = Tensor::zeros((1, 2), DType::F32, &device)?;
        let target = Tensor::from_slice(&[1.0f32, 3.0], (1, 2), &device)?;

        let v = soft_value_target(&probs, &entropy, &target)?;
        assert_eq!(v.rank(), 2);
        assert_eq!(v.dims(), [1, 1]);
        assert_eq!(v.to_vec2::<f32>()?, vec![vec![2.0]]);
        Ok(())
    }

    #[test]
    fn test_soft_value_target_distributional_drops_dim() -> Result<()> {
        // An extra trailing atom axis must broadcast the entropy and the
        // probabilities and must not keep the reduced action dim.
        let device = Device::Cpu;
        let probs = Tensor::from_slice(&[0.5f32, 0.5], (1, 2), &device)?;
        let entropy = Tensor::from_slice(&[1.0f32, 1.0], (1, 2), &device)?;
        let target = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0], (1, 2, 2), &device)?;

        let v = soft_value_target(&probs, &entropy, &target)?;
        assert_eq!(v.rank(), 2);
        assert_eq!(v.dims(), [1, 2]);
        // Per atom: 0.5 * (1 - 1) + 0.5 * (3 - 1) = 1 and 0.5 * 1 + 0.5 * 3 = 2.
        assert_eq!(v.to_vec2::<f32>()?, vec![vec![1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_target_equals_live_after_build() -> Result<()> {
        let agent = DiscreteSac::<Lin, Lin>::build(config())?;
        let obs = Tensor::from_slice(&[1.0f32, -1.0], (2, 1), &Device::Cpu)?;

        let q = agent
            .modules
            .q_func
            .expected_q(&obs, Reduction::Min)?
            .to_vec2::<f32>()?;
        let q_targ = agent
            .modules
            .targ_q_func
            .expected_q(&obs, Reduction::Min)?
            .to_vec2::<f32>()?;
        assert_eq!(q, q_targ);
        Ok(())
    }

    #[test]
    fn test_temp_target_invariant_to_batch_content() -> Result<()> {
        // With a uniform policy the temperature loss depends only on the
        // fixed entropy target, not on the observations.
        let losses = [batch(&[0.0, 1.0]), batch(&[5.0, -3.0])]
            .iter()
            .map(|b| {
                let mut agent = DiscreteSac::<Lin, Lin>::build(
                    config().ent_coef_mode(EntCoefMode::Auto(0.1)),
                )?;
                set_lin(agent.modules.policy.varmap(), &[0.0, 0.0], &[0.0, 0.0], 2, 1)?;
                let record = agent.update_temp(b)?;
                Ok(record.get_scalar("temp_loss")?)
            })
            .collect::<Result<Vec<_>>>()?;

        assert!((losses[0] - losses[1]).abs() < 1e-7);
        // targ_temp = -ln(2) + 0.98 * ln(2) = -0.02 * ln(2) and alpha = 1.
        let expect = 0.02 * 2f32.ln();
        assert!((losses[0] - expect).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_update_merges_metrics() -> Result<()> {
        let mut agent = DiscreteSac::<Lin, Lin>::build(
            config().ent_coef_mode(EntCoefMode::Auto(3e-4)),
        )?;
        let record = Agent::update(&mut agent, &batch(&[0.5, -0.5]))?;

        assert!(record.get_scalar("critic_loss").is_ok());
        assert!(record.get_scalar("actor_loss").is_ok());
        assert!(record.get_scalar("temp_loss").is_ok());
        assert!(record.get_scalar("temp").is_ok());
        Ok(())
    }

    #[test]
    fn test_inference() -> Result<()> {
        let mut agent = DiscreteSac::<Lin, Lin>::build(config())?;
        // Logits [0, 50] regardless of the observation.
        set_lin(agent.modules.policy.varmap(), &[0.0, 0.0], &[0.0, 50.0], 2, 1)?;

        let obs = Tensor::from_slice(&[0.3f32, -0.7], (2, 1), &Device::Cpu)?;
        assert_eq!(
            Agent::predict_best_action(&agent, &obs)?.to_vec1::<i64>()?,
            vec![1, 1]
        );
        assert_eq!(
            Agent::sample_action(&mut agent, &obs)?.to_vec1::<i64>()?,
            vec![1, 1]
        );
        Ok(())
    }
}
