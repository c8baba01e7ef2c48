use super::{EntCoef, SacConfig};
use crate::{
    batch::TransitionBatch,
    model::{SubModel1, SubModel2},
    opt::Optimizer,
    policy::GaussianActor,
    q_func::{ContinuousEnsembleQFunc, Reduction},
    util::{discount, CriticLoss, OutDim},
};
use anyhow::{Context, Result};
use candle_core::Tensor;
use frontier_core::{
    record::{Record, RecordValue},
    Agent,
};
use log::trace;
use serde::{de::DeserializeOwned, Serialize};

/// Sub-networks and optimizers of a SAC agent.
///
/// The bundle is frozen after construction; only the parameters inside the
/// members mutate, through optimization steps and target synchronization.
pub struct SacModules<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Live critic ensemble.
    pub q_func: ContinuousEnsembleQFunc<Q>,

    /// Target critic ensemble, updated only by hard synchronization.
    pub targ_q_func: ContinuousEnsembleQFunc<Q>,

    /// Squashed-Gaussian policy.
    pub policy: GaussianActor<P>,

    /// Learned entropy coefficient and its optimizer.
    pub ent_coef: EntCoef,

    /// Optimizer over the live critic ensemble.
    pub critic_optim: Optimizer,

    /// Optimizer over the policy.
    pub actor_optim: Optimizer,
}

impl<Q, P> SacModules<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs the bundle and hard-syncs the target ensemble.
    pub fn build(config: &SacConfig<Q::Config, P::Config>) -> Result<Self> {
        let device = config.device.unwrap_or(crate::Device::Cpu).into();
        let q_config = config.q_config.clone().context("q_config is not set.")?;
        let q_func = ContinuousEnsembleQFunc::build(q_config.clone(), config.n_critics, &device)?;
        let targ_q_func = ContinuousEnsembleQFunc::build(q_config, config.n_critics, &device)?;
        let policy = GaussianActor::build(config.actor_config.clone(), &device)?;
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

/// Soft actor-critic agent.
///
/// Three coupled update rules share the module bundle: the critic regresses
/// onto an entropy-adjusted bootstrapped target, the actor maximizes the
/// entropy-regularized value of its samples, and the temperature tracks a
/// target entropy proportional to the action dimensionality.
pub struct Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    modules: SacModules<Q, P>,
    gamma: f64,
    action_size: i64,
    critic_loss: CriticLoss,
}

impl<Q, P> Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs a [`Sac`] agent.
    pub fn build(config: SacConfig<Q::Config, P::Config>) -> Result<Self> {
        let modules = SacModules::build(&config)?;
        let action_size = modules.policy.out_dim();

        Ok(Self {
            modules,
            gamma: config.gamma,
            action_size,
            critic_loss: config.critic_loss,
        })
    }

    /// Entropy-adjusted bootstrapped target for the next observations.
    ///
    /// The next action is sampled from the policy and the target is the
    /// minimum over the target critics minus the entropy term. The result
    /// carries no gradient.
    fn compute_target(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let dist = self.modules.policy.dist(&batch.next_observations)?;
        let (action, log_prob) = dist.sample_with_log_prob()?;
        let entropy = self.modules.ent_coef.alpha()?.broadcast_mul(&log_prob)?;
        let target = self.modules.targ_q_func.compute_target(
            &batch.next_observations,
            &action,
            Reduction::Min,
        )?;
        Ok((target - entropy)?.detach())
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

    /// Updates the policy on the entropy-regularized value of its samples.
    pub fn update_actor(&mut self, batch: &TransitionBatch) -> Result<Record> {
        let dist = self.modules.policy.dist(&batch.observations)?;
        let (action, log_prob) = dist.sample_with_log_prob()?;
        let entropy = self.modules.ent_coef.alpha()?.broadcast_mul(&log_prob)?;
        let q = self
            .modules
            .q_func
            .expected_q(&batch.observations, &action, Reduction::Min)?;
        let loss = (entropy - q)?.mean_all()?;
        self.modules.actor_optim.backward_step(&loss)?;

        Ok(Record::from_scalar("actor_loss", loss.to_scalar::<f32>()?))
    }

    /// Updates the entropy coefficient toward the entropy target `-|A|`.
    pub fn update_temp(&mut self, batch: &TransitionBatch) -> Result<Record> {
        let targ_temp = {
            let dist = self.modules.policy.dist(&batch.observations)?;
            let (_, log_prob) = dist.sample_with_log_prob()?;
            (log_prob.detach() - self.action_size as f64)?
        };
        let loss = self.modules.ent_coef.update(&targ_temp)?;

        let mut record = Record::from_scalar("temp", self.modules.ent_coef.value()?);
        if let Some(loss) = loss {
            record.insert("temp_loss", RecordValue::Scalar(loss));
        }
        Ok(record)
    }

    /// The module bundle of the agent.
    pub fn modules(&self) -> &SacModules<Q, P> {
        &self.modules
    }

    /// The live critic ensemble.
    pub fn q_function(&self) -> &ContinuousEnsembleQFunc<Q> {
        &self.modules.q_func
    }

    /// The policy.
    pub fn policy(&self) -> &GaussianActor<P> {
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

impl<Q, P> Agent for Sac<Q, P>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    Q::Config: DeserializeOwned + Serialize + Clone,
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
        self.modules.policy.dist(obs)?.squashed_mean()
    }

    fn sample_action(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        self.modules.policy.dist(obs)?.sample()
    }
}
