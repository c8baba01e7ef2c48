use super::DqnConfig;
use crate::{
    batch::TransitionBatch,
    model::SubModel1,
    opt::Optimizer,
    q_func::{DiscreteEnsembleQFunc, Reduction},
    util::{discount, CriticLoss, OutDim},
};
use anyhow::{Context, Result};
use candle_core::{DType, Tensor, D};
use frontier_core::{record::Record, Agent};
use serde::{de::DeserializeOwned, Serialize};

/// Sub-networks and the optimizer of a DQN agent.
///
/// The bundle is frozen after construction; only the parameters inside the
/// members mutate, through optimization steps and target synchronization.
pub struct DqnModules<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Live Q ensemble.
    pub q_func: DiscreteEnsembleQFunc<Q>,

    /// Target Q ensemble, updated only by hard synchronization.
    pub targ_q_func: DiscreteEnsembleQFunc<Q>,

    /// Optimizer over the live ensemble.
    pub optim: Optimizer,
}

impl<Q> DqnModules<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs the bundle and hard-syncs the target ensemble.
    pub fn build(config: &DqnConfig<Q::Config>) -> Result<Self> {
        let device = config.device.unwrap_or(crate::Device::Cpu).into();
        let q_config = config.q_config.clone().context("q_config is not set.")?;
        let q_func = DiscreteEnsembleQFunc::build(q_config.clone(), config.n_critics, &device)?;
        let targ_q_func = DiscreteEnsembleQFunc::build(q_config, config.n_critics, &device)?;
        let optim = config.opt_config.build(q_func.all_vars())?;
        targ_q_func.sync_from(&q_func)?;

        Ok(Self {
            q_func,
            targ_q_func,
            optim,
        })
    }
}

/// Q-learning update rule shared by [`Dqn`] and [`DoubleDqn`].
///
/// The two variants differ in exactly one step, the source of the arg-max
/// action of the bootstrapped target, isolated in
/// [`QLearning::compute_target`]. [`DoubleDqn`] overrides that method and
/// inherits everything else.
pub trait QLearning<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// The module bundle of the agent.
    fn modules(&self) -> &DqnModules<Q>;

    /// The module bundle of the agent, mutable for optimization steps.
    fn modules_mut(&mut self) -> &mut DqnModules<Q>;

    /// Discount factor.
    fn gamma(&self) -> f64;

    /// Critic loss type.
    fn critic_loss(&self) -> CriticLoss;

    /// Bootstrapped target values for the next observations.
    ///
    /// The arg-max action is taken from the target ensemble itself and the
    /// target value is its minimum across the members at that action. The
    /// result carries no gradient.
    fn compute_target(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let m = self.modules();
        let q = m
            .targ_q_func
            .expected_q(&batch.next_observations, Reduction::Mean)?;
        let action = q.argmax(D::Minus1)?;
        let target =
            m.targ_q_func
                .compute_target(&batch.next_observations, Some(&action), Reduction::Min)?;
        Ok(target.detach())
    }

    /// Temporal-difference loss against the given target values.
    fn compute_loss(&self, batch: &TransitionBatch, q_tpn: &Tensor) -> Result<Tensor> {
        let discount = discount(self.gamma(), &batch.intervals)?;
        self.modules().q_func.compute_error(
            &batch.observations,
            &batch.actions,
            &batch.rewards,
            q_tpn,
            &batch.terminals,
            &discount,
            self.critic_loss(),
        )
    }

    /// Performs one optimization step on the mini-batch.
    fn update(&mut self, batch: &TransitionBatch) -> Result<Record> {
        let q_tpn = self.compute_target(batch)?;
        let loss = self.compute_loss(batch, &q_tpn)?;
        self.modules_mut().optim.backward_step(&loss)?;

        Ok(Record::from_scalar("loss", loss.to_scalar::<f32>()?))
    }

    /// Greedy action of the live ensemble.
    fn predict_best_action(&self, obs: &Tensor) -> Result<Tensor> {
        let q = self.modules().q_func.expected_q(obs, Reduction::Mean)?;
        Ok(q.argmax(D::Minus1)?.to_dtype(DType::I64)?)
    }

    /// Same as [`QLearning::predict_best_action`]; the greedy policy is also
    /// the sampling policy.
    fn sample_action(&self, obs: &Tensor) -> Result<Tensor> {
        self.predict_best_action(obs)
    }

    /// Copies the live ensemble into the target ensemble.
    fn update_target(&self) -> Result<()> {
        let m = self.modules();
        m.targ_q_func.sync_from(&m.q_func)
    }
}

/// DQN agent.
pub struct Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    modules: DqnModules<Q>,
    gamma: f64,
    critic_loss: CriticLoss,
}

impl<Q> Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs a [`Dqn`] agent.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        let modules = DqnModules::build(&config)?;

        Ok(Self {
            modules,
            gamma: config.gamma,
            critic_loss: config.critic_loss,
        })
    }

    /// The live Q ensemble.
    pub fn q_function(&self) -> &DiscreteEnsembleQFunc<Q> {
        &self.modules.q_func
    }

    /// The target Q ensemble.
    pub fn targ_q_function(&self) -> &DiscreteEnsembleQFunc<Q> {
        &self.modules.targ_q_func
    }

    /// The optimizer of the live Q ensemble.
    pub fn q_function_optim(&self) -> &Optimizer {
        &self.modules.optim
    }
}

impl<Q> QLearning<Q> for Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    fn modules(&self) -> &DqnModules<Q> {
        &self.modules
    }

    fn modules_mut(&mut self) -> &mut DqnModules<Q> {
        &mut self.modules
    }

    fn gamma(&self) -> f64 {
        self.gamma
    }

    fn critic_loss(&self) -> CriticLoss {
        self.critic_loss
    }
}

impl<Q> Agent for Dqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    type Batch = TransitionBatch;
    type Obs = Tensor;
    type Act = Tensor;

    fn update(&mut self, batch: &Self::Batch) -> Result<Record> {
        QLearning::update(self, batch)
    }

    fn update_target(&mut self) -> Result<()> {
        QLearning::update_target(self)
    }

    fn predict_best_action(&self, obs: &Self::Obs) -> Result<Self::Act> {
        QLearning::predict_best_action(self, obs)
    }

    fn sample_action(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        QLearning::sample_action(self, obs)
    }
}

/// Double-DQN agent.
///
/// The arg-max action of the bootstrapped target comes from the live
/// ensemble, while the target value itself is still evaluated by the target
/// ensemble.
pub struct DoubleDqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    inner: Dqn<Q>,
}

impl<Q> DoubleDqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs a [`DoubleDqn`] agent.
    pub fn build(config: DqnConfig<Q::Config>) -> Result<Self> {
        Ok(Self {
            inner: Dqn::build(config)?,
        })
    }

    /// The live Q ensemble.
    pub fn q_function(&self) -> &DiscreteEnsembleQFunc<Q> {
        self.inner.q_function()
    }

    /// The target Q ensemble.
    pub fn targ_q_function(&self) -> &DiscreteEnsembleQFunc<Q> {
        self.inner.targ_q_function()
    }

    /// The optimizer of the live Q ensemble.
    pub fn q_function_optim(&self) -> &Optimizer {
        self.inner.q_function_optim()
    }
}

impl<Q> QLearning<Q> for DoubleDqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    fn modules(&self) -> &DqnModules<Q> {
        &self.inner.modules
    }

    fn modules_mut(&mut self) -> &mut DqnModules<Q> {
        &mut self.inner.modules
    }

    fn gamma(&self) -> f64 {
        self.inner.gamma
    }

    fn critic_loss(&self) -> CriticLoss {
        self.inner.critic_loss
    }

    fn compute_target(&self, batch: &TransitionBatch) -> Result<Tensor> {
        let m = self.modules();
        let action = {
            let q = m
                .q_func
                .expected_q(&batch.next_observations, Reduction::Mean)?;
            q.argmax(D::Minus1)?
        };
        let target =
            m.targ_q_func
                .compute_target(&batch.next_observations, Some(&action), Reduction::Min)?;
        Ok(target.detach())
    }
}

impl<Q> Agent for DoubleDqn<Q>
where
    Q: SubModel1<Input = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    type Batch = TransitionBatch;
    type Obs = Tensor;
    type Act = Tensor;

    fn update(&mut self, batch: &Self::Batch) -> Result<Record> {
        QLearning::update(self, batch)
    }

    fn update_target(&mut self) -> Result<()> {
        QLearning::update_target(self)
    }

    fn predict_best_action(&self, obs: &Self::Obs) -> Result<Self::Act> {
        QLearning::predict_best_action(self, obs)
    }

    fn sample_action(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        QLearning::sample_action(self, obs)
    }
}
