use super::EntCoefMode;
use crate::{
    opt::OptimizerConfig,
    policy::GaussianActorConfig,
    util::{CriticLoss, OutDim},
    Device,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Sac`](super::Sac).
pub struct SacConfig<Q, P>
where
    P: OutDim,
{
    /// Configuration of the Q-network.
    pub q_config: Option<Q>,

    /// Configuration of the policy.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the optimizer of the critic ensemble.
    pub critic_opt_config: OptimizerConfig,

    /// Configuration of the optimizer of the policy.
    pub actor_opt_config: OptimizerConfig,

    /// Mode of the entropy coefficient.
    pub ent_coef_mode: EntCoefMode,

    /// The number of members of the critic ensemble.
    pub n_critics: usize,

    /// Discount factor.
    pub gamma: f64,

    /// Critic loss type.
    pub critic_loss: CriticLoss,

    /// Device on which the networks are built.
    pub device: Option<Device>,
}

impl<Q, P: OutDim> Default for SacConfig<Q, P> {
    fn default() -> Self {
        Self {
            q_config: None,
            actor_config: GaussianActorConfig::default(),
            critic_opt_config: OptimizerConfig::default(),
            actor_opt_config: OptimizerConfig::default(),
            ent_coef_mode: EntCoefMode::Auto(3e-4),
            n_critics: 2,
            gamma: 0.99,
            critic_loss: CriticLoss::Mse,
            device: None,
        }
    }
}

impl<Q, P> SacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the Q-network.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the configuration of the policy.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the mode of the entropy coefficient.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Sets the number of critic ensemble members.
    pub fn n_critics(mut self, v: usize) -> Self {
        self.n_critics = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the critic loss type.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Constructs [`SacConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SacConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
