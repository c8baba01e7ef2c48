use crate::{
    opt::OptimizerConfig,
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
/// Configuration of [`Dqn`](super::Dqn) and [`DoubleDqn`](super::DoubleDqn).
pub struct DqnConfig<Q>
where
    Q: OutDim,
{
    /// Configuration of the Q-network.
    pub q_config: Option<Q>,

    /// Configuration of the optimizer of the Q ensemble.
    pub opt_config: OptimizerConfig,

    /// The number of members of the Q ensemble.
    pub n_critics: usize,

    /// Discount factor.
    pub gamma: f64,

    /// Critic loss type.
    pub critic_loss: CriticLoss,

    /// Device on which the networks are built.
    pub device: Option<Device>,
}

impl<Q: OutDim> Default for DqnConfig<Q> {
    fn default() -> Self {
        Self {
            q_config: None,
            opt_config: OptimizerConfig::default(),
            n_critics: 1,
            gamma: 0.99,
            critic_loss: CriticLoss::Mse,
            device: None,
        }
    }
}

impl<Q> DqnConfig<Q>
where
    Q: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the Q-network.
    pub fn q_config(mut self, v: Q) -> Self {
        self.q_config = Some(v);
        self
    }

    /// Sets the output dimension, the number of actions.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(q_config) = &mut self.q_config {
            q_config.set_out_dim(v);
        }
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the number of ensemble members.
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

    /// Constructs [`DqnConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
