use crate::{dist::SquashedNormal, model::SubModel1, util::OutDim};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`].
pub struct GaussianActorConfig<P: OutDim> {
    pub(super) pi_config: Option<P>,
    pub(super) min_lstd: f64,
    pub(super) max_lstd: f64,
    pub(super) epsilon: f64,
}

impl<P: OutDim> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            min_lstd: -20.0,
            max_lstd: 2.0,
            epsilon: 1e-6,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets the output dimension, the size of the action vector.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Constructs [`GaussianActorConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Squashed-Gaussian policy of continuous-action agents.
///
/// The network outputs the mean and log standard deviation of a diagonal
/// Gaussian, whose samples are squashed by `tanh`.
pub struct GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    varmap: VarMap,
    out_dim: i64,
    min_lstd: f64,
    max_lstd: f64,
    epsilon: f64,
    pi: P,
}

impl<P> GaussianActor<P>
where
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: &Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let out_dim = pi_config.get_out_dim();
        let varmap = VarMap::new();
        let pi = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            P::build(vb, pi_config)
        };

        Ok(Self {
            varmap,
            out_dim,
            min_lstd: config.min_lstd,
            max_lstd: config.max_lstd,
            epsilon: config.epsilon,
            pi,
        })
    }

    /// Returns the action distribution for the given observations.
    pub fn dist(&self, obs: &Tensor) -> Result<SquashedNormal> {
        let (mean, lstd) = self.pi.forward(obs);
        let std = lstd.clamp(self.min_lstd, self.max_lstd)?.exp()?;

        debug_assert_eq!(mean.dims()[1], self.out_dim as usize);

        Ok(SquashedNormal::new(mean, std, self.epsilon))
    }

    /// The size of the action vector.
    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }

    /// Variables of the policy network.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters of the policy network.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save actor to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters of the policy network.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load actor from {:?}", path.as_ref());
        Ok(())
    }
}
