use crate::{dist::Categorical, model::SubModel1, util::OutDim};
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
/// Configuration of [`CategoricalActor`].
pub struct CategoricalActorConfig<P: OutDim> {
    pub(super) pi_config: Option<P>,
}

impl<P: OutDim> Default for CategoricalActorConfig<P> {
    fn default() -> Self {
        Self { pi_config: None }
    }
}

impl<P> CategoricalActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets the output dimension, the number of actions.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Constructs [`CategoricalActorConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CategoricalActorConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Categorical policy of discrete-action agents.
///
/// The network outputs one logit per action.
pub struct CategoricalActor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    varmap: VarMap,
    action_size: i64,
    pi: P,
}

impl<P> CategoricalActor<P>
where
    P: SubModel1<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + Clone,
{
    /// Constructs [`CategoricalActor`].
    pub fn build(config: CategoricalActorConfig<P::Config>, device: &Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let action_size = pi_config.get_out_dim();
        let varmap = VarMap::new();
        let pi = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
            P::build(vb, pi_config)
        };

        Ok(Self {
            varmap,
            action_size,
            pi,
        })
    }

    /// Returns the action distribution for the given observations.
    pub fn dist(&self, obs: &Tensor) -> Result<Categorical> {
        let logits = self.pi.forward(obs);

        debug_assert_eq!(logits.dims()[1], self.action_size as usize);

        Ok(Categorical::new(logits))
    }

    /// The number of actions.
    pub fn action_size(&self) -> i64 {
        self.action_size
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
