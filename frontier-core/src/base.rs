//! Agent interface.
use crate::record::Record;
use anyhow::Result;

/// A trainable off-policy agent.
///
/// An external training loop feeds mini-batches to [`Agent::update`] and
/// decides when target networks are refreshed via [`Agent::update_target`].
/// Each update zeroes gradients, performs one forward/backward pass, steps
/// the optimizers of the agent and returns scalar metrics for logging.
pub trait Agent {
    /// Mini-batch consumed by one update call.
    type Batch;

    /// Observations given to inference methods.
    type Obs;

    /// Actions returned by inference methods.
    type Act;

    /// Performs one learning update on the given mini-batch.
    fn update(&mut self, batch: &Self::Batch) -> Result<Record>;

    /// Copies the parameters of the live networks into the target networks.
    fn update_target(&mut self) -> Result<()>;

    /// Returns the greedy action for the given observations.
    fn predict_best_action(&self, obs: &Self::Obs) -> Result<Self::Act>;

    /// Samples an action for the given observations.
    ///
    /// Takes `&mut self` because implementations may own random number
    /// generator state.
    fn sample_action(&mut self, obs: &Self::Obs) -> Result<Self::Act>;
}
