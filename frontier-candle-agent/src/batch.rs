//! Mini-batches of transitions.
use anyhow::Result;
use candle_core::{Device, Tensor};

/// A mini-batch of transitions sampled by an external data pipeline.
///
/// The batch is borrowed by one update call and never mutated by it.
/// `rewards`, `terminals` and `intervals` are `[batch_size]` tensors;
/// `terminals` holds 0/1 flags and `intervals` the number of environment
/// steps each transition spans, used to discount multi-step returns.
#[derive(Debug, Clone)]
pub struct TransitionBatch {
    /// Observations at the start of the transitions.
    pub observations: Tensor,

    /// Actions taken in the transitions.
    pub actions: Tensor,

    /// Observations at the end of the transitions.
    pub next_observations: Tensor,

    /// Rewards of the transitions.
    pub rewards: Tensor,

    /// Termination flags of the transitions.
    pub terminals: Tensor,

    /// Step intervals of the transitions.
    pub intervals: Tensor,
}

impl TransitionBatch {
    /// Creates a batch from its fields.
    pub fn new(
        observations: Tensor,
        actions: Tensor,
        next_observations: Tensor,
        rewards: Tensor,
        terminals: Tensor,
        intervals: Tensor,
    ) -> Self {
        Self {
            observations,
            actions,
            next_observations,
            rewards,
            terminals,
            intervals,
        }
    }

    /// The number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.rewards.elem_count()
    }

    /// Returns `true` if the batch has no transitions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every tensor of the batch to the given device.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        Ok(Self {
            observations: self.observations.to_device(device)?,
            actions: self.actions.to_device(device)?,
            next_observations: self.next_observations.to_device(device)?,
            rewards: self.rewards.to_device(device)?,
            terminals: self.terminals.to_device(device)?,
            intervals: self.intervals.to_device(device)?,
        })
    }
}
