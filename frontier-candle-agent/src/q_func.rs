//! Ensemble Q-functions.
//!
//! An ensemble holds one or more independently parameterized Q-networks.
//! Bootstrapped targets are reduced with the element-wise minimum across the
//! members to counteract overestimation bias.
mod continuous;
mod discrete;
pub use continuous::{ContinuousEnsembleQFunc, ContinuousQFunc};
pub use discrete::{DiscreteEnsembleQFunc, DiscreteQFunc};
use serde::{Deserialize, Serialize};

/// Reduction applied across the members of an ensemble.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Reduction {
    /// Element-wise minimum.
    Min,

    /// Element-wise mean.
    Mean,
}
