//! Policy networks mapping observations to action distributions.
mod categorical;
mod gaussian;
pub use categorical::{CategoricalActor, CategoricalActorConfig};
pub use gaussian::{GaussianActor, GaussianActorConfig};
