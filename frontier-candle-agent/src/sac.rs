//! Soft actor-critic agent for continuous action spaces.
mod base;
mod config;
mod ent_coef;
pub use base::{Sac, SacModules};
pub use config::SacConfig;
pub use ent_coef::{EntCoef, EntCoefMode};
