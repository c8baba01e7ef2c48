//! Soft actor-critic agent for discrete action spaces.
mod base;
mod config;
pub use base::{DiscreteSac, DiscreteSacModules};
pub use config::DiscreteSacConfig;
