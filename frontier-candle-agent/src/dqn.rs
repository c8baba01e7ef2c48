//! DQN and Double-DQN agents.
mod base;
mod config;
pub use base::{DoubleDqn, Dqn, DqnModules, QLearning};
pub use config::DqnConfig;
