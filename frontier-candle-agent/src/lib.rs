//! Off-policy RL agents implemented with [candle](https://crates.io/crates/candle-core).
pub mod batch;
pub mod dist;
pub mod dqn;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod policy;
pub mod q_func;
pub mod sac;
pub mod sac_discrete;
pub mod util;
use serde::{Deserialize, Serialize};
pub use batch::TransitionBatch;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl From<candle_core::Device> for Device {
    fn from(device: candle_core::Device) -> Self {
        match device {
            candle_core::Device::Cpu => Self::Cpu,
            _ => unimplemented!(),
        }
    }
}

impl From<Device> for candle_core::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(n) => candle_core::Device::new_cuda(n).unwrap(),
        }
    }
}
