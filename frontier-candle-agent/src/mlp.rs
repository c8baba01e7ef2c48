//! Multilayer perceptron.
mod base;
mod config;
mod mlp2;
pub use base::Mlp;
use candle_core::Tensor;
use candle_nn::{Linear, Module};
pub use config::MlpConfig;
pub use mlp2::Mlp2;

fn mlp_forward(xs: Tensor, layers: &[Linear]) -> Tensor {
    let n_layers = layers.len();
    let mut xs = xs;

    for layer in layers.iter().take(n_layers - 1) {
        xs = layer.forward(&xs).unwrap().relu().unwrap();
    }

    layers[n_layers - 1].forward(&xs).unwrap()
}
