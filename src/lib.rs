//! Dense multilayer-perceptron engine: a row-major matrix primitive, a
//! flat-buffer network model with pooled scratch memory, backpropagation
//! training, and a bit-exact persistence codec.

mod activation;
mod cost;
pub mod mat;
mod nn;
mod pool;
mod sample;
mod store;
mod train;

pub use activation::*;
pub use cost::*;
pub use mat::{Mat, MatMut, MatRef};
pub use nn::*;
pub use sample::*;
pub use store::*;
