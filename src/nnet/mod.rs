//! 神经网络求值与学习式运动匹配

mod network;
mod lmm;

pub use network::{Evaluation, Layer, Network};
pub use lmm::{
    decompressor_evaluate, decompressor_output_size, projector_evaluate, stepper_evaluate,
    LearnedMotion, Projection,
};
