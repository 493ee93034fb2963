//! 运动匹配角色控制器
//!
//! 根据每帧的移动 / 视角输入输出连续的全身姿态：
//! - 动作数据库 + 特征最近邻搜索（或学习式网络生成）
//! - 惯性化消除切换跳变
//! - 弹簧模拟预测未来轨迹
//! - 脚部接触锁定与两骨 IK

pub mod config;
pub mod error;
pub mod math;
pub mod binary;
pub mod skeleton;
pub mod animation;
pub mod trajectory;
pub mod nnet;
pub mod controller;

#[cfg(test)]
mod test_support;

pub use config::{get_config, reset_config, set_config, MotionConfig};
pub use controller::{
    AssetPaths, ControllerAssets, ControllerFlags, ControllerInput, FrameOutput, HostAxes, HostBridge,
    MotionMatchingController, PoseSink,
};
pub use error::{MotionError, Result};
