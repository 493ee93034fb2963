//! 角色控制器
//!
//! 把数据库、特征、轨迹、惯性化、接触与 IK 串成每帧一次的 `tick`。
//! 宿主坐标转换在 `host` 中完成，控制器内部只使用核心坐标系。

mod input;
mod host;
mod root;
mod assets;
mod motion_matching;

pub use input::{ControllerInput, FrameOutput};
pub use host::{HostAxes, HostBridge, PoseSink};
pub use root::{
    adjust_character_position, adjust_character_position_by_velocity, adjust_character_rotation,
    adjust_character_rotation_by_velocity, clamp_character_position, clamp_character_rotation,
    synchronize_root, RootCorrection,
};
pub use assets::{AssetPaths, ControllerAssets};
pub use motion_matching::MotionMatchingController;

use bitflags::bitflags;

bitflags! {
    /// 控制器模式开关
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ControllerFlags: u32 {
        /// 动画根按半衰期拉向模拟根
        const ADJUSTMENT = 0x0001;
        /// 调整量受当前速度限制
        const ADJUSTMENT_BY_VELOCITY = 0x0002;
        /// 偏差超出阈值时钳制
        const CLAMPING = 0x0004;
        /// 模拟根跟随动画根（优先于钳制与调整）
        const SYNCHRONIZATION = 0x0008;
        /// 脚部接触锁定与腿部 IK
        const IK = 0x0010;
        /// 学习式运动匹配（需要加载网络）
        const LEARNED = 0x0020;
    }
}

impl Default for ControllerFlags {
    fn default() -> Self {
        ControllerFlags::ADJUSTMENT
            | ControllerFlags::ADJUSTMENT_BY_VELOCITY
            | ControllerFlags::CLAMPING
            | ControllerFlags::IK
    }
}
