//! 每帧输入与输出

use glam::{Quat, Vec2, Vec3};

use crate::trajectory::{Obstacle, StickInput};

/// 每帧控制输入（核心坐标系）
///
/// 摇杆为二维：x 向右，y 向前（相对相机）。
#[derive(Clone, Debug, Default)]
pub struct ControllerInput {
    pub move_stick: Vec2,
    pub look_stick: Vec2,
    /// 侧移（面向相机方向）
    pub strafe: bool,
    /// 行走（否则奔跑）
    pub walk: bool,
    /// 宿主指定的相机方位角；为 None 时由视角摇杆推进
    pub camera_azimuth: Option<f32>,
    pub obstacles: Vec<Obstacle>,
}

/// 摇杆映射到 xz 平面：相机前方为 -z
#[inline]
fn stick_to_plane(stick: Vec2) -> Vec3 {
    let stick = stick.clamp_length_max(1.0);
    Vec3::new(stick.x, 0.0, -stick.y)
}

impl ControllerInput {
    pub fn sticks(&self) -> StickInput {
        StickInput {
            movement: stick_to_plane(self.move_stick),
            look: stick_to_plane(self.look_stick),
            strafe: self.strafe,
        }
    }
}

/// 每帧输出：全局姿态与根变换（借用控制器内部缓冲）
#[derive(Clone, Copy, Debug)]
pub struct FrameOutput<'a> {
    pub global_positions: &'a [Vec3],
    pub global_rotations: &'a [Quat],
    pub root_position: Vec3,
    pub root_rotation: Quat,
}
