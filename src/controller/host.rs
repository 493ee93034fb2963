//! 宿主边界
//!
//! 核心使用 Y 轴向上、米为单位的右手坐标系。
//! 坐标轴与单位转换只在这里做：输入进入时一次，姿态输出时一次。

use glam::{Quat, Vec3};

use crate::trajectory::Obstacle;

use super::{ControllerInput, FrameOutput};

/// 宿主坐标约定
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum HostAxes {
    /// 与核心一致
    #[default]
    Native,
    /// Z 轴向上的左手坐标系（交换 y / z），带长度单位缩放
    ZUpLeftHanded { units_per_meter: f32 },
}

impl HostAxes {
    pub fn position_to_host(&self, p: Vec3) -> Vec3 {
        match *self {
            HostAxes::Native => p,
            HostAxes::ZUpLeftHanded { units_per_meter } => Vec3::new(p.x, p.z, p.y) * units_per_meter,
        }
    }

    pub fn position_from_host(&self, p: Vec3) -> Vec3 {
        match *self {
            HostAxes::Native => p,
            HostAxes::ZUpLeftHanded { units_per_meter } => Vec3::new(p.x, p.z, p.y) / units_per_meter,
        }
    }

    /// 旋转经镜像后轴取反、角度不变
    pub fn rotation_to_host(&self, q: Quat) -> Quat {
        match *self {
            HostAxes::Native => q,
            HostAxes::ZUpLeftHanded { .. } => Quat::from_xyzw(-q.x, -q.z, -q.y, q.w),
        }
    }

    pub fn rotation_from_host(&self, q: Quat) -> Quat {
        // 镜像变换是对合，正反相同
        self.rotation_to_host(q)
    }

    /// 绕竖直轴的方位角（镜像后方向相反）
    pub fn azimuth_from_host(&self, azimuth: f32) -> f32 {
        match *self {
            HostAxes::Native => azimuth,
            HostAxes::ZUpLeftHanded { .. } => -azimuth,
        }
    }

    fn extents_from_host(&self, e: Vec3) -> Vec3 {
        match *self {
            HostAxes::Native => e,
            HostAxes::ZUpLeftHanded { units_per_meter } => Vec3::new(e.x, e.z, e.y) / units_per_meter,
        }
    }
}

/// 接收姿态的宿主能力（网格、调试绘制等）
pub trait PoseSink {
    /// 根变换（宿主坐标系）
    fn set_root(&mut self, position: Vec3, rotation: Quat);
    /// 骨骼全局变换（宿主坐标系）
    fn set_bone(&mut self, bone: usize, position: Vec3, rotation: Quat);
}

/// 宿主桥接：输入转换 + 姿态输出
#[derive(Clone, Copy, Debug, Default)]
pub struct HostBridge {
    axes: HostAxes,
}

impl HostBridge {
    pub fn new(axes: HostAxes) -> Self {
        Self { axes }
    }

    #[inline]
    pub fn axes(&self) -> HostAxes {
        self.axes
    }

    /// 宿主输入转为核心输入
    ///
    /// 摇杆相对相机，不需要转换；方位角与障碍物需要。
    pub fn input_from_host(&self, input: &ControllerInput) -> ControllerInput {
        ControllerInput {
            camera_azimuth: input.camera_azimuth.map(|a| self.axes.azimuth_from_host(a)),
            obstacles: input
                .obstacles
                .iter()
                .map(|o| Obstacle::new(self.axes.position_from_host(o.center), self.axes.extents_from_host(o.half_extents)))
                .collect(),
            ..input.clone()
        }
    }

    /// 把一帧输出写入宿主
    pub fn publish<S: PoseSink + ?Sized>(&self, frame: &FrameOutput<'_>, sink: &mut S) {
        sink.set_root(
            self.axes.position_to_host(frame.root_position),
            self.axes.rotation_to_host(frame.root_rotation),
        );
        for (bone, (position, rotation)) in frame
            .global_positions
            .iter()
            .zip(frame.global_rotations)
            .enumerate()
        {
            sink.set_bone(bone, self.axes.position_to_host(*position), self.axes.rotation_to_host(*rotation));
        }
    }
}
