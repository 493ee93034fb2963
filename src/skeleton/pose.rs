//! 单帧姿态

use glam::{Quat, Vec3};

/// 局部姿态
///
/// 骨骼 0 为世界空间根变换，其余骨骼相对父骨骼。
/// 四个数组长度始终相等。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub angular_velocities: Vec<Vec3>,
}

impl Pose {
    /// 创建静止的单位姿态
    pub fn new(bone_count: usize) -> Self {
        Self {
            positions: vec![Vec3::ZERO; bone_count],
            velocities: vec![Vec3::ZERO; bone_count],
            rotations: vec![Quat::IDENTITY; bone_count],
            angular_velocities: vec![Vec3::ZERO; bone_count],
        }
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.positions.len()
    }

    /// 原地拷贝（不重新分配）
    #[inline]
    pub fn copy_from(&mut self, other: &Pose) {
        self.positions.copy_from_slice(&other.positions);
        self.velocities.copy_from_slice(&other.velocities);
        self.rotations.copy_from_slice(&other.rotations);
        self.angular_velocities.copy_from_slice(&other.angular_velocities);
    }

    /// 借用视图
    #[inline]
    pub fn view(&self) -> PoseView<'_> {
        PoseView {
            positions: &self.positions,
            velocities: &self.velocities,
            rotations: &self.rotations,
            angular_velocities: &self.angular_velocities,
        }
    }

    /// 从视图原地拷贝
    #[inline]
    pub fn copy_from_view(&mut self, view: &PoseView<'_>) {
        self.positions.copy_from_slice(view.positions);
        self.velocities.copy_from_slice(view.velocities);
        self.rotations.copy_from_slice(view.rotations);
        self.angular_velocities.copy_from_slice(view.angular_velocities);
    }

    #[inline]
    pub fn root_position(&self) -> Vec3 {
        self.positions[0]
    }

    #[inline]
    pub fn root_rotation(&self) -> Quat {
        self.rotations[0]
    }
}

/// 姿态的借用视图（数据库帧或 Pose）
#[derive(Clone, Copy, Debug)]
pub struct PoseView<'a> {
    pub positions: &'a [Vec3],
    pub velocities: &'a [Vec3],
    pub rotations: &'a [Quat],
    pub angular_velocities: &'a [Vec3],
}
