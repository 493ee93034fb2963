//! 正向运动学

use glam::{Quat, Vec3};

use super::{PoseView, Skeleton};

/// 单骨骼正向运动学
pub fn forward_kinematics(pose: &PoseView<'_>, skeleton: &Skeleton, bone: usize) -> (Vec3, Quat) {
    match skeleton.parent_id(bone) {
        Some(parent) => {
            let (parent_position, parent_rotation) = forward_kinematics(pose, skeleton, parent);
            (
                parent_rotation * pose.positions[bone] + parent_position,
                parent_rotation * pose.rotations[bone],
            )
        }
        None => (pose.positions[bone], pose.rotations[bone]),
    }
}

/// 带速度的正向运动学，返回 (位置, 速度, 旋转, 角速度)
pub fn forward_kinematics_velocity(
    pose: &PoseView<'_>,
    skeleton: &Skeleton,
    bone: usize,
) -> (Vec3, Vec3, Quat, Vec3) {
    match skeleton.parent_id(bone) {
        Some(parent) => {
            let (pp, pv, pr, pa) = forward_kinematics_velocity(pose, skeleton, parent);
            let offset = pr * pose.positions[bone];
            (
                offset + pp,
                pv + pr * pose.velocities[bone] + pa.cross(offset),
                pr * pose.rotations[bone],
                pr * pose.angular_velocities[bone] + pa,
            )
        }
        None => (
            pose.positions[bone],
            pose.velocities[bone],
            pose.rotations[bone],
            pose.angular_velocities[bone],
        ),
    }
}

/// 全骨骼正向运动学（父索引总在子之前，可顺序计算）
pub fn forward_kinematics_full(
    pose: &PoseView<'_>,
    skeleton: &Skeleton,
    global_positions: &mut [Vec3],
    global_rotations: &mut [Quat],
) {
    for bone in 0..skeleton.bone_count() {
        match skeleton.parent_id(bone) {
            Some(parent) => {
                let parent_rotation = global_rotations[parent];
                global_positions[bone] = parent_rotation * pose.positions[bone] + global_positions[parent];
                global_rotations[bone] = parent_rotation * pose.rotations[bone];
            }
            None => {
                global_positions[bone] = pose.positions[bone];
                global_rotations[bone] = pose.rotations[bone];
            }
        }
    }
}

// ============================================================================
// 按需计算
// ============================================================================

/// 按需计算的全局姿态缓存
///
/// 只计算被访问的骨骼及其祖先。局部姿态改动后需调用 `invalidate`。
#[derive(Clone, Debug)]
pub struct GlobalPoseCache {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    computed: Vec<bool>,
}

impl GlobalPoseCache {
    pub fn new(bone_count: usize) -> Self {
        Self {
            positions: vec![Vec3::ZERO; bone_count],
            rotations: vec![Quat::IDENTITY; bone_count],
            computed: vec![false; bone_count],
        }
    }

    /// 清除全部已计算标记
    pub fn invalidate(&mut self) {
        self.computed.fill(false);
    }

    /// 计算骨骼全局变换（已计算时直接返回）
    pub fn compute(&mut self, pose: &PoseView<'_>, skeleton: &Skeleton, bone: usize) -> (Vec3, Quat) {
        if !self.computed[bone] {
            match skeleton.parent_id(bone) {
                Some(parent) => {
                    let (parent_position, parent_rotation) = self.compute(pose, skeleton, parent);
                    self.positions[bone] = parent_rotation * pose.positions[bone] + parent_position;
                    self.rotations[bone] = parent_rotation * pose.rotations[bone];
                }
                None => {
                    self.positions[bone] = pose.positions[bone];
                    self.rotations[bone] = pose.rotations[bone];
                }
            }
            self.computed[bone] = true;
        }
        (self.positions[bone], self.rotations[bone])
    }
}
