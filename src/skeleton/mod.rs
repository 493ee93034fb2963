//! 骨骼系统
//!
//! 核心设计思想：
//! - Skeleton: 不可变的骨骼拓扑（父索引 + 角色映射），加载时校验
//! - Pose: 单帧局部姿态（根骨骼为世界空间）
//! - kinematics: 正向运动学（完整 / 按需 / 带速度）
//! - ik: 两骨 IK 与朝向约束
//! - contact: 脚部接触锁定状态机

mod pose;
mod kinematics;
mod ik;
mod contact;
mod character;

pub use pose::{Pose, PoseView};
pub use kinematics::{
    forward_kinematics, forward_kinematics_full, forward_kinematics_velocity, GlobalPoseCache,
};
pub use ik::{ik_two_bone, ik_look_at, LegIkSettings, solve_leg};
pub use contact::ContactState;
pub use character::Character;

use glam::Vec3;

use crate::{MotionError, Result};

// ============================================================================
// 默认骨骼布局
// ============================================================================

/// 默认 23 骨骼命名（与数据库导出顺序一致）
pub const DEFAULT_BONE_NAMES: [&str; 23] = [
    "Root",
    "Hips",
    "LeftUpLeg",
    "LeftLeg",
    "LeftFoot",
    "LeftToe",
    "RightUpLeg",
    "RightLeg",
    "RightFoot",
    "RightToe",
    "Spine",
    "Spine1",
    "Spine2",
    "Neck",
    "Head",
    "LeftShoulder",
    "LeftArm",
    "LeftForeArm",
    "LeftHand",
    "RightShoulder",
    "RightArm",
    "RightForeArm",
    "RightHand",
];

/// 按名称查找默认布局中的骨骼索引
pub fn default_bone_index(name: &str) -> Option<usize> {
    DEFAULT_BONE_NAMES.iter().position(|n| *n == name)
}

// ============================================================================
// 骨骼角色
// ============================================================================

/// 特征与 IK 使用的骨骼角色
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonRoles {
    pub hips: usize,
    pub left_foot: usize,
    pub right_foot: usize,
    pub left_toe: usize,
    pub right_toe: usize,
    /// 膝盖局部空间中的前向轴（IK 弯曲方向）
    pub knee_forward_axis: Vec3,
    /// 脚尖局部空间中指向脚尖末端的轴
    pub toe_axis: Vec3,
}

impl Default for SkeletonRoles {
    fn default() -> Self {
        Self {
            hips: 1,
            left_foot: 4,
            right_foot: 8,
            left_toe: 5,
            right_toe: 9,
            knee_forward_axis: Vec3::Y,
            toe_axis: Vec3::X,
        }
    }
}

impl SkeletonRoles {
    /// 接触骨骼（左脚尖、右脚尖）
    #[inline]
    pub fn contact_bones(&self) -> [usize; 2] {
        [self.left_toe, self.right_toe]
    }

    fn indices(&self) -> [(&'static str, usize); 5] {
        [
            ("hips", self.hips),
            ("left_foot", self.left_foot),
            ("right_foot", self.right_foot),
            ("left_toe", self.left_toe),
            ("right_toe", self.right_toe),
        ]
    }
}

// ============================================================================
// 骨骼拓扑
// ============================================================================

/// 骨骼拓扑（加载后不可变）
#[derive(Clone, Debug)]
pub struct Skeleton {
    /// 父骨骼索引（-1 表示根）
    parents: Vec<i32>,
    roles: SkeletonRoles,
}

impl Skeleton {
    /// 创建并校验骨骼拓扑
    ///
    /// 要求：骨骼 0 为根，其余骨骼的父索引小于自身索引。
    pub fn new(parents: Vec<i32>, roles: SkeletonRoles) -> Result<Self> {
        if parents.is_empty() {
            return Err(MotionError::InvalidData("Skeleton has no bones".to_string()));
        }
        if parents[0] != -1 {
            return Err(MotionError::InvalidData(format!(
                "Root bone must have no parent, got {}", parents[0]
            )));
        }
        for (i, &p) in parents.iter().enumerate().skip(1) {
            if p < 0 || p as usize >= i {
                return Err(MotionError::InvalidData(format!(
                    "Bone {} has invalid parent {}", i, p
                )));
            }
        }

        let bone_count = parents.len();
        for (name, index) in roles.indices() {
            if index == 0 || index >= bone_count {
                return Err(MotionError::InvalidData(format!(
                    "Role {} refers to bone {} (bone count {})", name, index, bone_count
                )));
            }
        }
        // 两骨 IK 需要 脚尖 <- 脚 <- 小腿 <- 大腿 <- 父骨骼
        let skeleton = Self { parents, roles };
        for toe in skeleton.roles.contact_bones() {
            if skeleton.ancestor(toe, 4).is_none() {
                return Err(MotionError::InvalidData(format!(
                    "Contact bone {} needs four ancestors for leg IK", toe
                )));
            }
        }
        Ok(skeleton)
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    pub fn parents(&self) -> &[i32] {
        &self.parents
    }

    #[inline]
    pub fn roles(&self) -> &SkeletonRoles {
        &self.roles
    }

    /// 获取父骨骼索引
    #[inline]
    pub fn parent_id(&self, bone: usize) -> Option<usize> {
        let p = self.parents[bone];
        if p >= 0 { Some(p as usize) } else { None }
    }

    /// 向上第 n 级祖先
    pub fn ancestor(&self, bone: usize, levels: usize) -> Option<usize> {
        let mut current = bone;
        for _ in 0..levels {
            current = self.parent_id(current)?;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg_parents() -> Vec<i32> {
        vec![-1, 0, 1, 2, 3, 4, 1, 6, 7, 8]
    }

    #[test]
    fn test_valid_skeleton() {
        let skeleton = Skeleton::new(leg_parents(), SkeletonRoles::default()).unwrap();
        assert_eq!(skeleton.bone_count(), 10);
        assert_eq!(skeleton.parent_id(0), None);
        assert_eq!(skeleton.parent_id(5), Some(4));
        assert_eq!(skeleton.ancestor(9, 4), Some(1));
    }

    #[test]
    fn test_parent_after_child_rejected() {
        let mut parents = leg_parents();
        parents[3] = 5;
        assert!(Skeleton::new(parents, SkeletonRoles::default()).is_err());
    }

    #[test]
    fn test_role_out_of_range_rejected() {
        let roles = SkeletonRoles { right_toe: 12, ..SkeletonRoles::default() };
        assert!(Skeleton::new(leg_parents(), roles).is_err());
    }

    #[test]
    fn test_default_bone_names() {
        assert_eq!(default_bone_index("LeftToe"), Some(5));
        assert_eq!(default_bone_index("RightHand"), Some(22));
        assert_eq!(default_bone_index("Tail"), None);
    }
}
