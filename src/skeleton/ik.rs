//! 两骨 IK 与朝向约束
//!
//! 与迭代 CCD 不同，两骨 IK 使用余弦定理一次解出：
//! 1. 按余弦定理计算目标距离下根关节、中间关节应有的夹角
//! 2. 绕弯曲轴旋转修正夹角
//! 3. 整体旋转使末端方向对准目标
//!
//! 所有 acos 参数都做了钳制，所有归一化都有退化保护。

use glam::{Quat, Vec3};

use crate::math::quat_between;

use super::{ContactState, GlobalPoseCache, Pose, Skeleton};

/// 夹角计算用的长度下限
const MIN_LENGTH: f32 = 1e-5;

/// 两骨 IK
///
/// # 参数
/// - `root_local` / `mid_local`: 输出的根关节、中间关节局部旋转
/// - `root` / `mid` / `end`: 三个关节的全局位置
/// - `target`: 末端目标位置（超出可达范围时沿方向钳制）
/// - `forward`: 弯曲前向（决定弯曲平面）
/// - `root_global` / `mid_global` / `parent_global`: 根关节、中间关节、根关节父骨骼的全局旋转
/// - `max_length_buffer`: 最大伸展长度缓冲，避免完全伸直
#[allow(clippy::too_many_arguments)]
pub fn ik_two_bone(
    root_local: &mut Quat,
    mid_local: &mut Quat,
    root: Vec3,
    mid: Vec3,
    end: Vec3,
    target: Vec3,
    forward: Vec3,
    root_global: Quat,
    mid_global: Quat,
    parent_global: Quat,
    max_length_buffer: f32,
) {
    let lab = (mid - root).length();
    let lcb = (mid - end).length();
    let max_extension = lab + lcb - max_length_buffer;

    // 钳制到可达范围
    let mut target_clamp = target;
    let to_target = target - root;
    if to_target.length() > max_extension {
        target_clamp = root + max_extension * to_target.normalize_or_zero();
    }

    // 弯曲轴
    let axis_dwn = (end - root).normalize_or_zero();
    let mut axis_rot = axis_dwn.cross(forward).normalize_or_zero();
    if axis_rot.length_squared() < 1e-8 {
        axis_rot = if axis_dwn.length_squared() < 1e-8 {
            Vec3::X
        } else {
            axis_dwn.any_orthonormal_vector()
        };
    }

    let a = root;
    let b = mid;
    let c = end;
    let t = target_clamp;

    let lab = lab.max(MIN_LENGTH);
    let lcb = lcb.max(MIN_LENGTH);
    let lat = (t - a).length().max(MIN_LENGTH);

    // 当前夹角
    let ac_ab_0 = (c - a).normalize_or_zero().dot((b - a).normalize_or_zero()).clamp(-1.0, 1.0).acos();
    let ba_bc_0 = (a - b).normalize_or_zero().dot((c - b).normalize_or_zero()).clamp(-1.0, 1.0).acos();

    // 目标夹角（余弦定理）
    let ac_ab_1 = ((lab * lab + lat * lat - lcb * lcb) / (2.0 * lab * lat)).clamp(-1.0, 1.0).acos();
    let ba_bc_1 = ((lab * lab + lcb * lcb - lat * lat) / (2.0 * lab * lcb)).clamp(-1.0, 1.0).acos();

    let r0 = Quat::from_axis_angle(axis_rot, ac_ab_1 - ac_ab_0);
    let r1 = Quat::from_axis_angle(axis_rot, ba_bc_1 - ba_bc_0);

    // 末端方向对准目标
    let r2 = quat_between(c - a, t - a);

    *root_local = (parent_global.inverse() * (r2 * (r0 * root_global))).normalize();
    *mid_local = (root_global.inverse() * (r1 * mid_global)).normalize();
}

/// 旋转骨骼，使其子骨骼朝向目标点
///
/// 已对齐或方向退化时不修改。
pub fn ik_look_at(
    bone_local: &mut Quat,
    parent_global: Quat,
    bone_global: Quat,
    bone_position: Vec3,
    child_position: Vec3,
    target_position: Vec3,
) {
    let current = (child_position - bone_position).normalize_or_zero();
    let desired = (target_position - bone_position).normalize_or_zero();
    if current == Vec3::ZERO || desired == Vec3::ZERO {
        return;
    }
    if (1.0 - current.dot(desired)).abs() > 1e-5 {
        *bone_local = (parent_global.inverse() * (quat_between(current, desired) * bone_global)).normalize();
    }
}

// ============================================================================
// 腿部 IK
// ============================================================================

/// 腿部 IK 参数
#[derive(Clone, Copy, Debug)]
pub struct LegIkSettings {
    pub max_length_buffer: f32,
    pub foot_height: f32,
    pub toe_length: f32,
    pub knee_forward_axis: Vec3,
    pub toe_axis: Vec3,
}

/// 求解一条腿：脚尖放到接触点
///
/// 骨骼链由脚尖向上推导：脚尖 <- 脚跟 <- 膝盖 <- 髋 <- 髋的父骨骼。
/// 结果直接写入 `pose` 的局部旋转，`cache` 在函数内失效重算。
pub fn solve_leg(
    pose: &mut Pose,
    skeleton: &Skeleton,
    cache: &mut GlobalPoseCache,
    toe: usize,
    contact: &ContactState,
    settings: &LegIkSettings,
) {
    let (heel, knee, hip, root) = match (
        skeleton.ancestor(toe, 1),
        skeleton.ancestor(toe, 2),
        skeleton.ancestor(toe, 3),
        skeleton.ancestor(toe, 4),
    ) {
        (Some(heel), Some(knee), Some(hip), Some(root)) => (heel, knee, hip, root),
        _ => return,
    };

    // 接触点不穿透地面
    let mut contact_position = contact.position;
    contact_position.y = contact_position.y.max(settings.foot_height);

    cache.invalidate();
    let (toe_position, _) = cache.compute(&pose.view(), skeleton, toe);
    let (heel_position, _) = cache.compute(&pose.view(), skeleton, heel);
    let (knee_position, knee_rotation) = cache.compute(&pose.view(), skeleton, knee);
    let (hip_position, hip_rotation) = cache.compute(&pose.view(), skeleton, hip);
    let (_, root_rotation) = cache.compute(&pose.view(), skeleton, root);

    // 两骨 IK 放置脚跟
    let mut hip_local = pose.rotations[hip];
    let mut knee_local = pose.rotations[knee];
    ik_two_bone(
        &mut hip_local,
        &mut knee_local,
        hip_position,
        knee_position,
        heel_position,
        contact_position + (heel_position - toe_position),
        knee_rotation * settings.knee_forward_axis,
        hip_rotation,
        knee_rotation,
        root_rotation,
        settings.max_length_buffer,
    );
    pose.rotations[hip] = hip_local;
    pose.rotations[knee] = knee_local;

    // 脚跟朝向接触点
    cache.invalidate();
    let (toe_position, _) = cache.compute(&pose.view(), skeleton, toe);
    let (heel_position, heel_rotation) = cache.compute(&pose.view(), skeleton, heel);
    let (_, knee_rotation) = cache.compute(&pose.view(), skeleton, knee);
    let mut heel_local = pose.rotations[heel];
    ik_look_at(
        &mut heel_local,
        knee_rotation,
        heel_rotation,
        heel_position,
        toe_position,
        contact_position,
    );
    pose.rotations[heel] = heel_local;

    // 脚尖末端不低于地面
    cache.invalidate();
    let (toe_position, toe_rotation) = cache.compute(&pose.view(), skeleton, toe);
    let (_, heel_rotation) = cache.compute(&pose.view(), skeleton, heel);
    let toe_end_current = toe_rotation * (settings.toe_axis * settings.toe_length) + toe_position;
    let mut toe_end_target = toe_end_current;
    toe_end_target.y = toe_end_target.y.max(settings.foot_height);
    let mut toe_local = pose.rotations[toe];
    ik_look_at(
        &mut toe_local,
        heel_rotation,
        toe_rotation,
        toe_position,
        toe_end_current,
        toe_end_target,
    );
    pose.rotations[toe] = toe_local;
    cache.invalidate();
}
