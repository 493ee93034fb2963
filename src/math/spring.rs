//! 临界阻尼弹簧（精确解）
//!
//! 所有弹簧都使用闭式解，结果与步长划分无关：
//! 走 10 步 dt 与走 1 步 10·dt 得到相同状态（浮点误差内）。

use std::ops::{Add, Mul, Neg, Sub};

use glam::{Quat, Vec3};

use super::{quat_abs, quat_from_scaled_angle_axis, quat_to_scaled_angle_axis};

/// e^{-x}(1 + x) = 0.5 的解
const HALFLIFE_DECAY_SOLUTION: f32 = 1.678_347;

/// 可用于弹簧的值类型
pub trait SpringValue:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> + Neg<Output = Self>
{
    const ZERO: Self;
}

impl SpringValue for f32 {
    const ZERO: Self = 0.0;
}

impl SpringValue for Vec3 {
    const ZERO: Self = Vec3::ZERO;
}

/// 半衰期转衰减常数
///
/// 从静止释放的偏移量在一个半衰期后恰好衰减到一半。
/// 半衰期为 0 时得到极大的衰减常数，即瞬间到达目标。
#[inline]
pub fn halflife_to_decay(halflife: f32) -> f32 {
    HALFLIFE_DECAY_SOLUTION / (halflife.max(0.0) + 1e-5)
}

// ============================================================================
// 基础弹簧
// ============================================================================

/// 朝目标值收敛的临界阻尼弹簧
#[inline]
pub fn simple_spring_damper_exact<T: SpringValue>(
    x: &mut T,
    v: &mut T,
    x_goal: T,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_decay(halflife);
    let j0 = *x - x_goal;
    let j1 = *v + j0 * y;
    let eydt = (-y * dt).exp();

    *x = (j0 + j1 * dt) * eydt + x_goal;
    *v = (*v - j1 * (y * dt)) * eydt;
}

/// 朝零衰减的临界阻尼弹簧
#[inline]
pub fn decay_spring_damper_exact<T: SpringValue>(x: &mut T, v: &mut T, halflife: f32, dt: f32) {
    simple_spring_damper_exact(x, v, T::ZERO, halflife, dt);
}

/// 旋转版本：x 为旋转，v 为角速度（缩放角轴）
#[inline]
pub fn simple_spring_damper_exact_quat(
    x: &mut Quat,
    v: &mut Vec3,
    x_goal: Quat,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_decay(halflife);
    let j0 = quat_to_scaled_angle_axis(quat_abs(*x * x_goal.inverse()));
    let j1 = *v + j0 * y;
    let eydt = (-y * dt).exp();

    *x = (quat_from_scaled_angle_axis((j0 + j1 * dt) * eydt) * x_goal).normalize();
    *v = (*v - j1 * (y * dt)) * eydt;
}

/// 旋转朝单位四元数衰减
#[inline]
pub fn decay_spring_damper_exact_quat(x: &mut Quat, v: &mut Vec3, halflife: f32, dt: f32) {
    simple_spring_damper_exact_quat(x, v, Quat::IDENTITY, halflife, dt);
}

/// 角色位置弹簧：速度朝目标速度收敛，同时积分位置
///
/// x/v/a 为位置、速度、加速度。
#[inline]
pub fn spring_character_update(
    x: &mut Vec3,
    v: &mut Vec3,
    a: &mut Vec3,
    v_goal: Vec3,
    halflife: f32,
    dt: f32,
) {
    let y = halflife_to_decay(halflife);
    let j0 = *v - v_goal;
    let j1 = *a + j0 * y;
    let eydt = (-y * dt).exp();

    *x = eydt * ((-j1) / (y * y) + (-j0 - j1 * dt) / y)
        + j1 / (y * y)
        + j0 / y
        + v_goal * dt
        + *x;
    *v = eydt * (j0 + j1 * dt) + v_goal;
    *a = eydt * (*a - j1 * y * dt);
}

// ============================================================================
// 惯性化
// ============================================================================

/// 记录过渡偏移：偏移 = (源 + 旧偏移) - 目标
#[inline]
pub fn inertialize_transition<T: SpringValue>(
    off_x: &mut T,
    off_v: &mut T,
    src_x: T,
    src_v: T,
    dst_x: T,
    dst_v: T,
) {
    *off_x = (src_x + *off_x) - dst_x;
    *off_v = (src_v + *off_v) - dst_v;
}

/// 衰减偏移并叠加到输入上
#[inline]
pub fn inertialize_update<T: SpringValue>(
    out_x: &mut T,
    out_v: &mut T,
    off_x: &mut T,
    off_v: &mut T,
    in_x: T,
    in_v: T,
    halflife: f32,
    dt: f32,
) {
    decay_spring_damper_exact(off_x, off_v, halflife, dt);
    *out_x = in_x + *off_x;
    *out_v = in_v + *off_v;
}

/// 旋转版本：输出 = 偏移 * 输入
#[inline]
pub fn inertialize_update_quat(
    out_x: &mut Quat,
    out_v: &mut Vec3,
    off_x: &mut Quat,
    off_v: &mut Vec3,
    in_x: Quat,
    in_v: Vec3,
    halflife: f32,
    dt: f32,
) {
    decay_spring_damper_exact_quat(off_x, off_v, halflife, dt);
    *out_x = (*off_x * in_x).normalize();
    *out_v = *off_v + *off_x * in_v;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_after_halflife() {
        let mut x = 1.0_f32;
        let mut v = 0.0_f32;
        decay_spring_damper_exact(&mut x, &mut v, 0.2, 0.2);
        assert!((x - 0.5).abs() < 1e-3, "x = {}", x);
    }

    #[test]
    fn test_sampling_invariance() {
        let mut x1 = Vec3::new(1.0, -2.0, 0.5);
        let mut v1 = Vec3::new(0.3, 0.0, -1.0);
        let mut x2 = x1;
        let mut v2 = v1;
        let goal = Vec3::new(0.0, 1.0, 0.0);

        for _ in 0..10 {
            simple_spring_damper_exact(&mut x1, &mut v1, goal, 0.15, 1.0 / 60.0);
        }
        simple_spring_damper_exact(&mut x2, &mut v2, goal, 0.15, 10.0 / 60.0);

        assert!((x1 - x2).length() < 1e-4);
        assert!((v1 - v2).length() < 1e-3);
    }

    #[test]
    fn test_zero_halflife_is_instant() {
        let mut x = 3.0_f32;
        let mut v = 1.0_f32;
        decay_spring_damper_exact(&mut x, &mut v, 0.0, 1.0 / 60.0);
        assert!(x.abs() < 1e-4);
        assert!(v.abs() < 1e-2);
    }

    #[test]
    fn test_zero_dt_is_identity() {
        let mut x = Vec3::new(1.0, 2.0, 3.0);
        let mut v = Vec3::new(-1.0, 0.0, 1.0);
        decay_spring_damper_exact(&mut x, &mut v, 0.1, 0.0);
        assert!((x - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert!((v - Vec3::new(-1.0, 0.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_quat_spring_converges() {
        let goal = Quat::from_rotation_y(1.0);
        let mut x = Quat::IDENTITY;
        let mut v = Vec3::ZERO;
        simple_spring_damper_exact_quat(&mut x, &mut v, goal, 0.1, 2.0);
        assert!(x.dot(goal).abs() > 0.9999);
    }

    #[test]
    fn test_character_spring_reaches_goal_velocity() {
        let mut x = Vec3::ZERO;
        let mut v = Vec3::ZERO;
        let mut a = Vec3::ZERO;
        let goal = Vec3::new(0.0, 0.0, 4.0);
        spring_character_update(&mut x, &mut v, &mut a, goal, 0.27, 5.0);
        assert!((v - goal).length() < 1e-3);
        // 位置应接近 goal * (t - 延迟)
        assert!(x.z > 0.0 && x.z < 20.0);
    }

    #[test]
    fn test_inertialize_transition_then_update_zero_dt() {
        let mut off_x = 0.0_f32;
        let mut off_v = 0.0_f32;
        inertialize_transition(&mut off_x, &mut off_v, 2.0, 1.0, 5.0, -1.0);
        let mut out_x = 0.0;
        let mut out_v = 0.0;
        inertialize_update(&mut out_x, &mut out_v, &mut off_x, &mut off_v, 5.0, -1.0, 0.1, 0.0);
        assert!((out_x - 2.0).abs() < 1e-6);
        assert!((out_v - 1.0).abs() < 1e-6);
    }
}
