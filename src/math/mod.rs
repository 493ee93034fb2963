//! 数学工具 - 四元数辅助函数与临界阻尼弹簧
//!
//! 所有函数都带有 epsilon 保护，退化输入返回单位值而不是 NaN。

mod spring;

pub use spring::{
    SpringValue, halflife_to_decay,
    simple_spring_damper_exact, simple_spring_damper_exact_quat,
    decay_spring_damper_exact, decay_spring_damper_exact_quat,
    spring_character_update,
    inertialize_transition,
    inertialize_update, inertialize_update_quat,
};

use glam::{Mat3, Quat, Vec3};

/// 归一化 epsilon
pub const EPSILON: f32 = 1e-8;

// ============================================================================
// 四元数
// ============================================================================

/// 取最短路径表示（w >= 0）
#[inline]
pub fn quat_abs(q: Quat) -> Quat {
    if q.w < 0.0 { -q } else { q }
}

/// 四元数对数（半角轴）
#[inline]
pub fn quat_log(q: Quat) -> Vec3 {
    let v = Vec3::new(q.x, q.y, q.z);
    let length = v.length();
    if length < EPSILON {
        v
    } else {
        let half_angle = q.w.clamp(-1.0, 1.0).acos();
        v * (half_angle / length)
    }
}

/// 四元数指数（半角轴）
#[inline]
pub fn quat_exp(v: Vec3) -> Quat {
    let half_angle = v.length();
    if half_angle < EPSILON {
        Quat::from_xyzw(v.x, v.y, v.z, 1.0).normalize()
    } else {
        let c = half_angle.cos();
        let s = half_angle.sin() / half_angle;
        Quat::from_xyzw(s * v.x, s * v.y, s * v.z, c)
    }
}

/// 四元数转缩放角轴（方向 = 轴，长度 = 角度）
#[inline]
pub fn quat_to_scaled_angle_axis(q: Quat) -> Vec3 {
    2.0 * quat_log(q)
}

/// 缩放角轴转四元数
#[inline]
pub fn quat_from_scaled_angle_axis(v: Vec3) -> Quat {
    quat_exp(v * 0.5)
}

/// 由两个轴向量构造旋转（第一列 = x，第三列 = x × y）
///
/// 用于解码网络输出的双轴旋转表示。退化时返回单位四元数。
pub fn quat_from_xform_xy(x: Vec3, y: Vec3) -> Quat {
    let c0 = x.normalize_or_zero();
    let c2 = c0.cross(y).normalize_or_zero();
    let c1 = c2.cross(c0).normalize_or_zero();
    if c0 == Vec3::ZERO || c2 == Vec3::ZERO || c1 == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_mat3(&Mat3::from_cols(c0, c1, c2)).normalize()
}

/// 两向量间的最短旋转，退化时返回单位四元数
pub fn quat_between(from: Vec3, to: Vec3) -> Quat {
    let a = from.normalize_or_zero();
    let b = to.normalize_or_zero();
    if a == Vec3::ZERO || b == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(a, b)
}

/// 绕 Y 轴的方向角（从 +Z 开始）
#[inline]
pub fn yaw_rotation(angle: f32) -> Quat {
    Quat::from_axis_angle(Vec3::Y, angle)
}

// ============================================================================
// 根骨骼校正阻尼
// ============================================================================

/// 按半衰期取出本帧应当施加的调整量
#[inline]
pub fn damp_adjustment_exact(g: Vec3, halflife: f32, dt: f32) -> Vec3 {
    g * damp_factor(halflife, dt)
}

/// 旋转版本，沿最短路径取一部分
#[inline]
pub fn damp_adjustment_exact_quat(g: Quat, halflife: f32, dt: f32) -> Quat {
    quat_from_scaled_angle_axis(damp_factor(halflife, dt) * quat_to_scaled_angle_axis(quat_abs(g)))
}

#[inline]
fn damp_factor(halflife: f32, dt: f32) -> f32 {
    1.0 - (-std::f32::consts::LN_2 * dt / (halflife + 1e-8)).exp()
}
