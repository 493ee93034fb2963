//! 根骨骼校正
//!
//! 动画中的根与模拟出的根会逐渐分离，三种方式择一处理：
//! - 同步：模拟跟随动画
//! - 钳制：偏差超出阈值时把动画根拉回到阈值边界
//! - 调整：每帧按半衰期把动画根拉向模拟根

use glam::{Quat, Vec3};

use crate::config::MotionConfig;
use crate::math::{
    damp_adjustment_exact, damp_adjustment_exact_quat, quat_abs, quat_from_scaled_angle_axis,
    quat_to_scaled_angle_axis,
};

use super::ControllerFlags;

/// 本帧使用的校正方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RootCorrection {
    None,
    Synchronization,
    Clamping,
    Adjustment,
}

impl RootCorrection {
    /// 选择校正方式（互斥）
    ///
    /// 同步优先；其次在偏差超出钳制阈值时钳制；否则调整。
    pub fn choose(
        flags: ControllerFlags,
        character_position: Vec3,
        character_rotation: Quat,
        simulation_position: Vec3,
        simulation_rotation: Quat,
        config: &MotionConfig,
    ) -> Self {
        if flags.contains(ControllerFlags::SYNCHRONIZATION) {
            return RootCorrection::Synchronization;
        }
        if flags.contains(ControllerFlags::CLAMPING) {
            let distance = (character_position - simulation_position).length();
            let angle = rotation_angle(character_rotation * simulation_rotation.inverse());
            if distance > config.clamping_max_distance || angle > config.clamping_max_angle {
                return RootCorrection::Clamping;
            }
        }
        if flags.contains(ControllerFlags::ADJUSTMENT) {
            return RootCorrection::Adjustment;
        }
        RootCorrection::None
    }
}

#[inline]
fn rotation_angle(q: Quat) -> f32 {
    quat_to_scaled_angle_axis(quat_abs(q)).length()
}

// ============================================================================
// 调整
// ============================================================================

pub fn adjust_character_position(character: Vec3, simulation: Vec3, halflife: f32, dt: f32) -> Vec3 {
    character + damp_adjustment_exact(simulation - character, halflife, dt)
}

pub fn adjust_character_rotation(character: Quat, simulation: Quat, halflife: f32, dt: f32) -> Quat {
    let difference = quat_abs(simulation * character.inverse());
    (damp_adjustment_exact_quat(difference, halflife, dt) * character).normalize()
}

/// 调整量不超过 当前速度 × 比例 × dt
pub fn adjust_character_position_by_velocity(
    character: Vec3,
    velocity: Vec3,
    simulation: Vec3,
    max_ratio: f32,
    halflife: f32,
    dt: f32,
) -> Vec3 {
    let adjustment = damp_adjustment_exact(simulation - character, halflife, dt);
    let max_length = max_ratio * velocity.length() * dt;
    character + adjustment.clamp_length_max(max_length)
}

/// 调整角度不超过 当前角速度 × 比例 × dt
pub fn adjust_character_rotation_by_velocity(
    character: Quat,
    angular_velocity: Vec3,
    simulation: Quat,
    max_ratio: f32,
    halflife: f32,
    dt: f32,
) -> Quat {
    let difference = quat_abs(simulation * character.inverse());
    let adjustment = quat_to_scaled_angle_axis(damp_adjustment_exact_quat(difference, halflife, dt));
    let max_length = max_ratio * angular_velocity.length() * dt;
    (quat_from_scaled_angle_axis(adjustment.clamp_length_max(max_length)) * character).normalize()
}

// ============================================================================
// 钳制
// ============================================================================

pub fn clamp_character_position(character: Vec3, simulation: Vec3, max_distance: f32) -> Vec3 {
    simulation + (character - simulation).clamp_length_max(max_distance)
}

pub fn clamp_character_rotation(character: Quat, simulation: Quat, max_angle: f32) -> Quat {
    let difference = quat_to_scaled_angle_axis(quat_abs(character * simulation.inverse()));
    if difference.length() > max_angle {
        (quat_from_scaled_angle_axis(difference.clamp_length_max(max_angle)) * simulation).normalize()
    } else {
        character
    }
}

// ============================================================================
// 同步
// ============================================================================

/// 模拟根向动画根插值（factor = 1 时完全跟随动画）
pub fn synchronize_root(
    simulation_position: Vec3,
    simulation_rotation: Quat,
    character_position: Vec3,
    character_rotation: Quat,
    factor: f32,
) -> (Vec3, Quat) {
    let position = simulation_position.lerp(character_position, factor);
    let target = if simulation_rotation.dot(character_rotation) < 0.0 {
        -character_rotation
    } else {
        character_rotation
    };
    let rotation = simulation_rotation.lerp(target, factor).normalize();
    (position, rotation)
}
