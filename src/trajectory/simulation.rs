//! 角色模拟：期望速度 / 期望朝向 / 弹簧积分

use glam::{Quat, Vec3};

use crate::math::{simple_spring_damper_exact, simple_spring_damper_exact_quat, spring_character_update, yaw_rotation};

use super::obstacle::{collide_obstacles, Obstacle};

/// 三个方向的移动速度
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveSpeeds {
    pub forward: f32,
    pub side: f32,
    pub back: f32,
}

impl MoveSpeeds {
    /// 线性插值（t = 0 为 self，t = 1 为 other）
    pub fn lerp(&self, other: &MoveSpeeds, t: f32) -> MoveSpeeds {
        MoveSpeeds {
            forward: self.forward + (other.forward - self.forward) * t,
            side: self.side + (other.side - self.side) * t,
            back: self.back + (other.back - self.back) * t,
        }
    }
}

/// 摇杆输入（核心坐标系，xz 平面，相对相机）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StickInput {
    /// 移动摇杆（xz 平面）
    pub movement: Vec3,
    /// 视角摇杆（xz 平面）
    pub look: Vec3,
    /// 是否侧移（面向相机方向）
    pub strafe: bool,
}

/// 期望速度
///
/// 摇杆方向先按相机方位角旋转到世界空间，再转到角色局部空间，
/// 按前进 / 后退 / 侧向速度缩放后转回世界空间。
pub fn desired_velocity_update(
    movement: Vec3,
    camera_azimuth: f32,
    simulation_rotation: Quat,
    speeds: &MoveSpeeds,
) -> Vec3 {
    let global_direction = yaw_rotation(camera_azimuth) * movement;
    let local_direction = simulation_rotation.inverse() * global_direction;
    let local_velocity = if local_direction.z > 0.0 {
        Vec3::new(speeds.side, 0.0, speeds.forward) * local_direction
    } else {
        Vec3::new(speeds.side, 0.0, speeds.back) * local_direction
    };
    simulation_rotation * local_velocity
}

/// 期望朝向
///
/// - 侧移：面向相机前方，视角摇杆有输入时面向视角摇杆方向
/// - 否则移动摇杆有输入时面向期望速度方向
/// - 都没有时保持不变
pub fn desired_rotation_update(
    current: Quat,
    sticks: &StickInput,
    camera_azimuth: f32,
    desired_velocity: Vec3,
    stick_threshold: f32,
) -> Quat {
    let direction = if sticks.strafe {
        let local = if sticks.look.length() > stick_threshold {
            sticks.look.normalize()
        } else {
            Vec3::new(0.0, 0.0, -1.0)
        };
        yaw_rotation(camera_azimuth) * local
    } else if sticks.movement.length() > stick_threshold && desired_velocity.length_squared() > 1e-8 {
        desired_velocity.normalize()
    } else {
        return current;
    };
    yaw_rotation(direction.x.atan2(direction.z))
}

/// 相机方位角（侧移时忽略视角摇杆）
pub fn orbit_camera_update_azimuth(azimuth: f32, sticks: &StickInput, turn_speed: f32, dt: f32) -> f32 {
    let look_x = if sticks.strafe { 0.0 } else { sticks.look.x };
    azimuth + turn_speed * dt * -look_x
}

/// 步态弹簧（0 = 跑，1 = 走）
pub fn desired_gait_update(gait: &mut f32, gait_velocity: &mut f32, walk: bool, halflife: f32, dt: f32) {
    simple_spring_damper_exact(gait, gait_velocity, if walk { 1.0 } else { 0.0 }, halflife, dt);
}

/// 模拟位置：弹簧积分后做障碍物推出
#[allow(clippy::too_many_arguments)]
pub fn simulation_positions_update(
    position: &mut Vec3,
    velocity: &mut Vec3,
    acceleration: &mut Vec3,
    desired_velocity: Vec3,
    halflife: f32,
    dt: f32,
    obstacles: &[Obstacle],
    obstacle_radius: f32,
    obstacle_max_segment: f32,
) {
    let previous = *position;
    spring_character_update(position, velocity, acceleration, desired_velocity, halflife, dt);
    *position = collide_obstacles(previous, *position, obstacles, obstacle_radius, obstacle_max_segment);
}

/// 模拟朝向
#[inline]
pub fn simulation_rotations_update(
    rotation: &mut Quat,
    angular_velocity: &mut Vec3,
    desired_rotation: Quat,
    halflife: f32,
    dt: f32,
) {
    simple_spring_damper_exact_quat(rotation, angular_velocity, desired_rotation, halflife, dt);
}
