//! 轨迹模拟
//!
//! 把瞬时的期望速度 / 期望朝向转化为平滑的未来路径：
//! - simulation: 期望值计算与弹簧积分
//! - obstacle: 障碍物推出
//! - Trajectory: 4 个采样点（当前 + 未来 3 个）的预测
//! - SearchTimer: 何时触发搜索

mod simulation;
mod obstacle;
mod search_timer;

pub use simulation::{
    desired_gait_update, desired_rotation_update, desired_velocity_update, orbit_camera_update_azimuth,
    simulation_positions_update, simulation_rotations_update, MoveSpeeds, StickInput,
};
pub use obstacle::{collide_obstacles, Obstacle};
pub use search_timer::SearchTimer;

use glam::{Quat, Vec3};

use crate::config::MotionConfig;

/// 轨迹采样点数（含当前）
pub const TRAJECTORY_SAMPLES: usize = 4;

/// 模拟角色状态（弹簧积分的根运动）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

impl SimulationState {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            rotation,
            angular_velocity: Vec3::ZERO,
        }
    }

    /// 推进一帧
    pub fn update(
        &mut self,
        desired_velocity: Vec3,
        desired_rotation: Quat,
        config: &MotionConfig,
        obstacles: &[Obstacle],
        dt: f32,
    ) {
        simulation_positions_update(
            &mut self.position,
            &mut self.velocity,
            &mut self.acceleration,
            desired_velocity,
            config.simulation_velocity_halflife,
            dt,
            obstacles,
            config.obstacle_radius,
            config.obstacle_max_segment,
        );
        simulation_rotations_update(
            &mut self.rotation,
            &mut self.angular_velocity,
            desired_rotation,
            config.simulation_rotation_halflife,
            dt,
        );
    }
}

/// 预测所需的当前输入
#[derive(Clone, Copy, Debug)]
pub struct PredictionInput<'a> {
    pub simulation: &'a SimulationState,
    pub desired_velocity: Vec3,
    pub desired_rotation: Quat,
    pub camera_azimuth: f32,
    pub sticks: &'a StickInput,
    pub speeds: &'a MoveSpeeds,
    pub obstacles: &'a [Obstacle],
}

/// 预测轨迹
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub desired_velocities: [Vec3; TRAJECTORY_SAMPLES],
    pub desired_rotations: [Quat; TRAJECTORY_SAMPLES],
    pub positions: [Vec3; TRAJECTORY_SAMPLES],
    pub velocities: [Vec3; TRAJECTORY_SAMPLES],
    pub accelerations: [Vec3; TRAJECTORY_SAMPLES],
    pub rotations: [Quat; TRAJECTORY_SAMPLES],
    pub angular_velocities: [Vec3; TRAJECTORY_SAMPLES],
}

impl Default for Trajectory {
    fn default() -> Self {
        Self {
            desired_velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            desired_rotations: [Quat::IDENTITY; TRAJECTORY_SAMPLES],
            positions: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            accelerations: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            rotations: [Quat::IDENTITY; TRAJECTORY_SAMPLES],
            angular_velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
        }
    }
}

impl Trajectory {
    /// 以当前模拟状态初始化所有采样点
    pub fn reset(&mut self, simulation: &SimulationState) {
        self.desired_velocities.fill(Vec3::ZERO);
        self.desired_rotations.fill(simulation.rotation);
        self.positions.fill(simulation.position);
        self.velocities.fill(simulation.velocity);
        self.accelerations.fill(simulation.acceleration);
        self.rotations.fill(simulation.rotation);
        self.angular_velocities.fill(simulation.angular_velocity);
    }

    /// 预测未来采样点
    ///
    /// 顺序：期望朝向（使用上一帧的期望速度）→ 朝向 → 期望速度 → 位置。
    /// 朝向按 i·Δ 直接从当前状态解析求解；位置逐个采样积分并做障碍物推出。
    pub fn predict(&mut self, input: &PredictionInput<'_>, config: &MotionConfig) {
        let sample_time = config.trajectory_sample_time();

        // 期望朝向
        self.desired_rotations[0] = input.desired_rotation;
        for i in 1..TRAJECTORY_SAMPLES {
            let azimuth = orbit_camera_update_azimuth(
                input.camera_azimuth,
                input.sticks,
                config.camera_turn_speed,
                i as f32 * sample_time,
            );
            self.desired_rotations[i] = desired_rotation_update(
                self.desired_rotations[i - 1],
                input.sticks,
                azimuth,
                self.desired_velocities[i],
                config.stick_threshold,
            );
        }

        // 朝向
        self.rotations[0] = input.simulation.rotation;
        self.angular_velocities[0] = input.simulation.angular_velocity;
        for i in 1..TRAJECTORY_SAMPLES {
            self.rotations[i] = input.simulation.rotation;
            self.angular_velocities[i] = input.simulation.angular_velocity;
            simulation_rotations_update(
                &mut self.rotations[i],
                &mut self.angular_velocities[i],
                self.desired_rotations[i],
                config.simulation_rotation_halflife,
                i as f32 * sample_time,
            );
        }

        // 期望速度
        self.desired_velocities[0] = input.desired_velocity;
        for i in 1..TRAJECTORY_SAMPLES {
            let azimuth = orbit_camera_update_azimuth(
                input.camera_azimuth,
                input.sticks,
                config.camera_turn_speed,
                i as f32 * sample_time,
            );
            self.desired_velocities[i] =
                desired_velocity_update(input.sticks.movement, azimuth, self.rotations[i], input.speeds);
        }

        // 位置
        self.positions[0] = input.simulation.position;
        self.velocities[0] = input.simulation.velocity;
        self.accelerations[0] = input.simulation.acceleration;
        for i in 1..TRAJECTORY_SAMPLES {
            self.positions[i] = self.positions[i - 1];
            self.velocities[i] = self.velocities[i - 1];
            self.accelerations[i] = self.accelerations[i - 1];
            simulation_positions_update(
                &mut self.positions[i],
                &mut self.velocities[i],
                &mut self.accelerations[i],
                self.desired_velocities[i],
                config.simulation_velocity_halflife,
                sample_time,
                input.obstacles,
                config.obstacle_radius,
                config.obstacle_max_segment,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: MoveSpeeds = MoveSpeeds { forward: 4.0, side: 3.0, back: 2.5 };

    fn predict_twice(sticks: &StickInput, obstacles: &[Obstacle]) -> Trajectory {
        let config = MotionConfig::default();
        let simulation = SimulationState::new(Vec3::ZERO, Quat::IDENTITY);
        let desired_velocity = desired_velocity_update(sticks.movement, 0.0, simulation.rotation, &RUN);
        let desired_rotation = desired_rotation_update(
            simulation.rotation, sticks, 0.0, desired_velocity, config.stick_threshold,
        );

        let mut trajectory = Trajectory::default();
        trajectory.reset(&simulation);
        let input = PredictionInput {
            simulation: &simulation,
            desired_velocity,
            desired_rotation,
            camera_azimuth: 0.0,
            sticks,
            speeds: &RUN,
            obstacles,
        };
        // 期望朝向依赖上一帧的期望速度
        trajectory.predict(&input, &config);
        trajectory.predict(&input, &config);
        trajectory
    }

    #[test]
    fn test_idle_trajectory_stays_put() {
        let trajectory = predict_twice(&StickInput::default(), &[]);
        for i in 0..TRAJECTORY_SAMPLES {
            assert!(trajectory.positions[i].length() < 1e-5);
        }
    }

    #[test]
    fn test_forward_trajectory_advances() {
        let sticks = StickInput { movement: Vec3::Z, ..Default::default() };
        let trajectory = predict_twice(&sticks, &[]);
        for i in 1..TRAJECTORY_SAMPLES {
            assert!(trajectory.positions[i].z > trajectory.positions[i - 1].z);
            assert!(trajectory.positions[i].x.abs() < 1e-4);
        }
        assert!(trajectory.desired_velocities[3].z > 3.9);
    }

    #[test]
    fn test_trajectory_respects_obstacles() {
        let sticks = StickInput { movement: Vec3::Z, ..Default::default() };
        let wall = Obstacle::new(Vec3::new(0.0, 0.0, 2.0), Vec3::new(5.0, 1.0, 0.25));
        let trajectory = predict_twice(&sticks, &[wall]);
        for position in trajectory.positions {
            assert!(position.z <= 1.75 - 0.6 + 1e-3);
        }
    }

    #[test]
    fn test_simulation_state_update() {
        let config = MotionConfig::default();
        let mut state = SimulationState::new(Vec3::ZERO, Quat::IDENTITY);
        let goal = Quat::from_rotation_y(1.0);
        for _ in 0..600 {
            state.update(Vec3::new(1.0, 0.0, 0.0), goal, &config, &[], 1.0 / 60.0);
        }
        assert!((state.velocity - Vec3::X).length() < 1e-3);
        assert!(state.rotation.dot(goal).abs() > 0.9999);
    }
}
