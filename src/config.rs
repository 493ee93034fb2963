//! 运动匹配配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。
//! 控制器在创建时拷贝一份配置，之后互不影响。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 运动匹配配置（扁平化，不嵌套）
#[derive(Debug, Clone, PartialEq)]
pub struct MotionConfig {
    // ========== 时间 ==========
    /// 数据库帧时长（秒），默认 1/60
    pub frame_time: f32,
    /// 轨迹采样间隔（帧），默认 20
    pub trajectory_sample_frames: usize,

    // ========== 特征权重 ==========
    /// 脚部位置权重，默认 0.75
    pub weight_foot_position: f32,
    /// 脚部速度权重，默认 1.0
    pub weight_foot_velocity: f32,
    /// 髋部速度权重，默认 1.0
    pub weight_hip_velocity: f32,
    /// 轨迹位置权重，默认 1.0
    pub weight_trajectory_positions: f32,
    /// 轨迹方向权重，默认 1.5
    pub weight_trajectory_directions: f32,

    // ========== 搜索 ==========
    /// 周期搜索间隔（秒），默认 0.1
    pub search_time: f32,
    /// 跳过每个片段末尾的帧数，默认 20
    pub ignore_range_end: usize,
    /// 跳过当前帧附近的帧数，默认 20
    pub ignore_surrounding: usize,
    /// 过渡代价（学习模式下投影结果需额外优于此值）
    pub transition_cost: f32,
    /// 期望速度变化阈值，默认 50.0
    pub desired_velocity_change_threshold: f32,
    /// 期望旋转变化阈值，默认 50.0
    pub desired_rotation_change_threshold: f32,
    /// 强制搜索冷却时间（秒），默认 0.1
    pub force_search_cooldown: f32,

    // ========== 惯性化 ==========
    /// 惯性化衰减半衰期（秒），默认 0.1
    pub inertialize_blending_halflife: f32,

    // ========== 模拟 ==========
    /// 模拟速度半衰期（秒），默认 0.27
    pub simulation_velocity_halflife: f32,
    /// 模拟旋转半衰期（秒），默认 0.27
    pub simulation_rotation_halflife: f32,
    /// 跑步前进速度
    pub simulation_run_fwrd_speed: f32,
    /// 跑步侧向速度
    pub simulation_run_side_speed: f32,
    /// 跑步后退速度
    pub simulation_run_back_speed: f32,
    /// 行走前进速度
    pub simulation_walk_fwrd_speed: f32,
    /// 行走侧向速度
    pub simulation_walk_side_speed: f32,
    /// 行走后退速度
    pub simulation_walk_back_speed: f32,
    /// 步态切换半衰期（秒）
    pub desired_gait_halflife: f32,
    /// 相机转速（弧度/秒）
    pub camera_turn_speed: f32,
    /// 摇杆激活阈值（长度）
    pub stick_threshold: f32,

    // ========== 根骨骼校正 ==========
    /// 同步系数（1.0 = 模拟完全跟随动画）
    pub synchronization_data_factor: f32,
    /// 位置调整半衰期（秒）
    pub adjustment_position_halflife: f32,
    /// 旋转调整半衰期（秒）
    pub adjustment_rotation_halflife: f32,
    /// 按速度调整时，位置调整量与当前速度之比上限
    pub adjustment_position_max_ratio: f32,
    /// 按速度调整时，旋转调整量与当前角速度之比上限
    pub adjustment_rotation_max_ratio: f32,
    /// 钳制最大距离（米）
    pub clamping_max_distance: f32,
    /// 钳制最大角度（弧度）
    pub clamping_max_angle: f32,

    // ========== 脚部 IK ==========
    /// 两骨 IK 最大长度缓冲（米）
    pub ik_max_length_buffer: f32,
    /// 脚部离地最小高度（米）
    pub ik_foot_height: f32,
    /// 脚尖长度（米）
    pub ik_toe_length: f32,
    /// 解锁半径（米）
    pub ik_unlock_radius: f32,
    /// 接触混合半衰期（秒）
    pub ik_blending_halflife: f32,

    // ========== 障碍物 ==========
    /// 推出半径（米）
    pub obstacle_radius: f32,
    /// 碰撞检测最大步长（米）
    pub obstacle_max_segment: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            // ====== 时间 ======
            // 数据库按 60 FPS 采样
            frame_time: 1.0 / 60.0,
            trajectory_sample_frames: 20,

            // ====== 特征权重 ======
            weight_foot_position: 0.75,
            weight_foot_velocity: 1.0,
            weight_hip_velocity: 1.0,
            weight_trajectory_positions: 1.0,
            weight_trajectory_directions: 1.5,

            // ====== 搜索 ======
            search_time: 0.1,
            ignore_range_end: 20,
            ignore_surrounding: 20,
            transition_cost: 0.0,
            desired_velocity_change_threshold: 50.0,
            desired_rotation_change_threshold: 50.0,
            force_search_cooldown: 0.1,

            // ====== 惯性化 ======
            inertialize_blending_halflife: 0.1,

            // ====== 模拟 ======
            simulation_velocity_halflife: 0.27,
            simulation_rotation_halflife: 0.27,
            simulation_run_fwrd_speed: 4.0,
            simulation_run_side_speed: 3.0,
            simulation_run_back_speed: 2.5,
            simulation_walk_fwrd_speed: 1.75,
            simulation_walk_side_speed: 1.5,
            simulation_walk_back_speed: 1.25,
            desired_gait_halflife: 0.1,
            camera_turn_speed: 2.0,
            stick_threshold: 0.01,

            // ====== 根骨骼校正 ======
            synchronization_data_factor: 1.0,
            adjustment_position_halflife: 0.1,
            adjustment_rotation_halflife: 0.2,
            adjustment_position_max_ratio: 0.5,
            adjustment_rotation_max_ratio: 0.5,
            clamping_max_distance: 0.15,
            clamping_max_angle: 0.5 * std::f32::consts::PI,

            // ====== 脚部 IK ======
            ik_max_length_buffer: 0.015,
            ik_foot_height: 0.02,
            ik_toe_length: 0.15,
            ik_unlock_radius: 0.2,
            ik_blending_halflife: 0.1,

            // ====== 障碍物 ======
            obstacle_radius: 0.6,
            obstacle_max_segment: 0.2,
        }
    }
}

impl MotionConfig {
    /// 特征权重，顺序与特征块一致
    pub fn feature_weights(&self) -> [f32; 5] {
        [
            self.weight_foot_position,
            self.weight_foot_velocity,
            self.weight_hip_velocity,
            self.weight_trajectory_positions,
            self.weight_trajectory_directions,
        ]
    }

    /// 轨迹采样间隔（秒）
    pub fn trajectory_sample_time(&self) -> f32 {
        self.trajectory_sample_frames as f32 * self.frame_time
    }
}

/// 全局配置实例
static MOTION_CONFIG: Lazy<RwLock<MotionConfig>> = Lazy::new(|| {
    RwLock::new(MotionConfig::default())
});

/// 获取当前配置（只读）
pub fn get_config() -> MotionConfig {
    MOTION_CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: MotionConfig) {
    *MOTION_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *MOTION_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = MotionConfig::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_time() {
        let config = MotionConfig::default();
        assert!((config.trajectory_sample_time() - 20.0 / 60.0).abs() < 1e-6);
        assert_eq!(config.feature_weights(), [0.75, 1.0, 1.0, 1.0, 1.5]);
    }
}
