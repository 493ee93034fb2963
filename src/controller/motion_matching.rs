//! 运动匹配控制器
//!
//! 每帧流程：
//! 1. 步态、期望速度、期望朝向
//! 2. 强制搜索检测
//! 3. 轨迹预测
//! 4. 组装查询
//! 5. 搜索 / 投影，命中时惯性化切换
//! 6. 推进动作源一帧
//! 7. 惯性化更新
//! 8. 模拟更新 + 根骨骼校正（同步 / 钳制 / 调整 三选一）
//! 9. 脚部接触与 IK
//! 10. 全骨骼正向运动学

use glam::{Quat, Vec3};

use crate::animation::{Database, FeatureSet, Inertializer, SearchParams, FEATURE_COUNT};
use crate::config::{get_config, MotionConfig};
use crate::nnet::LearnedMotion;
use crate::skeleton::{
    forward_kinematics_full, solve_leg, Character, ContactState, GlobalPoseCache, LegIkSettings, Pose,
};
use crate::trajectory::{
    collide_obstacles, desired_gait_update, desired_rotation_update, desired_velocity_update,
    orbit_camera_update_azimuth, MoveSpeeds, PredictionInput, SearchTimer, SimulationState, StickInput,
    Trajectory,
};
use crate::{MotionError, Result};

use super::root::{
    adjust_character_position, adjust_character_position_by_velocity, adjust_character_rotation,
    adjust_character_rotation_by_velocity, clamp_character_position, clamp_character_rotation,
    synchronize_root, RootCorrection,
};
use super::{ControllerAssets, ControllerFlags, ControllerInput, FrameOutput};

/// 接触骨骼数（左右脚尖）
const CONTACT_COUNT: usize = 2;

/// 运动匹配控制器（独占所有每帧状态）
#[derive(Debug)]
pub struct MotionMatchingController {
    config: MotionConfig,
    flags: ControllerFlags,
    database: Database,
    character: Option<Character>,
    learned: Option<LearnedMotion>,
    search_params: SearchParams,

    // ========== 动作源 ==========
    /// 当前数据库帧
    frame: usize,
    /// 动作源姿态（数据库帧或网络解压结果）
    source: Pose,
    source_contacts: [bool; CONTACT_COUNT],
    /// 投影切换目标
    transition_pose: Pose,
    transition_contacts: [bool; CONTACT_COUNT],
    /// 下一次搜索无条件切换（模式切换后）
    force_transition: bool,

    // ========== 输出 ==========
    inertializer: Inertializer,
    /// 惯性化输出
    display: Pose,
    /// IK 后的姿态
    adjusted: Pose,
    pose_cache: GlobalPoseCache,
    global_positions: Vec<Vec3>,
    global_rotations: Vec<Quat>,

    // ========== 模拟 ==========
    simulation: SimulationState,
    desired_velocity: Vec3,
    desired_rotation: Quat,
    desired_gait: f32,
    desired_gait_velocity: f32,
    camera_azimuth: f32,
    trajectory: Trajectory,
    search_timer: SearchTimer,
    query: Vec<f32>,

    // ========== 接触 ==========
    contacts: [ContactState; CONTACT_COUNT],
}

impl MotionMatchingController {
    /// 使用全局配置创建
    pub fn new(assets: ControllerAssets) -> Result<Self> {
        Self::with_config(assets, get_config())
    }

    /// 使用指定配置创建
    pub fn with_config(assets: ControllerAssets, config: MotionConfig) -> Result<Self> {
        let ControllerAssets { mut database, character, learned } = assets;

        if database.features().is_none() {
            let features = FeatureSet::build(&database, config.feature_weights(), config.trajectory_sample_frames);
            database.set_features(features)?;
        }
        let nbones = database.nbones();
        if let Some(character) = &character {
            character.check_bone_count(nbones)?;
        }
        let first_clip = database
            .clips()
            .first()
            .cloned()
            .ok_or_else(|| MotionError::InvalidData("Database has no clips".to_string()))?;

        let frame = first_clip.start;
        let mut source = Pose::new(nbones);
        let mut source_contacts = [false; CONTACT_COUNT];
        database.copy_frame_into(frame, &mut source, &mut source_contacts);

        let root_position = source.root_position();
        let root_rotation = source.root_rotation();
        let mut inertializer = Inertializer::new(nbones);
        inertializer.reset(root_position, root_rotation);

        let simulation = SimulationState::new(root_position, root_rotation);
        let mut trajectory = Trajectory::default();
        trajectory.reset(&simulation);

        let search_params = SearchParams {
            ignore_range_end: config.ignore_range_end,
            ignore_surrounding: config.ignore_surrounding,
        };
        let search_timer = SearchTimer::new(config.search_time);

        log::info!(
            "[Controller] 控制器创建: {} 骨骼, 起始帧 {}, 学习式网络 {}",
            nbones,
            frame,
            if learned.is_some() { "已加载" } else { "未加载" }
        );

        let mut controller = Self {
            flags: ControllerFlags::default(),
            database,
            character,
            learned,
            search_params,
            frame,
            display: source.clone(),
            adjusted: source.clone(),
            transition_pose: source.clone(),
            source,
            source_contacts,
            transition_contacts: [false; CONTACT_COUNT],
            force_transition: false,
            inertializer,
            pose_cache: GlobalPoseCache::new(nbones),
            global_positions: vec![Vec3::ZERO; nbones],
            global_rotations: vec![Quat::IDENTITY; nbones],
            simulation,
            desired_velocity: Vec3::ZERO,
            desired_rotation: root_rotation,
            desired_gait: 0.0,
            desired_gait_velocity: 0.0,
            camera_azimuth: 0.0,
            trajectory,
            search_timer,
            query: vec![0.0; FEATURE_COUNT],
            contacts: [ContactState::default(); CONTACT_COUNT],
            config,
        };
        controller.reset_contacts();
        Ok(controller)
    }

    // ========== 访问 ==========

    #[inline]
    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    #[inline]
    pub fn flags(&self) -> ControllerFlags {
        self.flags
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn character(&self) -> Option<&Character> {
        self.character.as_ref()
    }

    /// 当前数据库帧（学习模式下为切换前最后使用的帧）
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.frame
    }

    #[inline]
    pub fn simulation(&self) -> &SimulationState {
        &self.simulation
    }

    #[inline]
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    #[inline]
    pub fn contacts(&self) -> &[ContactState] {
        &self.contacts
    }

    #[inline]
    pub fn camera_azimuth(&self) -> f32 {
        self.camera_azimuth
    }

    #[inline]
    pub fn is_learned_available(&self) -> bool {
        self.learned.is_some()
    }

    // ========== 开关 ==========

    /// 打开 / 关闭模式
    ///
    /// IK 从关到开时按当前姿态重置接触；LEARNED 交给 `set_learned_enabled`。
    pub fn set_flag(&mut self, flag: ControllerFlags, enabled: bool) -> Result<()> {
        if flag.contains(ControllerFlags::LEARNED) {
            self.set_learned_enabled(enabled)?;
        }
        let flag = flag - ControllerFlags::LEARNED;

        let ik_before = self.flags.contains(ControllerFlags::IK);
        self.flags.set(flag, enabled);
        if !ik_before && self.flags.contains(ControllerFlags::IK) {
            self.reset_contacts();
        }
        Ok(())
    }

    /// 切换学习式运动匹配
    ///
    /// 打开时以当前帧特征初始化网络流；两个方向都在下一帧强制切换。
    pub fn set_learned_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.flags.contains(ControllerFlags::LEARNED) {
            return Ok(());
        }
        if enabled {
            let learned = match self.learned.as_mut() {
                Some(learned) => learned,
                None => {
                    log::warn!("[Controller] 未加载网络，无法开启学习式运动匹配");
                    return Err(MotionError::LearnedMotionUnavailable);
                }
            };
            if let Some(features) = self.database.features() {
                learned.seed(features.frame(self.frame));
            }
        }

        self.flags.set(ControllerFlags::LEARNED, enabled);
        self.force_transition = true;
        self.search_timer.expire();
        log::info!("[Controller] 学习式运动匹配: {}", if enabled { "开启" } else { "关闭" });
        Ok(())
    }

    fn learned_active(&self) -> bool {
        self.flags.contains(ControllerFlags::LEARNED) && self.learned.is_some()
    }

    fn reset_contacts(&mut self) {
        forward_kinematics_full(
            &self.display.view(),
            self.database.skeleton(),
            &mut self.global_positions,
            &mut self.global_rotations,
        );
        let toes = self.database.skeleton().roles().contact_bones();
        for (i, contact) in self.contacts.iter_mut().enumerate() {
            contact.reset(self.global_positions[toes[i]], Vec3::ZERO, self.source_contacts[i]);
        }
    }

    // ========== 每帧 ==========

    /// 推进一帧
    ///
    /// 数据库按固定帧率采样，每次调用前进一帧；`dt` 用于模拟与混合。
    pub fn tick(&mut self, dt: f32, input: &ControllerInput) -> FrameOutput<'_> {
        let sticks = input.sticks();

        // 1-2. 期望值与强制搜索
        let (speeds, force_search) = self.update_desired(dt, input, &sticks);

        // 3. 轨迹预测
        let prediction = PredictionInput {
            simulation: &self.simulation,
            desired_velocity: self.desired_velocity,
            desired_rotation: self.desired_rotation,
            camera_azimuth: self.camera_azimuth,
            sticks: &sticks,
            speeds: &speeds,
            obstacles: &input.obstacles,
        };
        self.trajectory.predict(&prediction, &self.config);

        // 4. 查询
        self.build_query();

        // 5. 搜索 / 投影
        let learned = self.learned_active();
        let end_of_clip = !learned && self.database.is_clip_end(self.frame);
        if self.force_transition || self.search_timer.should_search(force_search, end_of_clip) {
            if learned {
                self.project(dt);
            } else {
                self.search(end_of_clip);
            }
            self.force_transition = false;
            self.search_timer.restart(self.config.search_time);
        }
        self.search_timer.tick(dt);

        // 6. 推进动作源
        self.advance_source(dt);

        // 7. 惯性化
        self.inertializer.update(
            &mut self.display,
            &self.source.view(),
            self.config.inertialize_blending_halflife,
            dt,
        );

        // 8. 模拟与根骨骼校正
        self.simulation.update(self.desired_velocity, self.desired_rotation, &self.config, &input.obstacles, dt);
        self.correct_root(dt, input);

        // 9. 接触与 IK
        self.adjusted.copy_from(&self.display);
        if self.flags.contains(ControllerFlags::IK) {
            self.solve_contacts(dt);
        }

        // 10. 正向运动学
        forward_kinematics_full(
            &self.adjusted.view(),
            self.database.skeleton(),
            &mut self.global_positions,
            &mut self.global_rotations,
        );

        FrameOutput {
            global_positions: &self.global_positions,
            global_rotations: &self.global_rotations,
            root_position: self.adjusted.root_position(),
            root_rotation: self.adjusted.root_rotation(),
        }
    }

    /// 1. 相机、步态、期望速度与朝向
    ///
    /// 返回本帧移动速度，以及期望值变化率回落时的强制搜索标记。
    fn update_desired(&mut self, dt: f32, input: &ControllerInput, sticks: &StickInput) -> (MoveSpeeds, bool) {
        self.camera_azimuth = match input.camera_azimuth {
            Some(azimuth) => azimuth,
            None => orbit_camera_update_azimuth(self.camera_azimuth, sticks, self.config.camera_turn_speed, dt),
        };

        desired_gait_update(
            &mut self.desired_gait,
            &mut self.desired_gait_velocity,
            input.walk,
            self.config.desired_gait_halflife,
            dt,
        );
        let run = MoveSpeeds {
            forward: self.config.simulation_run_fwrd_speed,
            side: self.config.simulation_run_side_speed,
            back: self.config.simulation_run_back_speed,
        };
        let walk = MoveSpeeds {
            forward: self.config.simulation_walk_fwrd_speed,
            side: self.config.simulation_walk_side_speed,
            back: self.config.simulation_walk_back_speed,
        };
        let speeds = run.lerp(&walk, self.desired_gait);

        let previous_velocity = self.desired_velocity;
        let previous_rotation = self.desired_rotation;
        self.desired_velocity =
            desired_velocity_update(sticks.movement, self.camera_azimuth, self.simulation.rotation, &speeds);
        self.desired_rotation = desired_rotation_update(
            self.desired_rotation,
            sticks,
            self.camera_azimuth,
            self.desired_velocity,
            self.config.stick_threshold,
        );

        // 2. 变化率由高回落到阈值以下时强制搜索
        let force_search = self.search_timer.observe(
            previous_velocity,
            self.desired_velocity,
            previous_rotation,
            self.desired_rotation,
            self.config.desired_velocity_change_threshold,
            self.config.desired_rotation_change_threshold,
            self.config.force_search_cooldown,
            dt,
        );
        (speeds, force_search)
    }

    /// 4. 组装查询向量
    fn build_query(&mut self) {
        let features = match self.database.features() {
            Some(features) => features,
            None => return,
        };
        let pose_features: &[f32] = match (self.flags.contains(ControllerFlags::LEARNED), self.learned.as_ref()) {
            (true, Some(learned)) => &learned.features_current,
            _ => features.frame(self.frame),
        };
        features.build_query(
            &mut self.query,
            pose_features,
            self.display.root_position(),
            self.display.root_rotation(),
            &self.trajectory.positions[1..],
            &self.trajectory.rotations[1..],
        );
    }

    /// 5. 数据库搜索
    fn search(&mut self, end_of_clip: bool) {
        let result = self.database.search(&self.query, Some(self.frame), &self.search_params);
        let current_cost = if end_of_clip || self.force_transition {
            f32::MAX
        } else {
            self.database.frame_cost(&self.query, self.frame)
        };

        let target = match result {
            Some(result) if result.cost + self.config.transition_cost < current_cost => result.index,
            // 模式切换后即使没有更好的候选也要对齐到数据库
            _ if self.force_transition => self.frame,
            _ => return,
        };

        log::debug!("[Controller] 搜索切换: {} -> {}", self.frame, target);
        self.inertializer.transition(&self.display, &self.database.frame(target));
        self.frame = target;
    }

    /// 5. 网络投影
    fn project(&mut self, dt: f32) {
        let Some(learned) = self.learned.as_mut() else {
            return;
        };
        let projection = learned.project(&self.query, self.config.transition_cost);
        if !(projection.transition || self.force_transition) {
            return;
        }

        learned.decompress_projected(
            &mut self.transition_pose,
            &mut self.transition_contacts,
            self.source.root_position(),
            self.source.root_rotation(),
            dt,
        );
        self.inertializer.transition(&self.display, &self.transition_pose.view());
        learned.accept_projection();
        log::debug!("[Lmm] 投影切换, 代价 {:.4}", projection.cost);
    }

    /// 6. 推进动作源一帧
    fn advance_source(&mut self, dt: f32) {
        match self.learned.as_mut() {
            Some(learned) if self.flags.contains(ControllerFlags::LEARNED) => {
                learned.step(&mut self.source, &mut self.source_contacts, dt);
            }
            _ => {
                self.frame = self.database.trajectory_index_clamp(self.frame, 1);
                self.database.copy_frame_into(self.frame, &mut self.source, &mut self.source_contacts);
            }
        }
    }

    /// 8. 根骨骼校正
    fn correct_root(&mut self, dt: f32, input: &ControllerInput) {
        let character_position = self.display.root_position();
        let character_rotation = self.display.root_rotation();
        let correction = RootCorrection::choose(
            self.flags,
            character_position,
            character_rotation,
            self.simulation.position,
            self.simulation.rotation,
            &self.config,
        );

        let (position, rotation) = match correction {
            RootCorrection::None => return,
            RootCorrection::Synchronization => {
                let (position, rotation) = synchronize_root(
                    self.simulation.position,
                    self.simulation.rotation,
                    character_position,
                    character_rotation,
                    self.config.synchronization_data_factor,
                );
                let position = collide_obstacles(
                    self.simulation.position,
                    position,
                    &input.obstacles,
                    self.config.obstacle_radius,
                    self.config.obstacle_max_segment,
                );
                self.simulation.position = position;
                self.simulation.rotation = rotation;
                (position, rotation)
            }
            RootCorrection::Clamping => (
                clamp_character_position(
                    character_position,
                    self.simulation.position,
                    self.config.clamping_max_distance,
                ),
                clamp_character_rotation(
                    character_rotation,
                    self.simulation.rotation,
                    self.config.clamping_max_angle,
                ),
            ),
            RootCorrection::Adjustment if self.flags.contains(ControllerFlags::ADJUSTMENT_BY_VELOCITY) => (
                adjust_character_position_by_velocity(
                    character_position,
                    self.display.velocities[0],
                    self.simulation.position,
                    self.config.adjustment_position_max_ratio,
                    self.config.adjustment_position_halflife,
                    dt,
                ),
                adjust_character_rotation_by_velocity(
                    character_rotation,
                    self.display.angular_velocities[0],
                    self.simulation.rotation,
                    self.config.adjustment_rotation_max_ratio,
                    self.config.adjustment_rotation_halflife,
                    dt,
                ),
            ),
            RootCorrection::Adjustment => (
                adjust_character_position(
                    character_position,
                    self.simulation.position,
                    self.config.adjustment_position_halflife,
                    dt,
                ),
                adjust_character_rotation(
                    character_rotation,
                    self.simulation.rotation,
                    self.config.adjustment_rotation_halflife,
                    dt,
                ),
            ),
        };

        self.inertializer.root_adjust(&mut self.display, position, rotation);
    }

    /// 9. 接触锁定与腿部 IK
    fn solve_contacts(&mut self, dt: f32) {
        let skeleton = self.database.skeleton();
        let roles = skeleton.roles();
        let settings = LegIkSettings {
            max_length_buffer: self.config.ik_max_length_buffer,
            foot_height: self.config.ik_foot_height,
            toe_length: self.config.ik_toe_length,
            knee_forward_axis: roles.knee_forward_axis,
            toe_axis: roles.toe_axis,
        };

        for (i, toe) in roles.contact_bones().into_iter().enumerate() {
            self.pose_cache.invalidate();
            let (toe_position, _) = self.pose_cache.compute(&self.adjusted.view(), skeleton, toe);

            let contact = &mut self.contacts[i];
            contact.update(
                toe_position,
                self.source_contacts[i],
                self.config.ik_unlock_radius,
                self.config.ik_foot_height,
                self.config.ik_blending_halflife,
                dt,
            );
            solve_leg(&mut self.adjusted, skeleton, &mut self.pose_cache, toe, contact, &settings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    use crate::test_support::{init_logging, learned_motion, synthetic_database, SYNTHETIC_PARENTS};
    use crate::trajectory::Obstacle;

    const DT: f32 = 1.0 / 60.0;

    fn controller() -> MotionMatchingController {
        init_logging();
        let assets = ControllerAssets::from_database(synthetic_database());
        MotionMatchingController::with_config(assets, MotionConfig::default()).unwrap()
    }

    fn forward() -> ControllerInput {
        ControllerInput {
            move_stick: Vec2::new(0.0, 1.0),
            ..Default::default()
        }
    }

    fn assert_finite(output: &FrameOutput<'_>) {
        assert!(output.root_position.is_finite());
        assert!(output.root_rotation.is_finite());
        assert!(output.global_positions.iter().all(|p| p.is_finite()));
        assert!(output.global_rotations.iter().all(|q| q.is_finite()));
    }

    #[test]
    fn test_builds_missing_features() {
        let controller = controller();
        assert!(controller.database().features().is_some());
        assert_eq!(controller.current_frame(), 0);
        assert_eq!(controller.flags(), ControllerFlags::default());
    }

    #[test]
    fn test_ticks_stay_valid() {
        let mut controller = controller();
        let input = forward();

        for _ in 0..240 {
            let output = controller.tick(DT, &input);
            assert_eq!(output.global_positions.len(), SYNTHETIC_PARENTS.len());
            assert_finite(&output);
            assert!(controller.database().clip_of(controller.current_frame()).is_some());
        }

        // 模拟角色沿相机前方（-z）移动
        assert!(controller.simulation().position.z < -1.0);
    }

    #[test]
    fn test_root_stays_within_clamp() {
        let mut controller = controller();
        let limit = controller.config().clamping_max_distance;
        let input = ControllerInput {
            move_stick: Vec2::new(1.0, 0.5),
            ..Default::default()
        };

        for _ in 0..120 {
            let root = controller.tick(DT, &input).root_position;
            let distance = (root - controller.simulation().position).length();
            assert!(distance <= limit + 1e-4, "distance {distance}");
        }
    }

    #[test]
    fn test_synchronization_moves_simulation() {
        let mut controller = controller();
        controller.set_flag(ControllerFlags::SYNCHRONIZATION, true).unwrap();

        for _ in 0..30 {
            let output = controller.tick(DT, &forward());
            let root = output.root_position;
            assert!((root - controller.simulation().position).length() < 1e-4);
        }
    }

    #[test]
    fn test_obstacle_blocks_simulation() {
        let mut controller = controller();
        let input = ControllerInput {
            obstacles: vec![Obstacle::new(Vec3::new(0.0, 0.0, -2.0), Vec3::new(2.0, 1.0, 0.5))],
            ..forward()
        };

        for _ in 0..300 {
            controller.tick(DT, &input);
        }
        // 障碍物近面 z = -1.5，推出半径 0.6
        assert!(controller.simulation().position.z > -1.5 + 0.5);
    }

    #[test]
    fn test_ik_toggle_resets_contacts() {
        let mut controller = controller();
        controller.set_flag(ControllerFlags::IK, false).unwrap();
        for _ in 0..20 {
            controller.tick(DT, &forward());
        }
        let stale = controller.contacts()[0].position;

        controller.set_flag(ControllerFlags::IK, true).unwrap();
        let toe = controller.database().skeleton().roles().left_toe;
        let contact = controller.contacts()[0];
        assert_eq!(contact.position, contact.point);
        assert!(!contact.lock);
        assert_eq!(contact.position, controller.global_positions[toe]);
        assert_ne!(contact.position, stale);

        let output = controller.tick(DT, &forward());
        assert_finite(&output);
    }

    #[test]
    fn test_learned_requires_networks() {
        let mut controller = controller();
        assert!(!controller.is_learned_available());
        let result = controller.set_flag(ControllerFlags::LEARNED, true);
        assert!(matches!(result, Err(MotionError::LearnedMotionUnavailable)));
        assert!(!controller.flags().contains(ControllerFlags::LEARNED));
    }

    #[test]
    fn test_learned_mode_ticks() {
        init_logging();
        let assets = ControllerAssets {
            database: synthetic_database(),
            character: None,
            learned: Some(learned_motion(SYNTHETIC_PARENTS.len(), 8)),
        };
        let mut controller = MotionMatchingController::with_config(assets, MotionConfig::default()).unwrap();
        controller.set_flag(ControllerFlags::IK, false).unwrap();
        controller.set_flag(ControllerFlags::LEARNED, true).unwrap();
        assert!(controller.flags().contains(ControllerFlags::LEARNED));

        let frame = controller.current_frame();
        for _ in 0..30 {
            let output = controller.tick(DT, &forward());
            assert_finite(&output);
        }
        // 学习模式不推进数据库帧
        assert_eq!(controller.current_frame(), frame);

        controller.set_learned_enabled(false).unwrap();
        for _ in 0..5 {
            let output = controller.tick(DT, &forward());
            assert_finite(&output);
        }
        assert!(controller.database().clip_of(controller.current_frame()).is_some());
    }

    #[test]
    fn test_camera_azimuth_override() {
        let mut controller = controller();
        let input = ControllerInput {
            camera_azimuth: Some(1.25),
            look_stick: Vec2::new(1.0, 0.0),
            ..Default::default()
        };
        controller.tick(DT, &input);
        assert_eq!(controller.camera_azimuth(), 1.25);

        let input = ControllerInput {
            look_stick: Vec2::new(1.0, 0.0),
            ..Default::default()
        };
        controller.tick(DT, &input);
        assert!(controller.camera_azimuth() < 1.25);
    }
}
