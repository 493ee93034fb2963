//! 搜索触发
//!
//! 三种情况触发搜索：
//! - 期望速度或期望朝向从快速变化回落到阈值以下（冷却时间内只触发一次）
//! - 周期计时器到期
//! - 当前帧到达片段末尾

use glam::{Quat, Vec3};

use crate::math::{quat_abs, quat_to_scaled_angle_axis};

/// 搜索计时器
#[derive(Clone, Debug, Default)]
pub struct SearchTimer {
    search_timer: f32,
    force_search_timer: f32,
    velocity_change_prev: Vec3,
    velocity_change_curr: Vec3,
    rotation_change_prev: Vec3,
    rotation_change_curr: Vec3,
}

impl SearchTimer {
    pub fn new(search_time: f32) -> Self {
        Self {
            search_timer: search_time,
            ..Default::default()
        }
    }

    /// 根据期望值变化率判断是否强制搜索
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        previous_velocity: Vec3,
        desired_velocity: Vec3,
        previous_rotation: Quat,
        desired_rotation: Quat,
        velocity_threshold: f32,
        rotation_threshold: f32,
        cooldown: f32,
        dt: f32,
    ) -> bool {
        if dt > 0.0 {
            self.velocity_change_prev = self.velocity_change_curr;
            self.velocity_change_curr = (desired_velocity - previous_velocity) / dt;
            self.rotation_change_prev = self.rotation_change_curr;
            self.rotation_change_curr =
                quat_to_scaled_angle_axis(quat_abs(desired_rotation * previous_rotation.inverse())) / dt;
        }

        let velocity_settled = self.velocity_change_prev.length() >= velocity_threshold
            && self.velocity_change_curr.length() < velocity_threshold;
        let rotation_settled = self.rotation_change_prev.length() >= rotation_threshold
            && self.rotation_change_curr.length() < rotation_threshold;

        if self.force_search_timer <= 0.0 && (velocity_settled || rotation_settled) {
            self.force_search_timer = cooldown;
            true
        } else {
            if self.force_search_timer > 0.0 {
                self.force_search_timer -= dt;
            }
            false
        }
    }

    /// 本帧是否搜索
    #[inline]
    pub fn should_search(&self, force: bool, end_of_clip: bool) -> bool {
        force || end_of_clip || self.search_timer <= 0.0
    }

    /// 搜索后重置周期计时
    #[inline]
    pub fn restart(&mut self, search_time: f32) {
        self.search_timer = search_time;
    }

    /// 立即在下一帧搜索
    #[inline]
    pub fn expire(&mut self) {
        self.search_timer = 0.0;
    }

    /// 计时推进
    #[inline]
    pub fn tick(&mut self, dt: f32) {
        self.search_timer -= dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn observe(timer: &mut SearchTimer, prev: Vec3, next: Vec3) -> bool {
        timer.observe(prev, next, Quat::IDENTITY, Quat::IDENTITY, 50.0, 50.0, 0.1, DT)
    }

    #[test]
    fn test_force_on_settling_edge() {
        let mut timer = SearchTimer::new(0.1);
        // 突变：变化率 4 / DT = 240 >= 50
        assert!(!observe(&mut timer, Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0)));
        // 回落
        assert!(observe(&mut timer, Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, 4.0)));
        // 保持稳定不再触发
        assert!(!observe(&mut timer, Vec3::new(0.0, 0.0, 4.0), Vec3::new(0.0, 0.0, 4.0)));
    }

    #[test]
    fn test_cooldown_blocks_second_force() {
        let mut timer = SearchTimer::new(0.1);
        let a = Vec3::ZERO;
        let b = Vec3::new(4.0, 0.0, 0.0);
        observe(&mut timer, a, b);
        assert!(observe(&mut timer, b, b));
        // 冷却期内再次突变回落
        observe(&mut timer, b, a);
        assert!(!observe(&mut timer, a, a));
    }

    #[test]
    fn test_periodic_timer() {
        let mut timer = SearchTimer::new(0.1);
        assert!(!timer.should_search(false, false));
        for _ in 0..7 {
            timer.tick(DT);
        }
        assert!(timer.should_search(false, false));
        timer.restart(0.1);
        assert!(!timer.should_search(false, false));
        assert!(timer.should_search(false, true));
    }
}
