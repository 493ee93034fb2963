//! 脚部接触锁定
//!
//! 状态机：
//! - 未锁定：跟随动画中的脚尖位置
//! - 锁定：固定在接触点
//!
//! 状态切换时通过惯性化偏移平滑过渡，不会跳变。

use glam::Vec3;

use crate::math::{inertialize_transition, inertialize_update};

/// 单个接触骨骼的状态
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactState {
    /// 上一帧输入的接触标记
    pub state: bool,
    /// 是否锁定
    pub lock: bool,
    /// 混合后的位置（IK 目标）
    pub position: Vec3,
    /// 混合后的速度
    pub velocity: Vec3,
    /// 锁定点
    pub point: Vec3,
    /// 上一帧输入位置（用于差分速度）
    pub target: Vec3,
    pub offset_position: Vec3,
    pub offset_velocity: Vec3,
}

impl ContactState {
    /// 重置为跟随输入，无偏移
    pub fn reset(&mut self, input_position: Vec3, input_velocity: Vec3, input_state: bool) {
        self.state = input_state;
        self.lock = false;
        self.position = input_position;
        self.velocity = input_velocity;
        self.point = input_position;
        self.target = input_position;
        self.offset_position = Vec3::ZERO;
        self.offset_velocity = Vec3::ZERO;
    }

    /// 推进一帧
    ///
    /// # 参数
    /// - `input_position`: 动画中的脚尖位置
    /// - `input_state`: 动画中的接触标记
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        input_position: Vec3,
        input_state: bool,
        unlock_radius: f32,
        foot_height: f32,
        halflife: f32,
        dt: f32,
    ) {
        let input_velocity = (input_position - self.target) / (dt + 1e-8);
        self.target = input_position;

        // 锁定时输入为锁定点，否则为动画位置
        let (fed_position, fed_velocity) = if self.lock {
            (self.point, Vec3::ZERO)
        } else {
            (input_position, input_velocity)
        };
        inertialize_update(
            &mut self.position,
            &mut self.velocity,
            &mut self.offset_position,
            &mut self.offset_velocity,
            fed_position,
            fed_velocity,
            halflife,
            dt,
        );

        let unlock = self.lock && (self.point - input_position).length() > unlock_radius;

        if !self.state && input_state {
            // 上升沿：锁定到当前位置，高度不低于脚部高度
            self.lock = true;
            self.point = self.position;
            self.point.y = self.point.y.max(foot_height);
            inertialize_transition(
                &mut self.offset_position,
                &mut self.offset_velocity,
                input_position,
                input_velocity,
                self.point,
                Vec3::ZERO,
            );
            log::debug!("[Contact] 锁定于 {:?}", self.point);
        } else if (self.lock && self.state && !input_state) || unlock {
            // 下降沿或距离过远：解锁，过渡回动画
            self.lock = false;
            inertialize_transition(
                &mut self.offset_position,
                &mut self.offset_velocity,
                self.point,
                Vec3::ZERO,
                input_position,
                input_velocity,
            );
            log::debug!("[Contact] 解锁");
        }

        self.state = input_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_lock_holds_position() {
        let mut contact = ContactState::default();
        let start = Vec3::new(0.3, 0.05, 1.0);
        contact.reset(start, Vec3::ZERO, false);

        contact.update(start, true, 0.2, 0.02, 0.0, DT);
        assert!(contact.lock);
        let point = contact.point;
        assert!((point - start).length() < 1e-4);

        // 输入在解锁半径内漂移，输出保持在锁定点
        for i in 1..10 {
            let input = start + Vec3::new(0.01 * i as f32, 0.0, 0.0);
            contact.update(input, true, 0.2, 0.02, 0.0, DT);
            assert!(contact.lock);
            assert!((contact.position - point).length() < 1e-4);
        }
    }

    #[test]
    fn test_lock_point_respects_foot_height() {
        let mut contact = ContactState::default();
        let start = Vec3::new(0.0, -0.1, 0.0);
        contact.reset(start, Vec3::ZERO, false);
        contact.update(start, true, 0.2, 0.02, 0.1, DT);
        assert!((contact.point.y - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_unlock_when_far() {
        let mut contact = ContactState::default();
        contact.reset(Vec3::ZERO, Vec3::ZERO, false);
        contact.update(Vec3::ZERO, true, 0.2, 0.0, 0.0, DT);
        assert!(contact.lock);

        let far = Vec3::new(0.5, 0.0, 0.0);
        contact.update(far, true, 0.2, 0.0, 0.0, DT);
        assert!(!contact.lock);

        // 半衰期为 0 时下一帧立即回到输入
        contact.update(far, true, 0.2, 0.0, 0.0, DT);
        assert!((contact.position - far).length() < 1e-4);
    }

    #[test]
    fn test_falling_edge_unlocks() {
        let mut contact = ContactState::default();
        contact.reset(Vec3::ZERO, Vec3::ZERO, false);
        contact.update(Vec3::ZERO, true, 0.2, 0.0, 0.1, DT);
        contact.update(Vec3::ZERO, false, 0.2, 0.0, 0.1, DT);
        assert!(!contact.lock);
        assert!(!contact.state);
    }
}
