//! 惯性化混合
//!
//! 切换动作源时不做交叉淡入，而是记录显示姿态与新姿态之间的偏移，
//! 之后每帧用临界阻尼弹簧把偏移衰减到零：输出 = 输入 + 偏移。
//!
//! 根骨骼特殊处理：切换时记录源/目标两个参考系，新动作的根运动
//! 从源参考系重新表达到目标参考系，使角色在切换处继续保持位置与朝向。

use glam::{Quat, Vec3};

use crate::math::{inertialize_update, inertialize_update_quat, quat_abs};
use crate::skeleton::{Pose, PoseView};

/// 惯性化状态
#[derive(Clone, Debug)]
pub struct Inertializer {
    pub offset_positions: Vec<Vec3>,
    pub offset_velocities: Vec<Vec3>,
    pub offset_rotations: Vec<Quat>,
    pub offset_angular_velocities: Vec<Vec3>,

    // ========== 根骨骼参考系 ==========
    /// 切换时新动作的根位置
    pub src_position: Vec3,
    /// 切换时新动作的根旋转
    pub src_rotation: Quat,
    /// 切换时显示的根位置
    pub dst_position: Vec3,
    /// 切换时显示的根旋转
    pub dst_rotation: Quat,
}

impl Inertializer {
    pub fn new(bone_count: usize) -> Self {
        Self {
            offset_positions: vec![Vec3::ZERO; bone_count],
            offset_velocities: vec![Vec3::ZERO; bone_count],
            offset_rotations: vec![Quat::IDENTITY; bone_count],
            offset_angular_velocities: vec![Vec3::ZERO; bone_count],
            src_position: Vec3::ZERO,
            src_rotation: Quat::IDENTITY,
            dst_position: Vec3::ZERO,
            dst_rotation: Quat::IDENTITY,
        }
    }

    /// 清零偏移，两个参考系都设为给定根变换
    pub fn reset(&mut self, root_position: Vec3, root_rotation: Quat) {
        self.offset_positions.fill(Vec3::ZERO);
        self.offset_velocities.fill(Vec3::ZERO);
        self.offset_rotations.fill(Quat::IDENTITY);
        self.offset_angular_velocities.fill(Vec3::ZERO);

        self.src_position = root_position;
        self.src_rotation = root_rotation;
        self.dst_position = root_position;
        self.dst_rotation = root_rotation;
    }

    /// 源参考系到目标参考系的旋转
    #[inline]
    fn frame_rotation(&self) -> Quat {
        self.dst_rotation * self.src_rotation.inverse()
    }

    /// 记录从显示姿态 `current` 到新姿态 `incoming` 的过渡
    ///
    /// 紧接着以 `dt = 0` 调用 `update` 会原样输出 `current`。
    pub fn transition(&mut self, current: &Pose, incoming: &PoseView<'_>) {
        // 根骨骼：只记录速度差，位置与朝向由参考系吸收
        self.src_position = incoming.positions[0];
        self.src_rotation = incoming.rotations[0];
        self.dst_position = current.positions[0];
        self.dst_rotation = current.rotations[0];

        let frame = self.frame_rotation();
        self.offset_positions[0] = Vec3::ZERO;
        self.offset_rotations[0] = Quat::IDENTITY;
        self.offset_velocities[0] = current.velocities[0] - frame * incoming.velocities[0];
        self.offset_angular_velocities[0] = current.angular_velocities[0] - frame * incoming.angular_velocities[0];

        for bone in 1..current.bone_count() {
            self.offset_positions[bone] = current.positions[bone] - incoming.positions[bone];
            self.offset_velocities[bone] = current.velocities[bone] - incoming.velocities[bone];

            let offset_rotation = quat_abs(current.rotations[bone] * incoming.rotations[bone].inverse()).normalize();
            self.offset_rotations[bone] = offset_rotation;
            self.offset_angular_velocities[bone] =
                current.angular_velocities[bone] - offset_rotation * incoming.angular_velocities[bone];
        }
    }

    /// 衰减偏移并输出
    pub fn update(&mut self, output: &mut Pose, input: &PoseView<'_>, halflife: f32, dt: f32) {
        // 根骨骼从源参考系重新表达到目标参考系
        let frame = self.frame_rotation();
        let world_position = frame * (input.positions[0] - self.src_position) + self.dst_position;
        let world_velocity = frame * input.velocities[0];
        let world_rotation = quat_abs(frame * input.rotations[0]).normalize();
        let world_angular_velocity = frame * input.angular_velocities[0];

        inertialize_update(
            &mut output.positions[0],
            &mut output.velocities[0],
            &mut self.offset_positions[0],
            &mut self.offset_velocities[0],
            world_position,
            world_velocity,
            halflife,
            dt,
        );
        inertialize_update_quat(
            &mut output.rotations[0],
            &mut output.angular_velocities[0],
            &mut self.offset_rotations[0],
            &mut self.offset_angular_velocities[0],
            world_rotation,
            world_angular_velocity,
            halflife,
            dt,
        );

        for bone in 1..output.bone_count() {
            inertialize_update(
                &mut output.positions[bone],
                &mut output.velocities[bone],
                &mut self.offset_positions[bone],
                &mut self.offset_velocities[bone],
                input.positions[bone],
                input.velocities[bone],
                halflife,
                dt,
            );
            inertialize_update_quat(
                &mut output.rotations[bone],
                &mut output.angular_velocities[bone],
                &mut self.offset_rotations[bone],
                &mut self.offset_angular_velocities[bone],
                input.rotations[bone],
                input.angular_velocities[bone],
                halflife,
                dt,
            );
        }
    }

    /// 把显示的根移动到给定变换
    ///
    /// 以显示的根为中心旋转目标参考系与根偏移，之后的 `update`
    /// 从调整后的根继续输出。
    pub fn root_adjust(&mut self, output: &mut Pose, position: Vec3, rotation: Quat) {
        let delta = quat_abs(rotation * output.rotations[0].inverse()).normalize();

        self.dst_position = delta * (self.dst_position - output.positions[0]) + position;
        self.dst_rotation = (delta * self.dst_rotation).normalize();

        self.offset_positions[0] = delta * self.offset_positions[0];
        self.offset_velocities[0] = delta * self.offset_velocities[0];
        self.offset_rotations[0] = (delta * self.offset_rotations[0] * delta.inverse()).normalize();
        self.offset_angular_velocities[0] = delta * self.offset_angular_velocities[0];

        output.positions[0] = position;
        output.rotations[0] = rotation;
        output.velocities[0] = delta * output.velocities[0];
        output.angular_velocities[0] = delta * output.angular_velocities[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(seed: f32) -> Pose {
        let mut pose = Pose::new(4);
        for bone in 0..4 {
            let f = seed + bone as f32;
            pose.positions[bone] = Vec3::new(f.sin(), f.cos(), 0.5 * f);
            pose.velocities[bone] = Vec3::new(0.1 * f, -0.2, f.cos());
            pose.rotations[bone] = Quat::from_axis_angle(Vec3::new(1.0, f, 0.5).normalize(), 0.3 * f);
            pose.angular_velocities[bone] = Vec3::new(0.0, 0.5 * f.sin(), 0.1);
        }
        pose
    }

    fn assert_pose_close(a: &Pose, b: &Pose) {
        for bone in 0..a.bone_count() {
            assert!((a.positions[bone] - b.positions[bone]).length() < 1e-4, "position {}", bone);
            assert!((a.velocities[bone] - b.velocities[bone]).length() < 1e-3, "velocity {}", bone);
            assert!(a.rotations[bone].dot(b.rotations[bone]).abs() > 0.9999, "rotation {}", bone);
            assert!(
                (a.angular_velocities[bone] - b.angular_velocities[bone]).length() < 1e-3,
                "angular velocity {}",
                bone
            );
        }
    }

    #[test]
    fn test_transition_has_no_pop() {
        let source = pose(0.0);
        let mut inertializer = Inertializer::new(4);
        inertializer.reset(source.positions[0], source.rotations[0]);

        let mut output = Pose::new(4);
        inertializer.update(&mut output, &source.view(), 0.1, 0.0);
        assert_pose_close(&output, &source);

        // 连续推进几帧，产生非平凡的根参考系
        for _ in 0..5 {
            inertializer.update(&mut output, &source.view(), 0.1, 1.0 / 60.0);
        }
        let displayed = output.clone();

        let incoming = pose(2.0);
        inertializer.transition(&displayed, &incoming.view());
        inertializer.update(&mut output, &incoming.view(), 0.1, 0.0);
        assert_pose_close(&output, &displayed);
    }

    #[test]
    fn test_offsets_decay_to_input() {
        let mut inertializer = Inertializer::new(4);
        let current = pose(0.0);
        let incoming = pose(1.0);
        inertializer.reset(current.positions[0], current.rotations[0]);
        inertializer.transition(&current, &incoming.view());

        let mut output = current.clone();
        inertializer.update(&mut output, &incoming.view(), 0.1, 3.0);
        for bone in 1..4 {
            assert!((output.positions[bone] - incoming.positions[bone]).length() < 1e-4);
            assert!(output.rotations[bone].dot(incoming.rotations[bone]).abs() > 0.9999);
        }
        // 根骨骼保持显示位置（参考系映射）
        assert!((output.positions[0] - current.positions[0]).length() < 1e-4);
    }

    #[test]
    fn test_root_adjust_moves_displayed_root() {
        let source = pose(0.5);
        let mut inertializer = Inertializer::new(4);
        inertializer.reset(source.positions[0], source.rotations[0]);
        let mut output = source.clone();
        inertializer.transition(&output.clone(), &pose(1.5).view());

        let target_position = output.positions[0] + Vec3::new(0.2, 0.0, -0.1);
        let target_rotation = Quat::from_rotation_y(0.4) * output.rotations[0];
        inertializer.root_adjust(&mut output, target_position, target_rotation);
        assert!((output.positions[0] - target_position).length() < 1e-5);

        // 下一次 dt = 0 的更新从调整后的根继续
        inertializer.update(&mut output, &pose(1.5).view(), 0.1, 0.0);
        assert!((output.positions[0] - target_position).length() < 1e-4);
        assert!(output.rotations[0].dot(target_rotation).abs() > 0.9999);
    }

    #[test]
    fn test_halflife_decay_independent_of_step() {
        // 速度相同，偏移从静止释放
        let still = |seed: f32| {
            let mut still = pose(seed);
            still.velocities.fill(Vec3::ZERO);
            still.angular_velocities.fill(Vec3::ZERO);
            still
        };
        let current = still(0.0);
        let incoming = still(1.0);
        let halflife = 0.2;

        let run = |steps: usize| {
            let mut inertializer = Inertializer::new(4);
            inertializer.reset(current.positions[0], current.rotations[0]);
            inertializer.transition(&current, &incoming.view());
            let mut output = current.clone();
            for _ in 0..steps {
                inertializer.update(&mut output, &incoming.view(), halflife, halflife / steps as f32);
            }
            output
        };
        let single = run(1);
        let split = run(6);
        assert_pose_close(&single, &split);

        for output in [&single, &split] {
            for bone in 1..4 {
                let initial = current.positions[bone] - incoming.positions[bone];
                let remaining = output.positions[bone] - incoming.positions[bone];
                assert!((remaining - initial * 0.5).length() < 1e-3, "position {}", bone);

                let initial_angle = current.rotations[bone].angle_between(incoming.rotations[bone]);
                let remaining_angle = output.rotations[bone].angle_between(incoming.rotations[bone]);
                assert!((remaining_angle - 0.5 * initial_angle).abs() < 1e-3, "rotation {}", bone);
            }

            // 根骨骼留在目标参考系中的切换位置
            assert!((output.positions[0] - current.positions[0]).length() < 1e-4);
            assert!(output.rotations[0].dot(current.rotations[0]).abs() > 0.9999);
        }
    }
}
