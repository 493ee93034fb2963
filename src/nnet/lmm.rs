//! 学习式运动匹配
//!
//! 三个网络替代数据库：
//! - decompressor: (特征, 潜变量) → 完整姿态 + 接触
//! - stepper: (特征, 潜变量) → 下一帧 (特征, 潜变量) 的变化率
//! - projector: 查询 → 最近的可达 (特征, 潜变量)

use std::path::Path;

use glam::{Quat, Vec3};

use crate::animation::FEATURE_COUNT;
use crate::math::{quat_from_scaled_angle_axis, quat_from_xform_xy};
use crate::skeleton::Pose;
use crate::{MotionError, Result};

use super::{Evaluation, Network};

/// 每根非根骨骼的输出维数：位置 3 + 双轴旋转 6 + 速度 3 + 角速度 3
const DECOMPRESSOR_BONE_STRIDE: usize = 15;
/// 根速度 3 + 根角速度 3
const DECOMPRESSOR_ROOT_SIZE: usize = 6;
/// 接触输出数
const DECOMPRESSOR_CONTACT_SIZE: usize = 2;

/// 解压器输出维数
pub fn decompressor_output_size(bone_count: usize) -> usize {
    (bone_count - 1) * DECOMPRESSOR_BONE_STRIDE + DECOMPRESSOR_ROOT_SIZE + DECOMPRESSOR_CONTACT_SIZE
}

#[inline]
fn vec3_at(values: &[f32], offset: usize) -> Vec3 {
    Vec3::new(values[offset], values[offset + 1], values[offset + 2])
}

/// 解压一帧姿态
///
/// 根骨骼由网络输出的局部速度从 `root_position` / `root_rotation` 积分 `dt` 得到。
/// 调用方保证尺寸已校验。
#[allow(clippy::too_many_arguments)]
pub fn decompressor_evaluate(
    pose: &mut Pose,
    contacts: &mut [bool],
    evaluation: &mut Evaluation,
    network: &Network,
    features: &[f32],
    latent: &[f32],
    root_position: Vec3,
    root_rotation: Quat,
    dt: f32,
) {
    {
        let input = evaluation.input_mut();
        input[..features.len()].copy_from_slice(features);
        input[features.len()..].copy_from_slice(latent);
    }
    network.evaluate(evaluation);
    let output = evaluation.output();

    let bones = pose.bone_count() - 1;
    let mut offset = 0;

    for i in 0..bones {
        pose.positions[i + 1] = vec3_at(output, offset + i * 3);
    }
    offset += bones * 3;

    // 双轴表示交错存储：x 轴 (0, 2, 4)，y 轴 (1, 3, 5)
    for i in 0..bones {
        let o = offset + i * 6;
        let x = Vec3::new(output[o], output[o + 2], output[o + 4]);
        let y = Vec3::new(output[o + 1], output[o + 3], output[o + 5]);
        pose.rotations[i + 1] = quat_from_xform_xy(x, y);
    }
    offset += bones * 6;

    for i in 0..bones {
        pose.velocities[i + 1] = vec3_at(output, offset + i * 3);
    }
    offset += bones * 3;

    for i in 0..bones {
        pose.angular_velocities[i + 1] = vec3_at(output, offset + i * 3);
    }
    offset += bones * 3;

    let root_velocity = root_rotation * vec3_at(output, offset);
    let root_angular_velocity = root_rotation * vec3_at(output, offset + 3);
    offset += DECOMPRESSOR_ROOT_SIZE;

    pose.positions[0] = root_position + dt * root_velocity;
    pose.rotations[0] = (quat_from_scaled_angle_axis(root_angular_velocity * dt) * root_rotation).normalize();
    pose.velocities[0] = root_velocity;
    pose.angular_velocities[0] = root_angular_velocity;

    for (i, contact) in contacts.iter_mut().enumerate().take(DECOMPRESSOR_CONTACT_SIZE) {
        *contact = output[offset + i] > 0.5;
    }
}

/// 推进特征与潜变量一帧（网络输出为变化率）
pub fn stepper_evaluate(
    features: &mut [f32],
    latent: &mut [f32],
    evaluation: &mut Evaluation,
    network: &Network,
    dt: f32,
) {
    {
        let input = evaluation.input_mut();
        input[..features.len()].copy_from_slice(features);
        input[features.len()..].copy_from_slice(latent);
    }
    network.evaluate(evaluation);
    let output = evaluation.output();

    for (i, f) in features.iter_mut().enumerate() {
        *f += dt * output[i];
    }
    let nfeatures = features.len();
    for (i, z) in latent.iter_mut().enumerate() {
        *z += dt * output[nfeatures + i];
    }
}

/// 投影结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// 投影结果比当前流好出过渡代价以上
    pub transition: bool,
    /// 查询与投影特征的平方距离
    pub cost: f32,
}

/// 投影查询到网络可达的特征 / 潜变量
#[allow(clippy::too_many_arguments)]
pub fn projector_evaluate(
    projected_features: &mut [f32],
    projected_latent: &mut [f32],
    evaluation: &mut Evaluation,
    network: &Network,
    query: &[f32],
    current_features: &[f32],
    transition_cost: f32,
) -> Projection {
    evaluation.input_mut().copy_from_slice(query);
    network.evaluate(evaluation);
    let output = evaluation.output();

    let nfeatures = projected_features.len();
    projected_features.copy_from_slice(&output[..nfeatures]);
    projected_latent.copy_from_slice(&output[nfeatures..nfeatures + projected_latent.len()]);

    let cost: f32 = query.iter().zip(projected_features.iter()).map(|(q, p)| (q - p) * (q - p)).sum();
    let current_cost: f32 = query.iter().zip(current_features).map(|(q, c)| (q - c) * (q - c)).sum();

    Projection {
        transition: cost + transition_cost < current_cost,
        cost,
    }
}

// ============================================================================
// 学习式运动流
// ============================================================================

/// 三个网络、求值缓冲与当前 / 投影流
#[derive(Debug, Clone)]
pub struct LearnedMotion {
    decompressor: Network,
    stepper: Network,
    projector: Network,
    decompressor_evaluation: Evaluation,
    stepper_evaluation: Evaluation,
    projector_evaluation: Evaluation,
    latent_size: usize,

    pub features_current: Vec<f32>,
    pub latent_current: Vec<f32>,
    pub features_projected: Vec<f32>,
    pub latent_projected: Vec<f32>,
}

impl LearnedMotion {
    /// 组装并校验三个网络的尺寸
    pub fn new(decompressor: Network, stepper: Network, projector: Network, bone_count: usize) -> Result<Self> {
        if bone_count < 2 {
            return Err(MotionError::InvalidData(format!(
                "Learned motion needs at least 2 bones, got {}",
                bone_count
            )));
        }
        if projector.input_size() != FEATURE_COUNT {
            return Err(MotionError::shape("projector input", FEATURE_COUNT, projector.input_size()));
        }
        let latent_size = projector
            .output_size()
            .checked_sub(FEATURE_COUNT)
            .filter(|&size| size > 0)
            .ok_or_else(|| MotionError::shape("projector output", FEATURE_COUNT + 1, projector.output_size()))?;

        let stream_size = FEATURE_COUNT + latent_size;
        if stepper.input_size() != stream_size {
            return Err(MotionError::shape("stepper input", stream_size, stepper.input_size()));
        }
        if stepper.output_size() != stream_size {
            return Err(MotionError::shape("stepper output", stream_size, stepper.output_size()));
        }
        if decompressor.input_size() != stream_size {
            return Err(MotionError::shape("decompressor input", stream_size, decompressor.input_size()));
        }
        let expected = decompressor_output_size(bone_count);
        if decompressor.output_size() != expected {
            return Err(MotionError::shape("decompressor output", expected, decompressor.output_size()));
        }

        log::info!(
            "[Lmm] 学习式运动匹配就绪: {} 骨骼, 潜变量 {} 维",
            bone_count,
            latent_size
        );

        Ok(Self {
            decompressor_evaluation: decompressor.evaluation(),
            stepper_evaluation: stepper.evaluation(),
            projector_evaluation: projector.evaluation(),
            decompressor,
            stepper,
            projector,
            latent_size,
            features_current: vec![0.0; FEATURE_COUNT],
            latent_current: vec![0.0; latent_size],
            features_projected: vec![0.0; FEATURE_COUNT],
            latent_projected: vec![0.0; latent_size],
        })
    }

    /// 从三个网络文件加载
    pub fn load<P: AsRef<Path>>(decompressor: P, stepper: P, projector: P, bone_count: usize) -> Result<Self> {
        Self::new(
            Network::load(decompressor)?,
            Network::load(stepper)?,
            Network::load(projector)?,
            bone_count,
        )
    }

    #[inline]
    pub fn latent_size(&self) -> usize {
        self.latent_size
    }

    /// 以数据库帧特征初始化流，潜变量清零
    pub fn seed(&mut self, features: &[f32]) {
        self.features_current.copy_from_slice(features);
        self.features_projected.copy_from_slice(features);
        self.latent_current.fill(0.0);
        self.latent_projected.fill(0.0);
    }

    /// 投影查询
    pub fn project(&mut self, query: &[f32], transition_cost: f32) -> Projection {
        projector_evaluate(
            &mut self.features_projected,
            &mut self.latent_projected,
            &mut self.projector_evaluation,
            &self.projector,
            query,
            &self.features_current,
            transition_cost,
        )
    }

    /// 解压投影流得到过渡目标姿态
    pub fn decompress_projected(
        &mut self,
        pose: &mut Pose,
        contacts: &mut [bool],
        root_position: Vec3,
        root_rotation: Quat,
        dt: f32,
    ) {
        decompressor_evaluate(
            pose,
            contacts,
            &mut self.decompressor_evaluation,
            &self.decompressor,
            &self.features_projected,
            &self.latent_projected,
            root_position,
            root_rotation,
            dt,
        );
    }

    /// 接受投影：当前流跳到投影流
    pub fn accept_projection(&mut self) {
        self.features_current.copy_from_slice(&self.features_projected);
        self.latent_current.copy_from_slice(&self.latent_projected);
    }

    /// 推进一帧并解压到 `pose`（根骨骼从 `pose` 当前根积分）
    pub fn step(&mut self, pose: &mut Pose, contacts: &mut [bool], dt: f32) {
        stepper_evaluate(
            &mut self.features_current,
            &mut self.latent_current,
            &mut self.stepper_evaluation,
            &self.stepper,
            dt,
        );
        let root_position = pose.root_position();
        let root_rotation = pose.root_rotation();
        decompressor_evaluate(
            pose,
            contacts,
            &mut self.decompressor_evaluation,
            &self.decompressor,
            &self.features_current,
            &self.latent_current,
            root_position,
            root_rotation,
            dt,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{learned_motion, zero_network};

    #[test]
    fn test_validates_sizes() {
        let bones = 4;
        let latent = 8;
        let stream = FEATURE_COUNT + latent;
        let ok = LearnedMotion::new(
            zero_network(stream, decompressor_output_size(bones)),
            zero_network(stream, stream),
            zero_network(FEATURE_COUNT, stream),
            bones,
        );
        assert_eq!(ok.unwrap().latent_size(), latent);

        let bad = LearnedMotion::new(
            zero_network(stream, decompressor_output_size(bones) + 1),
            zero_network(stream, stream),
            zero_network(FEATURE_COUNT, stream),
            bones,
        );
        assert!(matches!(bad, Err(MotionError::ShapeMismatch { what: "decompressor output", .. })));

        let bad = LearnedMotion::new(
            zero_network(stream, decompressor_output_size(bones)),
            zero_network(stream, stream),
            zero_network(FEATURE_COUNT, FEATURE_COUNT),
            bones,
        );
        assert!(matches!(bad, Err(MotionError::ShapeMismatch { what: "projector output", .. })));
    }

    #[test]
    fn test_zero_decompressor_integrates_root() {
        let mut lmm = learned_motion(4, 8);
        let mut pose = Pose::new(4);
        pose.positions[0] = Vec3::new(1.0, 0.0, 2.0);
        let mut contacts = [true, true];

        lmm.step(&mut pose, &mut contacts, 1.0 / 60.0);

        // 零输出：根速度为零，根保持不动；双轴退化为单位旋转；接触为 false
        assert_eq!(pose.positions[0], Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(pose.rotations[1], Quat::IDENTITY);
        assert_eq!(contacts, [false, false]);
    }

    #[test]
    fn test_projection_transition_threshold() {
        let mut lmm = learned_motion(4, 8);
        // 投影输出恒为零；当前流离查询较远
        lmm.features_current.fill(2.0);
        let query = vec![0.5_f32; FEATURE_COUNT];

        let projection = lmm.project(&query, 0.0);
        assert!(projection.transition);
        assert!((projection.cost - 0.25 * FEATURE_COUNT as f32).abs() < 1e-4);

        // 过渡代价足够大时不切换
        let projection = lmm.project(&query, 100.0);
        assert!(!projection.transition);

        lmm.accept_projection();
        assert!(lmm.features_current.iter().all(|&f| f == 0.0));
    }
}
