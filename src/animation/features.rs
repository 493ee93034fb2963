//! 匹配特征
//!
//! 每帧 27 维特征（根骨骼局部空间）：
//! - 0..6   左右脚位置
//! - 6..12  左右脚速度
//! - 12..15 髋部速度
//! - 15..21 未来 3 个采样点的轨迹位置（xz）
//! - 21..27 未来 3 个采样点的轨迹方向（xz）
//!
//! 每组特征按 (原值 - 均值) / (平均标准差 / 权重) 归一化。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::{Quat, Vec3};
use rayon::prelude::*;

use crate::binary::{read_array1d, read_array2d, write_array1d, write_array2d, Array2d};
use crate::skeleton::{forward_kinematics, forward_kinematics_velocity};
use crate::{MotionError, Result};

use super::Database;

/// 特征维数
pub const FEATURE_COUNT: usize = 27;
/// 姿态部分维数（脚位置、脚速度、髋速度）
pub const POSE_FEATURE_COUNT: usize = 15;
/// 轨迹位置特征起点
pub const TRAJECTORY_POSITION_OFFSET: usize = 15;
/// 轨迹方向特征起点
pub const TRAJECTORY_DIRECTION_OFFSET: usize = 21;
/// 轨迹未来采样点数
pub const TRAJECTORY_FEATURE_SAMPLES: usize = 3;

/// 归一化分组：(起点, 维数, 权重索引)
const FEATURE_GROUPS: [(usize, usize, usize); 7] = [
    (0, 3, 0),
    (3, 3, 0),
    (6, 3, 1),
    (9, 3, 1),
    (12, 3, 2),
    (15, 6, 3),
    (21, 6, 4),
];

/// 已归一化的特征集
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// 帧 × 27
    pub features: Array2d<f32>,
    pub offset: Vec<f32>,
    pub scale: Vec<f32>,
    /// 构建时使用的权重
    pub weights: [f32; 5],
    /// 构建时使用的轨迹采样间隔（帧）
    pub sample_frames: usize,
    /// 源数据库指纹，见 `database_fingerprint`
    pub fingerprint: [f32; 4],
}

/// 数据库指纹：骨骼数 + 所有帧根骨骼位置之和
///
/// 用于识别由另一份同帧数数据库生成的过期缓存。
pub fn database_fingerprint(db: &Database) -> [f32; 4] {
    let sum = (0..db.nframes()).fold(Vec3::ZERO, |acc, frame| acc + db.frame(frame).positions[0]);
    [db.nbones() as f32, sum.x, sum.y, sum.z]
}

impl FeatureSet {
    /// 从数据库计算特征
    ///
    /// 每帧特征并行计算，然后逐组归一化。
    pub fn build(db: &Database, weights: [f32; 5], sample_frames: usize) -> Self {
        let nframes = db.nframes();
        let mut features = Array2d::new(nframes, FEATURE_COUNT, 0.0_f32);

        features
            .data
            .par_chunks_mut(FEATURE_COUNT)
            .enumerate()
            .for_each(|(frame, row)| compute_raw_features(db, frame, sample_frames, row));

        let mut offset = vec![0.0; FEATURE_COUNT];
        let mut scale = vec![1.0; FEATURE_COUNT];
        for (start, size, weight_index) in FEATURE_GROUPS {
            normalize_group(&mut features, &mut offset, &mut scale, start, size, weights[weight_index]);
        }

        log::info!(
            "[Features] 特征构建完成: {} 帧 × {} 维, 权重 {:?}",
            nframes,
            FEATURE_COUNT,
            weights
        );

        Self {
            features,
            offset,
            scale,
            weights,
            sample_frames,
            fingerprint: database_fingerprint(db),
        }
    }

    /// 缓存是否由同一数据库、同一组参数生成
    pub fn matches(&self, db: &Database, weights: [f32; 5], sample_frames: usize) -> bool {
        self.weights == weights
            && self.sample_frames == sample_frames
            && self.nframes() == db.nframes()
            && self.fingerprint == database_fingerprint(db)
    }

    #[inline]
    pub fn nframes(&self) -> usize {
        self.features.rows
    }

    /// 帧的归一化特征
    #[inline]
    pub fn frame(&self, frame: usize) -> &[f32] {
        self.features.row(frame)
    }

    /// 原值归一化（原地）
    pub fn normalize_in_place(&self, values: &mut [f32]) {
        for ((v, o), s) in values.iter_mut().zip(&self.offset).zip(&self.scale) {
            *v = (*v - o) / s;
        }
    }

    /// 反归一化到原值
    pub fn denormalize_into(&self, normalized: &[f32], out: &mut [f32]) {
        for (((out, v), o), s) in out.iter_mut().zip(normalized).zip(&self.offset).zip(&self.scale) {
            *out = v * s + o;
        }
    }

    /// 组装查询向量（输出为归一化后的 27 维）
    ///
    /// # 参数
    /// - `pose_features`: 当前姿态的归一化特征（至少前 15 维）
    /// - `root_position` / `root_rotation`: 当前显示的根变换
    /// - `future_positions` / `future_rotations`: 轨迹未来 3 个采样点（世界空间）
    pub fn build_query(
        &self,
        query: &mut [f32],
        pose_features: &[f32],
        root_position: Vec3,
        root_rotation: Quat,
        future_positions: &[Vec3],
        future_rotations: &[Quat],
    ) {
        self.denormalize_into(
            &pose_features[..POSE_FEATURE_COUNT],
            &mut query[..POSE_FEATURE_COUNT],
        );

        let inverse_root = root_rotation.inverse();
        for i in 0..TRAJECTORY_FEATURE_SAMPLES {
            let position = inverse_root * (future_positions[i] - root_position);
            query[TRAJECTORY_POSITION_OFFSET + 2 * i] = position.x;
            query[TRAJECTORY_POSITION_OFFSET + 2 * i + 1] = position.z;

            let direction = inverse_root * (future_rotations[i] * Vec3::Z);
            query[TRAJECTORY_DIRECTION_OFFSET + 2 * i] = direction.x;
            query[TRAJECTORY_DIRECTION_OFFSET + 2 * i + 1] = direction.z;
        }

        self.normalize_in_place(query);
    }

    // ========== 缓存 ==========

    /// 从文件加载特征缓存
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::load_from_reader(&mut reader)
    }

    /// 从 Reader 加载特征缓存
    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let weights: Vec<f32> = read_array1d(reader, "feature weights")?;
        let sample_frames: Vec<i32> = read_array1d(reader, "feature sample frames")?;
        let fingerprint: Vec<f32> = read_array1d(reader, "feature fingerprint")?;
        let features: Array2d<f32> = read_array2d(reader, "features")?;
        let offset: Vec<f32> = read_array1d(reader, "feature offset")?;
        let scale: Vec<f32> = read_array1d(reader, "feature scale")?;

        let weights: [f32; 5] = weights
            .as_slice()
            .try_into()
            .map_err(|_| MotionError::shape("feature weights", 5, weights.len()))?;
        let sample_frames = match sample_frames.as_slice() {
            [frames] => usize::try_from(*frames)
                .map_err(|_| MotionError::InvalidData(format!("Negative sample frames {}", frames)))?,
            _ => return Err(MotionError::shape("feature sample frames", 1, sample_frames.len())),
        };
        let fingerprint: [f32; 4] = fingerprint
            .as_slice()
            .try_into()
            .map_err(|_| MotionError::shape("feature fingerprint", 4, fingerprint.len()))?;
        if features.cols != FEATURE_COUNT {
            return Err(MotionError::shape("features", FEATURE_COUNT, features.cols));
        }
        if offset.len() != FEATURE_COUNT {
            return Err(MotionError::shape("feature offset", FEATURE_COUNT, offset.len()));
        }
        if scale.len() != FEATURE_COUNT {
            return Err(MotionError::shape("feature scale", FEATURE_COUNT, scale.len()));
        }

        Ok(Self {
            features,
            offset,
            scale,
            weights,
            sample_frames,
            fingerprint,
        })
    }

    /// 保存特征缓存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.save_to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn save_to_writer<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_array1d(writer, &self.weights)?;
        let sample_frames = i32::try_from(self.sample_frames)
            .map_err(|_| MotionError::InvalidData(format!("Sample frames too large: {}", self.sample_frames)))?;
        write_array1d(writer, &[sample_frames])?;
        write_array1d(writer, &self.fingerprint)?;
        write_array2d(writer, &self.features)?;
        write_array1d(writer, &self.offset)?;
        write_array1d(writer, &self.scale)?;
        Ok(())
    }

    /// 读取缓存；缓存缺失、损坏，或权重、采样间隔、源数据库不同则重新构建并覆盖
    pub fn load_or_build<P: AsRef<Path>>(
        db: &Database,
        path: P,
        weights: [f32; 5],
        sample_frames: usize,
    ) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cached) if cached.matches(db, weights, sample_frames) => {
                log::info!("[Features] 使用特征缓存: {}", path.display());
                return cached;
            }
            Ok(_) => log::warn!("[Features] 特征缓存与数据库或参数不一致，重新构建: {}", path.display()),
            Err(e) => log::info!("[Features] 无可用特征缓存 ({})，重新构建", e),
        }

        let built = Self::build(db, weights, sample_frames);
        if let Err(e) = built.save(path) {
            log::warn!("[Features] 特征缓存写入失败 {}: {}", path.display(), e);
        }
        built
    }
}

// ============================================================================
// 特征计算
// ============================================================================

fn compute_raw_features(db: &Database, frame: usize, sample_frames: usize, row: &mut [f32]) {
    let skeleton = db.skeleton();
    let roles = skeleton.roles();
    let pose = db.frame(frame);
    let root_position = pose.positions[0];
    let inverse_root = pose.rotations[0].inverse();

    let mut write3 = |offset: usize, v: Vec3| {
        row[offset] = v.x;
        row[offset + 1] = v.y;
        row[offset + 2] = v.z;
    };

    let (left_foot, _) = forward_kinematics(&pose, skeleton, roles.left_foot);
    let (right_foot, _) = forward_kinematics(&pose, skeleton, roles.right_foot);
    write3(0, inverse_root * (left_foot - root_position));
    write3(3, inverse_root * (right_foot - root_position));

    let (_, left_velocity, _, _) = forward_kinematics_velocity(&pose, skeleton, roles.left_foot);
    let (_, right_velocity, _, _) = forward_kinematics_velocity(&pose, skeleton, roles.right_foot);
    let (_, hip_velocity, _, _) = forward_kinematics_velocity(&pose, skeleton, roles.hips);
    write3(6, inverse_root * left_velocity);
    write3(9, inverse_root * right_velocity);
    write3(12, inverse_root * hip_velocity);

    for i in 0..TRAJECTORY_FEATURE_SAMPLES {
        let future = db.trajectory_index_clamp(frame, (sample_frames * (i + 1)) as isize);
        let future_pose = db.frame(future);

        let position = inverse_root * (future_pose.positions[0] - root_position);
        row[TRAJECTORY_POSITION_OFFSET + 2 * i] = position.x;
        row[TRAJECTORY_POSITION_OFFSET + 2 * i + 1] = position.z;

        let direction = inverse_root * (future_pose.rotations[0] * Vec3::Z);
        row[TRAJECTORY_DIRECTION_OFFSET + 2 * i] = direction.x;
        row[TRAJECTORY_DIRECTION_OFFSET + 2 * i + 1] = direction.z;
    }
}

fn normalize_group(
    features: &mut Array2d<f32>,
    offset: &mut [f32],
    scale: &mut [f32],
    start: usize,
    size: usize,
    weight: f32,
) {
    let nframes = features.rows as f32;

    // 每维均值
    for j in 0..size {
        let sum: f32 = (0..features.rows).map(|i| *features.get(i, start + j)).sum();
        offset[start + j] = sum / nframes;
    }

    // 每维标准差取平均作为整组标准差
    let mut std = 0.0;
    for j in 0..size {
        let mean = offset[start + j];
        let variance: f32 = (0..features.rows)
            .map(|i| {
                let d = *features.get(i, start + j) - mean;
                d * d
            })
            .sum::<f32>()
            / nframes;
        std += variance.sqrt() / size as f32;
    }

    if std <= 1e-8 {
        log::warn!("[Features] 特征组 {}..{} 方差为 0，使用单位标准差", start, start + size);
        std = 1.0;
    }

    for j in 0..size {
        scale[start + j] = std / weight.max(1e-8);
    }

    for i in 0..features.rows {
        let row = features.row_mut(i);
        for j in start..start + size {
            row[j] = (row[j] - offset[j]) / scale[j];
        }
    }
}
