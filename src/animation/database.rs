//! 动作数据库加载器
//!
//! 文件布局（小端序，见 binary 模块）：
//! 位置、速度、旋转、角速度（帧 × 骨骼二维数组），父索引，
//! 片段起点、片段终点（不含），接触标记（帧 × 接触骨骼）。

use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Range;
use std::path::Path;

use glam::{Quat, Vec3};

use crate::binary::{read_array1d, read_array2d, Array2d};
use crate::skeleton::{Pose, PoseView, Skeleton, SkeletonRoles};
use crate::{MotionError, Result};

use super::features::FeatureSet;

/// 动作数据库（加载后只读，特征只挂载一次）
#[derive(Debug, Clone)]
pub struct Database {
    pub bone_positions: Array2d<Vec3>,
    pub bone_velocities: Array2d<Vec3>,
    pub bone_rotations: Array2d<Quat>,
    pub bone_angular_velocities: Array2d<Vec3>,
    /// 帧 × 接触骨骼
    pub contact_states: Array2d<bool>,
    skeleton: Skeleton,
    clips: Vec<Range<usize>>,
    features: Option<FeatureSet>,
}

impl Database {
    /// 从文件路径加载（默认骨骼角色）
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with_roles(path, SkeletonRoles::default())
    }

    /// 从文件路径加载
    pub fn load_with_roles<P: AsRef<Path>>(path: P, roles: SkeletonRoles) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::load_from_reader(&mut reader, roles)
    }

    /// 从字节切片加载
    pub fn load_from_bytes(bytes: &[u8], roles: SkeletonRoles) -> Result<Self> {
        let mut reader = std::io::Cursor::new(bytes);
        Self::load_from_reader(&mut reader, roles)
    }

    /// 从 Reader 加载
    pub fn load_from_reader<R: Read>(reader: &mut R, roles: SkeletonRoles) -> Result<Self> {
        let bone_positions: Array2d<Vec3> = read_array2d(reader, "bone positions")?;
        let bone_velocities: Array2d<Vec3> = read_array2d(reader, "bone velocities")?;
        let bone_rotations: Array2d<Quat> = read_array2d(reader, "bone rotations")?;
        let bone_angular_velocities: Array2d<Vec3> = read_array2d(reader, "bone angular velocities")?;
        let parents: Vec<i32> = read_array1d(reader, "bone parents")?;
        let range_starts: Vec<i32> = read_array1d(reader, "range starts")?;
        let range_stops: Vec<i32> = read_array1d(reader, "range stops")?;
        let contact_states: Array2d<bool> = read_array2d(reader, "contact states")?;

        let nframes = bone_positions.rows;
        let nbones = bone_positions.cols;
        if nframes == 0 || nbones == 0 {
            return Err(MotionError::InvalidData("Database is empty".to_string()));
        }

        for (what, rows, cols) in [
            ("bone velocities", bone_velocities.rows, bone_velocities.cols),
            ("bone rotations", bone_rotations.rows, bone_rotations.cols),
            ("bone angular velocities", bone_angular_velocities.rows, bone_angular_velocities.cols),
        ] {
            if rows != nframes {
                return Err(MotionError::shape(what, nframes, rows));
            }
            if cols != nbones {
                return Err(MotionError::shape(what, nbones, cols));
            }
        }
        if parents.len() != nbones {
            return Err(MotionError::shape("bone parents", nbones, parents.len()));
        }
        if contact_states.rows != nframes {
            return Err(MotionError::shape("contact states", nframes, contact_states.rows));
        }
        if contact_states.cols != 2 {
            return Err(MotionError::shape("contact bones", 2, contact_states.cols));
        }

        let clips = Self::parse_clips(&range_starts, &range_stops, nframes)?;
        let skeleton = Skeleton::new(parents, roles)?;

        log::info!(
            "[MotionDb] 加载完成: {} 帧, {} 骨骼, {} 片段",
            nframes,
            nbones,
            clips.len()
        );

        Ok(Self {
            bone_positions,
            bone_velocities,
            bone_rotations,
            bone_angular_velocities,
            contact_states,
            skeleton,
            clips,
            features: None,
        })
    }

    fn parse_clips(starts: &[i32], stops: &[i32], nframes: usize) -> Result<Vec<Range<usize>>> {
        if starts.len() != stops.len() {
            return Err(MotionError::shape("range stops", starts.len(), stops.len()));
        }
        if starts.is_empty() {
            return Err(MotionError::InvalidData("Database has no clips".to_string()));
        }

        let mut clips: Vec<Range<usize>> = Vec::with_capacity(starts.len());
        for (&start, &stop) in starts.iter().zip(stops) {
            if start < 0 || stop <= start || stop as usize > nframes {
                return Err(MotionError::InvalidData(format!(
                    "Invalid clip range {}..{} ({} frames)", start, stop, nframes
                )));
            }
            let range = start as usize..stop as usize;
            if let Some(previous) = clips.last() {
                if range.start < previous.end {
                    return Err(MotionError::InvalidData(format!(
                        "Clip {:?} overlaps or precedes {:?}", range, previous
                    )));
                }
            }
            clips.push(range);
        }
        Ok(clips)
    }

    // ========== 基本信息 ==========

    #[inline]
    pub fn nframes(&self) -> usize {
        self.bone_positions.rows
    }

    #[inline]
    pub fn nbones(&self) -> usize {
        self.bone_positions.cols
    }

    #[inline]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[inline]
    pub fn clips(&self) -> &[Range<usize>] {
        &self.clips
    }

    /// 帧所在片段
    pub fn clip_of(&self, frame: usize) -> Option<Range<usize>> {
        self.clips.iter().find(|clip| clip.contains(&frame)).cloned()
    }

    /// 帧是否为片段最后一帧
    pub fn is_clip_end(&self, frame: usize) -> bool {
        self.clip_of(frame).map_or(true, |clip| frame + 1 >= clip.end)
    }

    /// 帧索引加偏移，钳制到所在片段 `[start, stop - 1]`
    ///
    /// 不属于任何片段的帧原样返回。
    pub fn trajectory_index_clamp(&self, frame: usize, delta: isize) -> usize {
        match self.clip_of(frame) {
            Some(clip) => {
                let target = frame as isize + delta;
                target.clamp(clip.start as isize, clip.end as isize - 1) as usize
            }
            None => frame,
        }
    }

    // ========== 帧数据 ==========

    /// 帧的借用视图
    pub fn frame(&self, frame: usize) -> PoseView<'_> {
        PoseView {
            positions: self.bone_positions.row(frame),
            velocities: self.bone_velocities.row(frame),
            rotations: self.bone_rotations.row(frame),
            angular_velocities: self.bone_angular_velocities.row(frame),
        }
    }

    /// 拷贝帧姿态与接触标记
    pub fn copy_frame_into(&self, frame: usize, pose: &mut Pose, contacts: &mut [bool]) {
        pose.copy_from_view(&self.frame(frame));
        contacts.copy_from_slice(self.contact_states.row(frame));
    }

    #[inline]
    pub fn contacts(&self, frame: usize) -> &[bool] {
        self.contact_states.row(frame)
    }

    // ========== 特征 ==========

    /// 挂载特征（行数必须与帧数一致）
    pub fn set_features(&mut self, features: FeatureSet) -> Result<()> {
        if features.nframes() != self.nframes() {
            return Err(MotionError::shape("features", self.nframes(), features.nframes()));
        }
        self.features = Some(features);
        Ok(())
    }

    #[inline]
    pub fn features(&self) -> Option<&FeatureSet> {
        self.features.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{database_bytes, synthetic_database};

    #[test]
    fn test_load_synthetic() {
        let db = synthetic_database();
        assert_eq!(db.nbones(), 10);
        assert_eq!(db.clips().len(), 2);
        assert_eq!(db.nframes(), db.clips()[1].end);
        assert_eq!(db.skeleton().parent_id(5), Some(4));
    }

    #[test]
    fn test_index_clamp() {
        let db = synthetic_database();
        let first = db.clips()[0].clone();
        let second = db.clips()[1].clone();

        assert_eq!(db.trajectory_index_clamp(first.start + 3, 20), first.start + 23);
        // 不越过片段终点
        assert_eq!(db.trajectory_index_clamp(first.end - 5, 20), first.end - 1);
        assert_eq!(db.trajectory_index_clamp(first.end - 1, 1), first.end - 1);
        // 不越过片段起点
        assert_eq!(db.trajectory_index_clamp(second.start + 2, -10), second.start);
        assert!(db.is_clip_end(first.end - 1));
        assert!(!db.is_clip_end(first.end - 2));
    }

    #[test]
    fn test_truncated_file_fails() {
        let mut bytes = database_bytes();
        bytes.truncate(bytes.len() / 2);
        assert!(Database::load_from_bytes(&bytes, SkeletonRoles::default()).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let result = Database::load("/nonexistent/database.bin");
        assert!(matches!(result, Err(MotionError::Io(_))));
    }
}
