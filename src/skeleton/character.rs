//! 角色资源（静止姿态 + 蒙皮绑定数据）
//!
//! 网格变形由宿主完成，这里只负责加载和校验。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use glam::{Quat, Vec2, Vec3};

use crate::binary::{read_array1d, read_array2d, Array2d};
use crate::{MotionError, Result};

/// 角色资源
#[derive(Clone, Debug)]
pub struct Character {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub triangles: Vec<u16>,
    /// 顶点 × 影响数
    pub bone_weights: Array2d<f32>,
    /// 顶点 × 影响数
    pub bone_indices: Array2d<u16>,
    pub bone_rest_positions: Vec<Vec3>,
    pub bone_rest_rotations: Vec<Quat>,
}

impl Character {
    /// 从文件路径加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        Self::load_from_reader(&mut reader)
    }

    /// 从字节切片加载
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = std::io::Cursor::new(bytes);
        Self::load_from_reader(&mut reader)
    }

    /// 从 Reader 加载
    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let character = Self {
            positions: read_array1d(reader, "character positions")?,
            normals: read_array1d(reader, "character normals")?,
            texcoords: read_array1d(reader, "character texcoords")?,
            triangles: read_array1d(reader, "character triangles")?,
            bone_weights: read_array2d(reader, "character bone weights")?,
            bone_indices: read_array2d(reader, "character bone indices")?,
            bone_rest_positions: read_array1d(reader, "character rest positions")?,
            bone_rest_rotations: read_array1d(reader, "character rest rotations")?,
        };
        character.validate()?;

        log::info!(
            "[Character] 加载完成: {} 顶点, {} 三角形, {} 骨骼",
            character.positions.len(),
            character.triangles.len() / 3,
            character.bone_count()
        );
        Ok(character)
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.bone_rest_positions.len()
    }

    fn validate(&self) -> Result<()> {
        let vertex_count = self.positions.len();
        if self.normals.len() != vertex_count {
            return Err(MotionError::shape("character normals", vertex_count, self.normals.len()));
        }
        if self.texcoords.len() != vertex_count {
            return Err(MotionError::shape("character texcoords", vertex_count, self.texcoords.len()));
        }
        if self.triangles.len() % 3 != 0 {
            return Err(MotionError::InvalidData(format!(
                "Triangle index count {} is not a multiple of 3", self.triangles.len()
            )));
        }
        if let Some(&index) = self.triangles.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(MotionError::InvalidData(format!(
                "Triangle index {} out of range ({} vertices)", index, vertex_count
            )));
        }
        if self.bone_weights.rows != vertex_count {
            return Err(MotionError::shape("character bone weights", vertex_count, self.bone_weights.rows));
        }
        if self.bone_indices.rows != self.bone_weights.rows || self.bone_indices.cols != self.bone_weights.cols {
            return Err(MotionError::shape(
                "character bone indices",
                self.bone_weights.data.len(),
                self.bone_indices.data.len(),
            ));
        }
        if self.bone_rest_rotations.len() != self.bone_rest_positions.len() {
            return Err(MotionError::shape(
                "character rest rotations",
                self.bone_rest_positions.len(),
                self.bone_rest_rotations.len(),
            ));
        }
        let bone_count = self.bone_count();
        if let Some(&index) = self.bone_indices.data.iter().find(|&&i| i as usize >= bone_count) {
            return Err(MotionError::InvalidData(format!(
                "Bone index {} out of range ({} bones)", index, bone_count
            )));
        }
        Ok(())
    }

    /// 校验与数据库骨骼数一致
    pub fn check_bone_count(&self, bone_count: usize) -> Result<()> {
        if self.bone_count() != bone_count {
            return Err(MotionError::shape("character bones", bone_count, self.bone_count()));
        }
        Ok(())
    }
}
