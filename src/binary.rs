//! 二进制数组格式
//!
//! 所有资源文件共用同一种编码（小端序）：
//! - 一维数组：`i32` 元素数 + 元素
//! - 二维数组：`i32` 行数 + `i32` 列数 + 行主序元素
//! - 四元数按 w, x, y, z 存储，布尔值占 1 字节

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Quat, Vec2, Vec3};

use crate::{MotionError, Result};

/// 预分配上限，防止损坏文件的计数导致一次性大分配
const MAX_PREALLOC: usize = 1 << 20;

/// 可按固定格式读写的元素
pub trait BinaryElement: Sized {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self>;
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;
}

impl BinaryElement for f32 {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_f32::<LittleEndian>()
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(*self)
    }
}

impl BinaryElement for i32 {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_i32::<LittleEndian>()
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(*self)
    }
}

impl BinaryElement for u16 {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        reader.read_u16::<LittleEndian>()
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(*self)
    }
}

impl BinaryElement for bool {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(reader.read_u8()? != 0)
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(u8::from(*self))
    }
}

impl BinaryElement for Vec2 {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        Ok(Vec2::new(x, y))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)
    }
}

impl BinaryElement for Vec3 {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        Ok(Vec3::new(x, y, z))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.z)
    }
}

impl BinaryElement for Quat {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        // 磁盘顺序 w, x, y, z
        let w = reader.read_f32::<LittleEndian>()?;
        let x = reader.read_f32::<LittleEndian>()?;
        let y = reader.read_f32::<LittleEndian>()?;
        let z = reader.read_f32::<LittleEndian>()?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(self.w)?;
        writer.write_f32::<LittleEndian>(self.x)?;
        writer.write_f32::<LittleEndian>(self.y)?;
        writer.write_f32::<LittleEndian>(self.z)
    }
}

// ============================================================================
// 二维数组
// ============================================================================

/// 行主序二维数组
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Array2d<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Clone> Array2d<T> {
    /// 创建填充数组
    pub fn new(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![fill; rows * cols],
        }
    }
}

impl<T> Array2d<T> {
    /// 从行主序数据构造
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(MotionError::shape("array2d", rows * cols, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.data[row * self.cols + col]
    }
}

// ============================================================================
// 读写
// ============================================================================

fn read_count<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()
        .map_err(|e| MotionError::Parse(format!("Failed to read {} size: {}", what, e)))?;
    usize::try_from(count)
        .map_err(|_| MotionError::InvalidData(format!("Negative size {} for {}", count, what)))
}

fn read_elements<T: BinaryElement, R: Read>(reader: &mut R, count: usize, what: &str) -> Result<Vec<T>> {
    let mut data = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        let value = T::read_from(reader)
            .map_err(|e| MotionError::Parse(format!("Failed to read {}: {}", what, e)))?;
        data.push(value);
    }
    Ok(data)
}

/// 读取一维数组
pub fn read_array1d<T: BinaryElement, R: Read>(reader: &mut R, what: &str) -> Result<Vec<T>> {
    let size = read_count(reader, what)?;
    read_elements(reader, size, what)
}

/// 读取二维数组
pub fn read_array2d<T: BinaryElement, R: Read>(reader: &mut R, what: &str) -> Result<Array2d<T>> {
    let rows = read_count(reader, what)?;
    let cols = read_count(reader, what)?;
    let count = rows.checked_mul(cols)
        .ok_or_else(|| MotionError::InvalidData(format!("Size overflow for {}", what)))?;
    let data = read_elements(reader, count, what)?;
    Ok(Array2d { rows, cols, data })
}

fn write_count<W: Write>(writer: &mut W, count: usize) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| MotionError::InvalidData(format!("Array too large: {}", count)))?;
    writer.write_i32::<LittleEndian>(count)?;
    Ok(())
}

/// 写入一维数组
pub fn write_array1d<T: BinaryElement, W: Write>(writer: &mut W, data: &[T]) -> Result<()> {
    write_count(writer, data.len())?;
    for value in data {
        value.write_to(writer)?;
    }
    Ok(())
}

/// 写入二维数组
pub fn write_array2d<T: BinaryElement, W: Write>(writer: &mut W, array: &Array2d<T>) -> Result<()> {
    write_count(writer, array.rows)?;
    write_count(writer, array.cols)?;
    for value in &array.data {
        value.write_to(writer)?;
    }
    Ok(())
}
