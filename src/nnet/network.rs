//! 前馈网络
//!
//! 文件格式（小端）：
//! ```text
//! input_mean   array1d<f32>
//! input_std    array1d<f32>
//! output_mean  array1d<f32>
//! output_std   array1d<f32>
//! layer_count  i32
//! layer_count × (weights array2d<f32> [输入 × 输出], bias array1d<f32>)
//! ```

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use nalgebra::{DMatrix, DVector};

use crate::binary::{read_array1d, read_array2d, Array2d};
use crate::{MotionError, Result};

/// 单层：y = Wᵀx + b（W 为 输入 × 输出）
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: DMatrix<f32>,
    pub bias: DVector<f32>,
}

/// 前馈网络（加载后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    input_mean: DVector<f32>,
    input_std: DVector<f32>,
    output_mean: DVector<f32>,
    output_std: DVector<f32>,
    layers: Vec<Layer>,
}

/// 网络求值缓冲（层数 + 1 个激活向量，每帧复用）
#[derive(Debug, Clone)]
pub struct Evaluation {
    layers: Vec<DVector<f32>>,
}

impl Evaluation {
    /// 输入层（求值前写入原始输入）
    #[inline]
    pub fn input_mut(&mut self) -> &mut [f32] {
        self.layers[0].as_mut_slice()
    }

    /// 输出层（求值后为反归一化结果）
    #[inline]
    pub fn output(&self) -> &[f32] {
        self.layers[self.layers.len() - 1].as_slice()
    }
}

impl Network {
    /// 构造并校验各层尺寸
    pub fn new(
        input_mean: Vec<f32>,
        input_std: Vec<f32>,
        output_mean: Vec<f32>,
        output_std: Vec<f32>,
        layers: Vec<Layer>,
    ) -> Result<Self> {
        if layers.is_empty() {
            return Err(MotionError::InvalidData("Network has no layers".to_string()));
        }
        if input_std.len() != input_mean.len() {
            return Err(MotionError::shape("network input std", input_mean.len(), input_std.len()));
        }
        if output_std.len() != output_mean.len() {
            return Err(MotionError::shape("network output std", output_mean.len(), output_std.len()));
        }

        let mut width = input_mean.len();
        for layer in &layers {
            if layer.weights.nrows() != width {
                return Err(MotionError::shape("network layer input", width, layer.weights.nrows()));
            }
            if layer.bias.len() != layer.weights.ncols() {
                return Err(MotionError::shape("network layer bias", layer.weights.ncols(), layer.bias.len()));
            }
            width = layer.weights.ncols();
        }
        if width != output_mean.len() {
            return Err(MotionError::shape("network output", output_mean.len(), width));
        }

        Ok(Self {
            input_mean: DVector::from_vec(input_mean),
            input_std: DVector::from_vec(input_std),
            output_mean: DVector::from_vec(output_mean),
            output_std: DVector::from_vec(output_std),
            layers,
        })
    }

    /// 从文件加载网络
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let network = Self::load_from_reader(&mut reader)?;
        log::info!(
            "[Lmm] 网络加载完成: {} ({} → {}, {} 层)",
            path.display(),
            network.input_size(),
            network.output_size(),
            network.layer_count()
        );
        Ok(network)
    }

    /// 从字节加载
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        Self::load_from_reader(&mut cursor)
    }

    /// 从 Reader 加载
    pub fn load_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let input_mean = read_array1d(reader, "network input mean")?;
        let input_std = read_array1d(reader, "network input std")?;
        let output_mean = read_array1d(reader, "network output mean")?;
        let output_std = read_array1d(reader, "network output std")?;

        let count = reader.read_i32::<LittleEndian>()
            .map_err(|e| MotionError::Parse(format!("Failed to read layer count: {}", e)))?;
        let count = usize::try_from(count)
            .map_err(|_| MotionError::InvalidData(format!("Negative layer count {}", count)))?;

        let mut layers = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            let weights: Array2d<f32> = read_array2d(reader, "network weights")?;
            let bias: Vec<f32> = read_array1d(reader, "network bias")?;
            layers.push(Layer {
                weights: DMatrix::from_row_slice(weights.rows, weights.cols, &weights.data),
                bias: DVector::from_vec(bias),
            });
        }

        Self::new(input_mean, input_std, output_mean, output_std, layers)
    }

    #[inline]
    pub fn input_size(&self) -> usize {
        self.input_mean.len()
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.output_mean.len()
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// 分配与本网络匹配的求值缓冲
    pub fn evaluation(&self) -> Evaluation {
        let mut layers = Vec::with_capacity(self.layers.len() + 1);
        layers.push(DVector::zeros(self.input_size()));
        for layer in &self.layers {
            layers.push(DVector::zeros(layer.weights.ncols()));
        }
        Evaluation { layers }
    }

    /// 求值：归一化 → (线性, ReLU)* → 线性 → 反归一化
    ///
    /// 输入取自 `evaluation.input_mut()`，结果在 `evaluation.output()`。
    pub fn evaluate(&self, evaluation: &mut Evaluation) {
        let input = &mut evaluation.layers[0];
        input.zip_zip_apply(&self.input_mean, &self.input_std, |x, mean, std| {
            *x = (*x - mean) / std;
        });

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let (head, tail) = evaluation.layers.split_at_mut(i + 1);
            let x = &head[i];
            let y = &mut tail[0];
            y.copy_from(&layer.bias);
            y.gemv_tr(1.0, &layer.weights, x, 1.0);

            // 最后一层不做 ReLU
            if i != last {
                y.apply(|v| *v = v.max(0.0));
            }
        }

        let output = &mut evaluation.layers[last + 1];
        output.zip_zip_apply(&self.output_mean, &self.output_std, |y, mean, std| {
            *y = *y * std + mean;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{write_array1d, write_array2d};
    use byteorder::WriteBytesExt;

    fn identity_bytes(size: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        write_array1d(&mut bytes, &vec![0.0_f32; size]).unwrap();
        write_array1d(&mut bytes, &vec![1.0_f32; size]).unwrap();
        write_array1d(&mut bytes, &vec![0.0_f32; size]).unwrap();
        write_array1d(&mut bytes, &vec![1.0_f32; size]).unwrap();
        bytes.write_i32::<LittleEndian>(1).unwrap();

        let mut weights = Array2d::new(size, size, 0.0_f32);
        for i in 0..size {
            weights.data[i * size + i] = 1.0;
        }
        write_array2d(&mut bytes, &weights).unwrap();
        write_array1d(&mut bytes, &vec![0.0_f32; size]).unwrap();
        bytes
    }

    #[test]
    fn test_identity_network() {
        let network = Network::load_from_bytes(&identity_bytes(4)).unwrap();
        let mut evaluation = network.evaluation();
        let input = [1.5, -2.0, 0.25, -0.75];
        evaluation.input_mut().copy_from_slice(&input);
        network.evaluate(&mut evaluation);
        // 单层不做 ReLU，负值保留
        assert_eq!(evaluation.output(), &input);
    }

    #[test]
    fn test_hidden_layer_relu_and_normalization() {
        // 1 → 2 → 1：隐藏层 [x, -x]，输出 h0 + h1 = |x|
        let layers = vec![
            Layer {
                weights: DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
                bias: DVector::zeros(2),
            },
            Layer {
                weights: DMatrix::from_row_slice(2, 1, &[1.0, 1.0]),
                bias: DVector::zeros(1),
            },
        ];
        let network = Network::new(vec![1.0], vec![2.0], vec![10.0], vec![3.0], layers).unwrap();
        let mut evaluation = network.evaluation();

        evaluation.input_mut()[0] = -3.0;
        network.evaluate(&mut evaluation);
        // 归一化 (-3 - 1) / 2 = -2，|−2| = 2，反归一化 2 × 3 + 10 = 16
        assert!((evaluation.output()[0] - 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_mismatched_layers() {
        let layers = vec![Layer {
            weights: DMatrix::zeros(3, 2),
            bias: DVector::zeros(2),
        }];
        let result = Network::new(vec![0.0; 4], vec![1.0; 4], vec![0.0; 2], vec![1.0; 2], layers);
        assert!(matches!(result, Err(MotionError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = identity_bytes(3);
        let result = Network::load_from_bytes(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(MotionError::Parse(_))));
    }
}
