//! 测试用合成数据

use std::f32::consts::PI;

use glam::{Quat, Vec3};
use nalgebra::{DMatrix, DVector};

use crate::animation::{Database, FeatureSet};
use crate::binary::{write_array1d, write_array2d, Array2d};
use crate::nnet::{decompressor_output_size, Layer, LearnedMotion, Network};
use crate::skeleton::SkeletonRoles;
use crate::animation::FEATURE_COUNT;

/// 合成数据库骨骼父索引（根、髋、左腿 4 节、右腿 4 节）
pub const SYNTHETIC_PARENTS: [i32; 10] = [-1, 0, 1, 2, 3, 4, 1, 6, 7, 8];
/// 每个片段帧数
pub const SYNTHETIC_CLIP_FRAMES: usize = 60;

const FRAME_TIME: f32 = 1.0 / 60.0;

/// 片段参数：(前进速度, 转向角速度, 步频)
const CLIPS: [(f32, f32, f32); 2] = [(1.5, 0.3, 1.3), (3.0, -0.5, 2.1)];

fn leg_offsets(side: f32) -> [Vec3; 4] {
    [
        Vec3::new(0.1 * side, -0.05, 0.0),
        Vec3::new(0.0, -0.45, 0.0),
        Vec3::new(0.0, -0.45, 0.0),
        Vec3::new(0.0, -0.05, 0.12),
    ]
}

/// 两个片段的行走 / 跑步合成数据库（10 骨骼）
pub fn database_bytes() -> Vec<u8> {
    let nbones = SYNTHETIC_PARENTS.len();
    let nframes = SYNTHETIC_CLIP_FRAMES * CLIPS.len();

    let mut positions = Array2d::new(nframes, nbones, Vec3::ZERO);
    let mut velocities = Array2d::new(nframes, nbones, Vec3::ZERO);
    let mut rotations = Array2d::new(nframes, nbones, Quat::IDENTITY);
    let mut angular_velocities = Array2d::new(nframes, nbones, Vec3::ZERO);
    let mut contacts = Array2d::new(nframes, 2, false);
    let mut starts = Vec::new();
    let mut stops = Vec::new();

    for (clip, &(speed, turn_rate, cadence)) in CLIPS.iter().enumerate() {
        let start = clip * SYNTHETIC_CLIP_FRAMES;
        starts.push(start as i32);
        stops.push((start + SYNTHETIC_CLIP_FRAMES) as i32);

        let omega = 2.0 * PI * cadence;
        let mut root_position = Vec3::new(clip as f32 * 5.0, 0.0, 0.0);

        for local in 0..SYNTHETIC_CLIP_FRAMES {
            let frame = start + local;
            let t = local as f32 * FRAME_TIME;
            let phase = omega * t + clip as f32;

            let root_rotation = Quat::from_rotation_y(turn_rate * t + clip as f32);
            let root_velocity = root_rotation * Vec3::new(0.0, 0.0, speed);

            let p = positions.row_mut(frame);
            p[0] = root_position;
            p[1] = Vec3::new(0.0, 0.95 + 0.02 * (2.0 * phase).sin(), 0.0);
            velocities.row_mut(frame)[0] = root_velocity;
            velocities.row_mut(frame)[1] = Vec3::new(0.0, 0.04 * omega * (2.0 * phase).cos(), 0.0);
            rotations.row_mut(frame)[0] = root_rotation;
            angular_velocities.row_mut(frame)[0] = Vec3::new(0.0, turn_rate, 0.0);

            for (side, first) in [(1.0_f32, 2_usize), (-1.0, 6)] {
                let swing = side * phase.sin();
                let offsets = leg_offsets(side);
                for (j, offset) in offsets.iter().enumerate() {
                    positions.row_mut(frame)[first + j] = *offset;
                }

                // 大腿前后摆动，膝盖弯曲
                let hip_angle = 0.4 * swing;
                let knee_angle = 0.25 + 0.2 * (phase + side).cos();
                rotations.row_mut(frame)[first] = Quat::from_rotation_x(hip_angle);
                rotations.row_mut(frame)[first + 1] = Quat::from_rotation_x(knee_angle);
                angular_velocities.row_mut(frame)[first] =
                    Vec3::new(0.4 * side * omega * phase.cos(), 0.0, 0.0);
                angular_velocities.row_mut(frame)[first + 1] =
                    Vec3::new(-0.2 * omega * (phase + side).sin(), 0.0, 0.0);
            }

            let c = contacts.row_mut(frame);
            c[0] = phase.sin() > 0.0;
            c[1] = phase.sin() <= 0.0;

            root_position += root_velocity * FRAME_TIME;
        }
    }

    let mut bytes = Vec::new();
    write_array2d(&mut bytes, &positions).unwrap();
    write_array2d(&mut bytes, &velocities).unwrap();
    write_array2d(&mut bytes, &rotations).unwrap();
    write_array2d(&mut bytes, &angular_velocities).unwrap();
    write_array1d(&mut bytes, &SYNTHETIC_PARENTS).unwrap();
    write_array1d(&mut bytes, &starts).unwrap();
    write_array1d(&mut bytes, &stops).unwrap();
    write_array2d(&mut bytes, &contacts).unwrap();
    bytes
}

pub fn synthetic_database() -> Database {
    Database::load_from_bytes(&database_bytes(), SkeletonRoles::default()).unwrap()
}

pub fn synthetic_database_with_features() -> Database {
    let mut db = synthetic_database();
    let features = FeatureSet::build(&db, [0.75, 1.0, 1.0, 1.0, 1.5], 20);
    db.set_features(features).unwrap();
    db
}

/// 单层全零网络（输出恒为 output_mean = 0）
pub fn zero_network(input: usize, output: usize) -> Network {
    let layers = vec![Layer {
        weights: DMatrix::zeros(input, output),
        bias: DVector::zeros(output),
    }];
    Network::new(vec![0.0; input], vec![1.0; input], vec![0.0; output], vec![1.0; output], layers).unwrap()
}

/// 全零网络组成的学习式运动流
pub fn learned_motion(bone_count: usize, latent: usize) -> LearnedMotion {
    let stream = FEATURE_COUNT + latent;
    LearnedMotion::new(
        zero_network(stream, decompressor_output_size(bone_count)),
        zero_network(stream, stream),
        zero_network(FEATURE_COUNT, stream),
        bone_count,
    )
    .unwrap()
}

/// 初始化测试日志
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
