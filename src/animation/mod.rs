//! 动作数据库与匹配
//!
//! - Database: 动作数据库（帧、片段、接触标记）
//! - FeatureSet: 归一化匹配特征及缓存
//! - search: 最近邻搜索
//! - Inertializer: 切换时消除跳变的惯性化混合

mod database;
mod features;
mod search;
mod inertializer;

pub use database::Database;
pub use features::{
    FeatureSet, FEATURE_COUNT, POSE_FEATURE_COUNT, TRAJECTORY_DIRECTION_OFFSET,
    TRAJECTORY_FEATURE_SAMPLES, TRAJECTORY_POSITION_OFFSET,
};
pub use search::{SearchParams, SearchResult};
pub use inertializer::Inertializer;
