//! 启动时加载的资源
//!
//! 数据库、特征缓存、角色与三个网络在启动时一次性加载，
//! 任一失败都直接返回错误，不存在降级模式。

use std::path::PathBuf;

use crate::animation::{Database, FeatureSet};
use crate::config::MotionConfig;
use crate::nnet::LearnedMotion;
use crate::skeleton::{Character, SkeletonRoles};
use crate::{MotionError, Result};

/// 资源路径
#[derive(Clone, Debug, Default)]
pub struct AssetPaths {
    pub database: PathBuf,
    /// 特征缓存（缺失或过期时重新构建并写回）
    pub features: PathBuf,
    pub character: Option<PathBuf>,
    pub decompressor: Option<PathBuf>,
    pub stepper: Option<PathBuf>,
    pub projector: Option<PathBuf>,
}

/// 已加载的资源
#[derive(Debug)]
pub struct ControllerAssets {
    pub database: Database,
    pub character: Option<Character>,
    pub learned: Option<LearnedMotion>,
}

impl ControllerAssets {
    /// 仅数据库（特征未挂载时由控制器构建）
    pub fn from_database(database: Database) -> Self {
        Self {
            database,
            character: None,
            learned: None,
        }
    }

    /// 按路径加载全部资源
    pub fn load(paths: &AssetPaths, roles: SkeletonRoles, config: &MotionConfig) -> Result<Self> {
        let mut database = Database::load_with_roles(&paths.database, roles)?;
        let features = FeatureSet::load_or_build(
            &database,
            &paths.features,
            config.feature_weights(),
            config.trajectory_sample_frames,
        );
        database.set_features(features)?;

        let character = match &paths.character {
            Some(path) => {
                let character = Character::load(path)?;
                character.check_bone_count(database.nbones())?;
                Some(character)
            }
            None => None,
        };

        let learned = match (&paths.decompressor, &paths.stepper, &paths.projector) {
            (Some(decompressor), Some(stepper), Some(projector)) => {
                Some(LearnedMotion::load(decompressor, stepper, projector, database.nbones())?)
            }
            (None, None, None) => None,
            _ => {
                return Err(MotionError::InvalidData(
                    "Decompressor, stepper and projector must be given together".to_string(),
                ))
            }
        };

        Ok(Self {
            database,
            character,
            learned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_network_paths_rejected() {
        let dir = std::env::temp_dir().join(format!("mm_assets_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let database = dir.join("database.bin");
        std::fs::write(&database, crate::test_support::database_bytes()).unwrap();

        let paths = AssetPaths {
            database,
            features: dir.join("features.bin"),
            stepper: Some(dir.join("stepper.bin")),
            ..Default::default()
        };
        let result = ControllerAssets::load(&paths, SkeletonRoles::default(), &MotionConfig::default());
        assert!(matches!(result, Err(MotionError::InvalidData(_))));

        // 特征缓存已写出
        assert!(dir.join("features.bin").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_database() {
        let paths = AssetPaths {
            database: PathBuf::from("/nonexistent/database.bin"),
            ..Default::default()
        };
        let result = ControllerAssets::load(&paths, SkeletonRoles::default(), &MotionConfig::default());
        assert!(matches!(result, Err(MotionError::Io(_))));
    }
}
