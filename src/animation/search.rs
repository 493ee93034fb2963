//! 特征最近邻搜索

use super::features::FEATURE_COUNT;
use super::Database;

/// 搜索参数
#[derive(Clone, Copy, Debug)]
pub struct SearchParams {
    /// 跳过每个片段末尾的帧数（候选帧的未来采样不能被片段终点截断）
    pub ignore_range_end: usize,
    /// 跳过与当前帧距离小于此值的帧
    pub ignore_surrounding: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            ignore_range_end: 20,
            ignore_surrounding: 20,
        }
    }
}

/// 搜索结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchResult {
    pub index: usize,
    pub cost: f32,
}

impl Database {
    /// 帧与查询的平方欧氏距离（未挂载特征或查询维数不符时为无穷大）
    pub fn frame_cost(&self, query: &[f32], frame: usize) -> f32 {
        match self.features() {
            Some(features) if query.len() == FEATURE_COUNT => {
                squared_distance(query, features.frame(frame), f32::MAX)
            }
            _ => f32::MAX,
        }
    }

    /// 穷举搜索最接近查询的帧
    ///
    /// 逐片段扫描，累加代价超过当前最优时提前结束。
    /// 所有帧都被排除、未挂载特征或查询维数不符时返回 `None`。
    pub fn search(
        &self,
        query: &[f32],
        current: Option<usize>,
        params: &SearchParams,
    ) -> Option<SearchResult> {
        let features = self.features()?;
        if query.len() != FEATURE_COUNT {
            log::warn!("[Search] 查询维数 {} 与特征维数 {} 不符", query.len(), FEATURE_COUNT);
            return None;
        }
        let mut best: Option<SearchResult> = None;

        for clip in self.clips() {
            let end = clip.end.saturating_sub(params.ignore_range_end);
            for index in clip.start..end {
                if let Some(current) = current {
                    if index.abs_diff(current) < params.ignore_surrounding {
                        continue;
                    }
                }

                let limit = best.map_or(f32::MAX, |b| b.cost);
                let cost = squared_distance(query, features.frame(index), limit);
                if cost < limit {
                    best = Some(SearchResult { index, cost });
                }
            }
        }

        best
    }
}

/// 平方距离，超过 `limit` 时提前返回
#[inline]
fn squared_distance(query: &[f32], candidate: &[f32], limit: f32) -> f32 {
    debug_assert_eq!(query.len(), FEATURE_COUNT);
    let mut cost = 0.0;
    for (q, c) in query.iter().zip(candidate).take(FEATURE_COUNT) {
        let d = q - c;
        cost += d * d;
        if cost >= limit {
            break;
        }
    }
    cost
}
