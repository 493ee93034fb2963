//! 障碍物碰撞（轴对齐包围盒推出）

use glam::Vec3;

/// 单次移动的最大分段数
pub const MAX_SUBSTEPS: usize = 256;

/// 轴对齐障碍物
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    pub center: Vec3,
    /// 半尺寸
    pub half_extents: Vec3,
}

impl Obstacle {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self { center, half_extents: half_extents.abs() }
    }

    #[inline]
    fn min(&self) -> Vec3 {
        self.center - self.half_extents
    }

    #[inline]
    fn max(&self) -> Vec3 {
        self.center + self.half_extents
    }

    /// 盒内最近点
    #[inline]
    pub fn nearest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min(), self.max())
    }

    /// 水平面内的盒上最近点（保留 `point.y`）
    #[inline]
    pub fn nearest_point_xz(&self, point: Vec3) -> Vec3 {
        let nearest = self.nearest_point(point);
        Vec3::new(nearest.x, point.y, nearest.z)
    }

    /// 在水平面内把点推到距盒子至少 `radius` 的位置，高度不变
    fn push_out(&self, point: Vec3, radius: f32) -> Vec3 {
        let nearest = self.nearest_point_xz(point);
        let offset = point - nearest;
        let distance = offset.length();
        if distance >= radius {
            return point;
        }
        if distance > 1e-6 {
            return nearest + offset * (radius / distance);
        }

        // 点在盒内：沿穿透最浅的水平方向穿出
        let min = self.min();
        let max = self.max();
        let candidates = [
            (point.x - min.x, Vec3::new(min.x - radius, point.y, point.z)),
            (max.x - point.x, Vec3::new(max.x + radius, point.y, point.z)),
            (point.z - min.z, Vec3::new(point.x, point.y, min.z - radius)),
            (max.z - point.z, Vec3::new(point.x, point.y, max.z + radius)),
        ];
        candidates
            .iter()
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map_or(point, |c| c.1)
    }
}

/// 沿 prev -> next 分段移动，每段末端推出所有障碍物
///
/// 分段数 = max(1, ceil(|next - prev| / max_segment))，最多 `MAX_SUBSTEPS` 段。
/// 位移不是有限值时停在 `prev`。
pub fn collide_obstacles(
    prev: Vec3,
    next: Vec3,
    obstacles: &[Obstacle],
    radius: f32,
    max_segment: f32,
) -> Vec3 {
    if obstacles.is_empty() {
        return next;
    }

    let delta = next - prev;
    if !delta.is_finite() {
        log::warn!("[Obstacle] 位移不是有限值，忽略本次移动: {:?} -> {:?}", prev, next);
        return prev;
    }
    let substeps = ((delta.length() / max_segment.max(1e-4)).ceil() as usize).clamp(1, MAX_SUBSTEPS);
    let step = delta / substeps as f32;

    let mut position = prev;
    for _ in 0..substeps {
        position += step;
        for obstacle in obstacles {
            position = obstacle.push_out(position, radius);
        }
    }
    position
}
