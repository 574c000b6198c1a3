//! 变焦范围推导与斜坡步进规划

use crate::ProtocolError;
use crate::property::{PropertyCode, PropertyValueSet};

/// 设备不提供变焦描述时的默认位置数
pub const DEFAULT_ZOOM_TOTAL: u32 = 201;

/// 默认斜坡步长
pub const DEFAULT_RAMP_STEP: u32 = 3;

/// 变焦范围（0..=max_step）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    /// 可用位置数
    pub total: u32,
    /// 最大步进位置
    pub max_step: u32,
}

impl ZoomRange {
    pub fn new(min: u32, max: u32) -> Result<Self, ProtocolError> {
        if min > max {
            return Err(ProtocolError::InvalidRange { min, max });
        }
        Ok(Self {
            total: max - min + 1,
            max_step: max,
        })
    }

    /// 从设备描述推导范围
    ///
    /// 描述有两种形式：
    /// - 只有一个值 `n`：表示位置数，范围为 `0..=n-1`
    /// - 值列表：范围为 `min..=max`
    ///
    /// 描述为空时使用默认范围 `0..=200`。
    pub fn from_values(values: &PropertyValueSet) -> Self {
        match values.as_slice() {
            [] => Self::default(),
            [count] => Self {
                total: *count,
                max_step: count.saturating_sub(1),
            },
            _ => {
                let (min, max) = match (values.min(), values.max()) {
                    (Some(min), Some(max)) => (min, max),
                    _ => return Self::default(),
                };
                Self {
                    total: max - min + 1,
                    max_step: max,
                }
            },
        }
    }

    /// 把目标位置限制在设备可达范围内
    pub fn clamp_target(&self, target: u32) -> u32 {
        target.min(self.max_step)
    }

    pub fn contains(&self, position: u32) -> bool {
        position <= self.max_step
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self {
            total: DEFAULT_ZOOM_TOTAL,
            max_step: DEFAULT_ZOOM_TOTAL - 1,
        }
    }
}

/// 下一个中间步：向目标移动 `min(step, 剩余距离)`
pub fn next_step(current: PropertyCode, target: PropertyCode, step: u32) -> PropertyCode {
    let step = step.max(1);
    if current < target {
        current + step.min(target - current)
    } else if current > target {
        current - step.min(current - target)
    } else {
        current
    }
}

/// 从 `current` 到 `target` 的全部中间步（不含起点，含终点）
///
/// 序列严格单调，长度为 `ceil(|target - current| / step)`。
pub fn plan_ramp(current: PropertyCode, target: PropertyCode, step: u32) -> Vec<PropertyCode> {
    let mut steps = Vec::new();
    let mut position = current;
    while position != target {
        position = next_step(position, target, step);
        steps.push(position);
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_range_from_empty_description() {
        let range = ZoomRange::from_values(&PropertyValueSet::empty());
        assert_eq!(range.total, 201);
        assert_eq!(range.max_step, 200);
    }

    #[test]
    fn test_range_from_count() {
        let range = ZoomRange::from_values(&PropertyValueSet::from([101]));
        assert_eq!(range.total, 101);
        assert_eq!(range.max_step, 100);
        assert_eq!(range.clamp_target(140), 100);
        assert_eq!(range.clamp_target(55), 55);
    }

    #[test]
    fn test_range_from_value_list() {
        let range = ZoomRange::from_values(&PropertyValueSet::from([0, 50, 150]));
        assert_eq!(range.total, 151);
        assert_eq!(range.max_step, 150);
        assert!(range.contains(150));
        assert!(!range.contains(151));
    }

    #[test]
    fn test_range_new_rejects_inverted() {
        assert!(ZoomRange::new(10, 5).is_err());
        assert_eq!(ZoomRange::new(0, 200).unwrap(), ZoomRange::default());
    }

    #[test]
    fn test_plan_ramp_up_and_down() {
        assert_eq!(plan_ramp(100, 110, 3), vec![103, 106, 109, 110]);
        assert_eq!(plan_ramp(10, 4, 3), vec![7, 4]);
        assert!(plan_ramp(55, 55, 3).is_empty());
    }

    #[test]
    fn test_next_step_zero_step_still_moves() {
        assert_eq!(next_step(0, 5, 0), 1);
    }

    proptest! {
        #[test]
        fn prop_ramp_step_count(current in 0u32..=200, target in 0u32..=200, step in 1u32..10) {
            let plan = plan_ramp(current, target, step);
            let distance = current.abs_diff(target);
            prop_assert_eq!(plan.len() as u32, distance.div_ceil(step));
            if let Some(last) = plan.last() {
                prop_assert_eq!(*last, target);
            }
            // 单调且每步不超过 step
            let mut prev = current;
            for &p in &plan {
                prop_assert!(p.abs_diff(prev) <= step);
                prop_assert!(p.abs_diff(target) < prev.abs_diff(target));
                prev = p;
            }
        }
    }
}
