//! 拍摄计划：由静态配置生成四个变焦组的拍摄请求
//!
//! 组顺序固定（第一级 → 第二级 → 第三级 → 最终级）。重新变焦规则：
//!
//! - 第一级组：不重新变焦（会话准备阶段已经到位）
//! - 第二、三级组：只有组内第一张重新变焦，其余沿用当前位置
//! - 最终级组：每一张都显式重新变焦，防止漂移

use crate::shot::ShotRequest;
use mda_protocol::PropertyCode;
use mda_tools::{ResolvedConfig, ZoomGroup};

/// 计划中的一张拍摄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedShot {
    pub group: ZoomGroup,
    /// 在组内的位置
    pub index_in_group: usize,
    pub request: ShotRequest,
    /// 报告顺序中的位置
    pub order: Option<usize>,
}

/// 整次会话的拍摄计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotPlan {
    first_level: PropertyCode,
    shots: Vec<PlannedShot>,
}

impl ShotPlan {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut shots = Vec::with_capacity(config.shot_count());
        for group in ZoomGroup::SEQUENCE {
            let Some(order) = config.group(group) else {
                continue;
            };
            let level = group.level(&config.zoom);
            for (index, category) in order.categories.iter().enumerate() {
                let zoom_target = match group {
                    ZoomGroup::Z140 => None,
                    ZoomGroup::Z120 | ZoomGroup::Z055 => (index == 0).then_some(level),
                    ZoomGroup::Z110 => Some(level),
                };
                let is_reference =
                    group == ZoomGroup::Z140 && *category == config.reference_category;
                shots.push(PlannedShot {
                    group,
                    index_in_group: index,
                    request: ShotRequest {
                        category: category.clone(),
                        tv_label: config.tv_for(category).to_string(),
                        av_label: config.aperture_label.clone(),
                        iso_label: config.iso_label.clone(),
                        zoom_target,
                        is_reference,
                    },
                    order: config.feature_index(category),
                });
            }
        }
        Self {
            first_level: config.zoom.z140,
            shots,
        }
    }

    /// 会话准备阶段的变焦目标（第一级）
    pub fn first_level(&self) -> PropertyCode {
        self.first_level
    }

    pub fn shots(&self) -> &[PlannedShot] {
        &self.shots
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlannedShot> {
        self.shots.iter()
    }

    /// 第一张是否为参考拍摄
    pub fn starts_with_reference(&self) -> bool {
        self.shots.first().is_some_and(|s| s.request.is_reference)
    }
}
