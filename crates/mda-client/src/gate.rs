//! 拍摄闸门：每张拍摄前询问操作员（或自动放行）

use crate::plan::PlannedShot;
use mda_tools::ZoomGroup;

/// 闸门决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// 中止剩余拍摄（清理流程照常执行）
    Abort,
}

/// 拍摄闸门
pub trait ShotGate {
    /// 一个变焦组开始
    fn on_group_start(&mut self, _group: ZoomGroup, _shots: usize) {}

    /// 第 `position`（从 0 开始）张拍摄之前
    fn before_shot(&mut self, shot: &PlannedShot, position: usize, total: usize) -> GateDecision;
}

/// 总是放行
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoProceed;

impl ShotGate for AutoProceed {
    fn before_shot(&mut self, _shot: &PlannedShot, _position: usize, _total: usize) -> GateDecision {
        GateDecision::Proceed
    }
}

impl<F> ShotGate for F
where
    F: FnMut(&PlannedShot, usize, usize) -> GateDecision,
{
    fn before_shot(&mut self, shot: &PlannedShot, position: usize, total: usize) -> GateDecision {
        self(shot, position, total)
    }
}
