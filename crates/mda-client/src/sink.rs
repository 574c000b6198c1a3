//! 拍摄日志接收端
//!
//! 流水线为每个产出的资产调用一次 [`ShotSink::record`]（设置相同、路径不同），
//! 持久化与最终排序由接收端负责。

use crate::error::{CaptureError, Result};
use crate::shot::ShotResult;
use mda_tools::{JsonlShotLog, ShotRecord};
use std::path::Path;

/// 拍摄日志接收端
pub trait ShotSink {
    /// 记录一个资产；`order` 是类别在报告顺序中的位置
    fn record(&mut self, result: &ShotResult, asset: &Path, order: Option<usize>) -> Result<()>;

    /// 会话结束（排序、刷新）
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 内存接收端（测试和模拟模式）
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ShotRecord>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按报告顺序排列的记录（稳定排序，未知类别在最后）
    pub fn ordered(&self) -> Vec<ShotRecord> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.order.unwrap_or(usize::MAX));
        records
    }
}

impl ShotSink for MemorySink {
    fn record(&mut self, result: &ShotResult, asset: &Path, order: Option<usize>) -> Result<()> {
        self.records.push(result.record_for(asset, order));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

impl ShotSink for JsonlShotLog {
    fn record(&mut self, result: &ShotResult, asset: &Path, order: Option<usize>) -> Result<()> {
        self.append(&result.record_for(asset, order))
            .map_err(CaptureError::Sink)
    }

    /// 按报告顺序重写日志
    fn finish(&mut self) -> Result<()> {
        JsonlShotLog::reorder(self.path())
            .map(|_| ())
            .map_err(CaptureError::Sink)
    }
}

impl<S: ShotSink + ?Sized> ShotSink for &mut S {
    fn record(&mut self, result: &ShotResult, asset: &Path, order: Option<usize>) -> Result<()> {
        (**self).record(result, asset, order)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
