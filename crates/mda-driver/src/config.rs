//! 驱动时序配置
//!
//! 所有时长以毫秒存储，可以从配置文件反序列化；缺省字段取默认值。
//! 默认值是针对真实机身反复调出来的经验值。

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 驱动时序配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    // ==================== 保活泵 ====================
    /// 保活泵 tick（毫秒）
    pub pump_tick_ms: u64,
    /// 唤醒：ping 后的等待
    pub wake_ping_ms: u64,
    /// 唤醒：每次属性触碰后的等待
    pub wake_touch_ms: u64,

    // ==================== 实时取景 ====================
    pub evf_mode_settle_ms: u64,
    pub evf_output_settle_ms: u64,
    /// 取景重置：唤醒后的等待
    pub lv_reset_wake_ms: u64,
    /// 取景重置：输出关闭后的等待
    pub lv_output_off_ms: u64,
    /// 取景重置：输出恢复到 PC 后的等待
    pub lv_output_on_ms: u64,
    /// 取景重置：最后的稳定等待
    pub lv_reset_settle_ms: u64,

    // ==================== 写入校验 ====================
    /// 写入后、回读前的等待：`verify_settle_ms + attempt * verify_settle_growth_ms`
    pub verify_settle_ms: u64,
    pub verify_settle_growth_ms: u64,
    /// 校验失败后、下一次写入前的等待：`verify_retry_ms + attempt * verify_retry_growth_ms`
    pub verify_retry_ms: u64,
    pub verify_retry_growth_ms: u64,
    /// 变焦写入校验的最大尝试次数
    pub zoom_verify_attempts: u32,
    /// 快门/光圈/ISO 写入校验的最大尝试次数
    pub scalar_verify_attempts: u32,

    // ==================== 变焦斜坡 ====================
    pub zoom_ramp_step: u32,
    /// 斜坡开始前（唤醒后）的等待
    pub zoom_prepare_ms: u64,
    /// 每一步之间的等待
    pub zoom_step_pause_ms: u64,
    /// 斜坡结束后的标准稳定等待
    pub post_zoom_settle_ms: u64,
    /// 恢复后重试前的等待
    pub ramp_recovery_pause_ms: u64,

    // ==================== 快门与对焦 ====================
    /// 半按前（唤醒后）的等待
    pub half_press_prepare_ms: u64,
    /// 半按后等待对焦完成
    pub half_press_wait_ms: u64,
    /// 全按前的保活等待
    pub pre_capture_ms: u64,
    /// 全按保持时长
    pub capture_hold_ms: u64,
    /// 拍摄后等待资产落盘
    pub post_shot_wait_ms: u64,
    /// 每个对焦属性写入后的等待
    pub af_property_settle_ms: u64,
    /// 取景对焦脉冲时长
    pub af_pulse_ms: u64,

    // ==================== 重试策略 ====================
    pub default_retry: RetryPolicy,
    pub half_press_retry: RetryPolicy,
    pub capture_retry: RetryPolicy,
    /// 额外的 busy 文本标记（新固件的不同措辞）
    pub extra_busy_markers: Vec<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pump_tick_ms: 50,
            wake_ping_ms: 150,
            wake_touch_ms: 100,
            evf_mode_settle_ms: 180,
            evf_output_settle_ms: 220,
            lv_reset_wake_ms: 200,
            lv_output_off_ms: 450,
            lv_output_on_ms: 1000,
            lv_reset_settle_ms: 300,
            verify_settle_ms: 240,
            verify_settle_growth_ms: 120,
            verify_retry_ms: 280,
            verify_retry_growth_ms: 140,
            zoom_verify_attempts: 12,
            scalar_verify_attempts: 3,
            zoom_ramp_step: 3,
            zoom_prepare_ms: 250,
            zoom_step_pause_ms: 80,
            post_zoom_settle_ms: 700,
            ramp_recovery_pause_ms: 350,
            half_press_prepare_ms: 250,
            half_press_wait_ms: 1100,
            pre_capture_ms: 250,
            capture_hold_ms: 500,
            post_shot_wait_ms: 2500,
            af_property_settle_ms: 150,
            af_pulse_ms: 500,
            default_retry: RetryPolicy::standard(),
            half_press_retry: RetryPolicy::half_press(),
            capture_retry: RetryPolicy::capture(),
            extra_busy_markers: Vec::new(),
        }
    }
}

/// 毫秒 → `Duration`
pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl DriverConfig {
    pub fn pump_tick(&self) -> Duration {
        ms(self.pump_tick_ms.max(1))
    }

    /// 第 `attempt` 次写入后、回读前的等待
    pub fn verify_settle(&self, attempt: u32) -> Duration {
        ms(self.verify_settle_ms + self.verify_settle_growth_ms * attempt as u64)
    }

    /// 第 `attempt` 次校验失败后的等待
    pub fn verify_retry(&self, attempt: u32) -> Duration {
        ms(self.verify_retry_ms + self.verify_retry_growth_ms * attempt as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_config_default() {
        let config = DriverConfig::default();
        assert_eq!(config.pump_tick(), Duration::from_millis(50));
        assert_eq!(config.zoom_verify_attempts, 12);
        assert_eq!(config.zoom_ramp_step, 3);
        assert_eq!(config.post_zoom_settle_ms, 700);
        assert_eq!(config.capture_retry, RetryPolicy::capture());
    }

    #[test]
    fn test_verify_waits_grow() {
        let config = DriverConfig::default();
        assert_eq!(config.verify_settle(0), Duration::from_millis(240));
        assert_eq!(config.verify_settle(2), Duration::from_millis(480));
        assert_eq!(config.verify_retry(1), Duration::from_millis(420));
        assert!(config.verify_retry(3) > config.verify_settle(3));
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: DriverConfig =
            serde_json::from_str(r#"{"pump_tick_ms": 20, "capture_retry": {"max_attempts": 3}}"#)
                .unwrap();
        assert_eq!(config.pump_tick_ms, 20);
        assert_eq!(config.capture_retry.max_attempts, 3);
        // 嵌套结构缺省字段取 RetryPolicy::default()
        assert_eq!(config.capture_retry.base_delay_ms, 300);
        assert_eq!(config.half_press_wait_ms, 1100);
    }

    #[test]
    fn test_zero_tick_is_clamped() {
        let config = DriverConfig {
            pump_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.pump_tick(), Duration::from_millis(1));
    }
}
