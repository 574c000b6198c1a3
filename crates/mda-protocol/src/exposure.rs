//! 曝光参数：标签表、标签 ↔ 码值解析、曝光补偿换算
//!
//! # 解析策略
//!
//! 1. 在设备当前公布的取值集合中精确匹配标签（或码值的十进制文本）
//! 2. 匹配失败时，退回静态参考表得到目标码值，再取集合中数值最接近的码值
//! 3. 取值集合为空（设备不提供描述）时返回 `None`，调用方保持当前值不变
//!
//! 解析失败从不是致命错误。

use crate::property::{PropertyCode, PropertyValueSet};

/// 快门速度码值 → 标签
pub const TV_LABELS: &[(PropertyCode, &str)] = &[
    (24, "30\""),
    (27, "25\""),
    (29, "20\""),
    (32, "15\""),
    (35, "13\""),
    (37, "10\""),
    (40, "8\""),
    (43, "6\""),
    (45, "5\""),
    (48, "4\""),
    (51, "3\"2"),
    (53, "2\"5"),
    (56, "2\""),
    (59, "1\"6"),
    (61, "1\"3"),
    (64, "1\""),
    (67, "0\"8"),
    (69, "0\"6"),
    (72, "0\"5"),
    (75, "0\"4"),
    (77, "0\"3"),
    (80, "1/5"),
    (83, "1/6"),
    (85, "1/8"),
    (88, "1/10"),
    (91, "1/20"),
    (93, "1/25"),
    (96, "1/30"),
    (99, "1/40"),
    (101, "1/50"),
    (104, "1/60"),
    (107, "1/80"),
    (109, "1/100"),
    (112, "1/125"),
    (115, "1/160"),
    (117, "1/200"),
    (120, "1/250"),
    (123, "1/320"),
    (125, "1/400"),
    (128, "1/500"),
    (131, "1/640"),
    (133, "1/800"),
    (136, "1/1000"),
    (139, "1/1250"),
    (141, "1/1600"),
    (144, "1/2000"),
];

/// 光圈码值 → 标签
pub const AV_LABELS: &[(PropertyCode, &str)] = &[
    (40, "f/3.5"),
    (43, "f/4.0"),
    (45, "f/4.5"),
    (48, "f/5.0"),
    (51, "f/5.6"),
    (53, "f/7.1"),
    (56, "f/8"),
    (59, "f/9.0"),
    (61, "f/10"),
    (64, "f/11"),
    (67, "f/13"),
];

/// 标签不在参考表中时，快门速度回退的目标码值（1/25）
pub const TV_FALLBACK_CODE: PropertyCode = 93;

/// 标签不在参考表中时，光圈回退的目标码值（f/8）
pub const AV_FALLBACK_CODE: PropertyCode = 56;

/// ISO 自动的码值
pub const ISO_AUTO_CODE: PropertyCode = 0;

/// 标准 ISO 序列，按顺序对齐到设备公布的非零码值
pub const STANDARD_ISO_SERIES: [u32; 16] = [
    100, 125, 160, 200, 250, 320, 400, 500, 640, 800, 1000, 1250, 1600, 2000, 2500, 3200,
];

/// 曝光补偿的最大绝对值（EV）
pub const EC_LIMIT: f64 = 3.0;

/// 匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// 标签精确匹配
    Exact,
    /// 最近值回退
    Nearest,
}

/// 标签解析结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub code: PropertyCode,
    pub kind: MatchKind,
}

impl Resolved {
    pub const fn exact(code: PropertyCode) -> Self {
        Self {
            code,
            kind: MatchKind::Exact,
        }
    }

    pub const fn nearest(code: PropertyCode) -> Self {
        Self {
            code,
            kind: MatchKind::Nearest,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.kind == MatchKind::Exact
    }
}

fn lookup_label(table: &[(PropertyCode, &'static str)], code: PropertyCode) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, l)| *l)
}

fn lookup_code(table: &[(PropertyCode, &'static str)], label: &str) -> Option<PropertyCode> {
    table.iter().find(|(_, l)| *l == label).map(|(c, _)| *c)
}

// ==================== 快门速度 ====================

/// 快门速度码值 → 标签（未知码值显示为 `code=N`）
pub fn tv_label(code: PropertyCode) -> String {
    lookup_label(TV_LABELS, code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("code={code}"))
}

/// 日志中的快门文本：分数形式追加 " s"
pub fn tv_log_text(label: &str) -> String {
    if !label.is_empty() && label.contains('/') && !label.contains('"') {
        format!("{label} s")
    } else {
        label.to_string()
    }
}

/// 将快门速度标签解析为设备码值
pub fn resolve_tv(values: &PropertyValueSet, want: &str) -> Option<Resolved> {
    if values.is_empty() {
        return None;
    }
    let want = want.trim();
    if let Some(code) = values
        .iter()
        .find(|&c| tv_label(c) == want || c.to_string() == want)
    {
        return Some(Resolved::exact(code));
    }
    let target = lookup_code(TV_LABELS, want).unwrap_or(TV_FALLBACK_CODE);
    values.nearest_to(target).map(Resolved::nearest)
}

// ==================== 光圈 ====================

/// 光圈码值 → 标签
pub fn av_label(code: PropertyCode) -> String {
    lookup_label(AV_LABELS, code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("code={code}"))
}

fn normalize_av(label: &str) -> String {
    label.trim().replace(".0", "")
}

/// 将光圈标签解析为设备码值（`f/8` 与 `f/8.0` 视为相同）
pub fn resolve_av(values: &PropertyValueSet, want: &str) -> Option<Resolved> {
    if values.is_empty() {
        return None;
    }
    let want = normalize_av(want);
    if let Some(code) = values.iter().find(|&c| normalize_av(&av_label(c)) == want) {
        return Some(Resolved::exact(code));
    }
    let target = AV_LABELS
        .iter()
        .find(|(_, l)| normalize_av(l) == want)
        .map(|(c, _)| *c)
        .unwrap_or(AV_FALLBACK_CODE);
    values.nearest_to(target).map(Resolved::nearest)
}

// ==================== ISO ====================

/// 设备 ISO 码值与标准 ISO 序列的对应关系
///
/// 设备只公布码值而不公布 ISO 数值，因此按顺序把非零码值对齐到 `STANDARD_ISO_SERIES`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsoSeries {
    pairs: Vec<(PropertyCode, u32)>,
}

impl IsoSeries {
    pub fn from_values(values: &PropertyValueSet) -> Self {
        let pairs = values
            .iter()
            .filter(|&c| c != ISO_AUTO_CODE)
            .zip(STANDARD_ISO_SERIES)
            .collect();
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iso_for(&self, code: PropertyCode) -> Option<u32> {
        self.pairs.iter().find(|(c, _)| *c == code).map(|(_, iso)| *iso)
    }

    pub fn code_for(&self, iso: u32) -> Option<PropertyCode> {
        self.pairs.iter().find(|(_, i)| *i == iso).map(|(c, _)| *c)
    }

    /// 数值上最接近 `iso` 的序列项对应的码值
    pub fn nearest_code(&self, iso: u32) -> Option<PropertyCode> {
        self.pairs
            .iter()
            .min_by_key(|(_, i)| i.abs_diff(iso))
            .map(|(c, _)| *c)
    }
}

/// ISO 码值 → 标签（`Auto`、ISO 数值，或 `code=N`）
pub fn iso_label(values: &PropertyValueSet, code: PropertyCode) -> String {
    if code == ISO_AUTO_CODE {
        return "Auto".to_string();
    }
    IsoSeries::from_values(values)
        .iso_for(code)
        .map(|iso| iso.to_string())
        .unwrap_or_else(|| format!("code={code}"))
}

/// 将 ISO 标签解析为设备码值
///
/// 支持数字标签（可带 `ISO` 前缀）、`Auto` / `0`，以及最近值回退。
pub fn resolve_iso(values: &PropertyValueSet, want: &str) -> Option<Resolved> {
    if values.is_empty() {
        return None;
    }
    let normalized = want.trim().to_lowercase().replace("iso", "");
    let normalized = normalized.trim();
    if normalized == "auto" || normalized == "0" {
        return values
            .contains(ISO_AUTO_CODE)
            .then(|| Resolved::exact(ISO_AUTO_CODE));
    }
    let wanted: u32 = normalized.parse().ok()?;
    let series = IsoSeries::from_values(values);
    if let Some(code) = series.code_for(wanted) {
        return Some(Resolved::exact(code));
    }
    series.nearest_code(wanted).map(Resolved::nearest)
}

// ==================== 曝光补偿 ====================

/// 曝光补偿码值 → EV
///
/// 以码值列表中 0 码的位置为零点，步数按 1/3 档换算（余数 1 → 0.3，余数 2 → 0.7），
/// 结果限制在 ±3.0 EV 并保留一位小数。
///
/// - 列表为空或不含该码值：码值为 0 时返回 `Some(0.0)`，否则 `None`
/// - 列表中没有 0 码：`None`
pub fn exposure_compensation(values: &PropertyValueSet, code: PropertyCode) -> Option<f64> {
    if values.is_empty() || !values.contains(code) {
        return (code == 0).then_some(0.0);
    }
    let zero = values.position(0)? as i64;
    let index = values.position(code)? as i64;
    let steps = index - zero;
    let whole = (steps.abs() / 3) as f64;
    let frac = match steps.abs() % 3 {
        0 => 0.0,
        1 => 0.3,
        _ => 0.7,
    };
    let value = (whole + frac) * if steps >= 0 { 1.0 } else { -1.0 };
    let clamped = value.clamp(-EC_LIMIT, EC_LIMIT);
    Some((clamped * 10.0).round() / 10.0)
}
