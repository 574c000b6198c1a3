//! 相机属性句柄与取值集合

use std::fmt;

/// 设备属性的原始码
pub type PropertyCode = u32;

/// 相机属性句柄
///
/// 每个会话解析一次，之后不可变。具体的厂商属性 ID 由设备适配器映射。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyId {
    /// 数码变焦位置（DC_Zoom）
    Zoom,
    /// 快门速度（Tv）
    ShutterSpeed,
    /// 光圈（Av）
    Aperture,
    /// ISO 感光度
    IsoSpeed,
    /// 曝光补偿
    ExposureCompensation,
    /// 对焦模式
    AfMode,
    /// 连续自动对焦
    ContinuousAfMode,
    /// 短片伺服自动对焦
    MovieServoAf,
    /// 无法对焦时镜头驱动
    LensDriveWhenAfImpossible,
    /// 自动对焦辅助光
    AfAssist,
    /// 实时取景模式
    EvfMode,
    /// 实时取景输出设备
    EvfOutputDevice,
    /// 图像保存位置
    SaveTo,
}

impl PropertyId {
    /// 与自动对焦相关的四个属性（冻结对焦时全部关闭）
    pub const AUTOFOCUS: [PropertyId; 4] = [
        PropertyId::ContinuousAfMode,
        PropertyId::MovieServoAf,
        PropertyId::LensDriveWhenAfImpossible,
        PropertyId::AfAssist,
    ];

    /// 唤醒通道时重新读取的曝光属性
    pub const EXPOSURE_TOUCH: [PropertyId; 3] = [
        PropertyId::ShutterSpeed,
        PropertyId::Aperture,
        PropertyId::IsoSpeed,
    ];

    /// 属性名（用于日志）
    pub const fn name(self) -> &'static str {
        match self {
            PropertyId::Zoom => "DC_Zoom",
            PropertyId::ShutterSpeed => "Tv",
            PropertyId::Aperture => "Av",
            PropertyId::IsoSpeed => "ISOSpeed",
            PropertyId::ExposureCompensation => "ExposureCompensation",
            PropertyId::AfMode => "AFMode",
            PropertyId::ContinuousAfMode => "ContinuousAFMode",
            PropertyId::MovieServoAf => "MovieServoAF",
            PropertyId::LensDriveWhenAfImpossible => "LensDriveWhenAFImpossible",
            PropertyId::AfAssist => "AFAssist",
            PropertyId::EvfMode => "Evf_Mode",
            PropertyId::EvfOutputDevice => "Evf_OutputDevice",
            PropertyId::SaveTo => "SaveTo",
        }
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 属性的合法取值集合（有序）
///
/// 从设备描述查询得到；设备不提供描述时为空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyValueSet {
    codes: Vec<PropertyCode>,
}

impl PropertyValueSet {
    pub fn new(codes: Vec<PropertyCode>) -> Self {
        Self { codes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn contains(&self, code: PropertyCode) -> bool {
        self.codes.contains(&code)
    }

    /// 码值在集合中的位置
    pub fn position(&self, code: PropertyCode) -> Option<usize> {
        self.codes.iter().position(|&c| c == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = PropertyCode> + '_ {
        self.codes.iter().copied()
    }

    pub fn as_slice(&self) -> &[PropertyCode] {
        &self.codes
    }

    pub fn min(&self) -> Option<PropertyCode> {
        self.codes.iter().copied().min()
    }

    pub fn max(&self) -> Option<PropertyCode> {
        self.codes.iter().copied().max()
    }

    /// 数值上最接近 `target` 的码值（距离相同时取先出现的）
    pub fn nearest_to(&self, target: PropertyCode) -> Option<PropertyCode> {
        self.codes.iter().copied().min_by_key(|c| c.abs_diff(target))
    }
}

impl From<Vec<PropertyCode>> for PropertyValueSet {
    fn from(codes: Vec<PropertyCode>) -> Self {
        Self::new(codes)
    }
}

impl<const N: usize> From<[PropertyCode; N]> for PropertyValueSet {
    fn from(codes: [PropertyCode; N]) -> Self {
        Self::new(codes.to_vec())
    }
}

impl FromIterator<PropertyCode> for PropertyValueSet {
    fn from_iter<I: IntoIterator<Item = PropertyCode>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
