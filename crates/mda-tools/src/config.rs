//! # 捕获配置
//!
//! 会话开始前加载一次的静态配置：项目信息、曝光默认值、变焦级别、类别标签、
//! 四个变焦组的拍摄顺序和按类别覆盖的快门速度。
//!
//! 文件布局沿用现场使用的 JSON 格式（键名保持大写），也接受同样结构的 TOML。
//! 文件不存在时使用默认值并给出警告；文件损坏是错误。

use chrono::{DateTime, Local};
use mda_protocol::exposure::{AV_LABELS, TV_LABELS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Malformed JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// 变焦级别不是整数
    #[error("Zoom level {key} is not a number: {value:?}")]
    InvalidZoom { key: &'static str, value: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 按扩展名读取配置文档（`.toml` / `.json`）
///
/// 文件不存在时返回 `T::default()` 并记录警告。
pub fn load_document<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!("Config file '{}' not found. Using defaults.", path.display());
        return Ok(T::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let document = match ext.as_str() {
        "toml" => toml::from_str(&content)?,
        "json" | "" => serde_json::from_str(&content)?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
    };
    info!("Loaded configuration from {}", path.display());
    Ok(document)
}

// ==================== 文件布局 ====================

/// 捕获配置（文件布局）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub project: ProjectConfig,
    pub camera: CameraSettings,
    /// 日志头部元数据（零件号、描述、序列号……）
    #[serde(alias = "header")]
    pub excel_header: BTreeMap<String, String>,
    /// 类别键 → 显示标签
    pub categories: BTreeMap<String, String>,
    pub orders: OrderConfig,
    /// 类别键（或标签）→ 快门速度标签
    pub tv_map: BTreeMap<String, String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(REFERENCE_KEY.to_string(), DEFAULT_REFERENCE_LABEL.to_string());
        Self {
            project: ProjectConfig::default(),
            camera: CameraSettings::default(),
            excel_header: BTreeMap::new(),
            categories,
            orders: OrderConfig {
                order_z140: vec![REFERENCE_KEY.to_string()],
                ..Default::default()
            },
            tv_map: BTreeMap::new(),
        }
    }
}

/// 参考贴纸类别的键
pub const REFERENCE_KEY: &str = "CAT_REF";
const DEFAULT_REFERENCE_LABEL: &str = "reference focus sticker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    #[serde(rename = "PROJECT_ID")]
    pub project_id: String,
    #[serde(rename = "DEVICE_CODE")]
    pub device_code: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            project_id: "MDA12345".to_string(),
            device_code: "DC123".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    #[serde(rename = "AV_LABEL")]
    pub av_label: String,
    #[serde(rename = "ISO_LABEL")]
    pub iso_label: String,
    /// 参考快门速度（`tv_map` 中没有的类别使用它）
    #[serde(rename = "TV_REF_LABEL")]
    pub tv_ref_label: String,
    /// 操作员提示前的等待（秒）
    #[serde(rename = "DELAY_S")]
    pub delay_s: f64,
    /// 拍摄后等待资产落盘（秒）
    #[serde(rename = "POST_SHOT_WAIT")]
    pub post_shot_wait: f64,
    #[serde(rename = "THUMBNAIL_WIDTH_PX")]
    pub thumbnail_width_px: u32,
    #[serde(rename = "ZOOM_STEPS")]
    pub zoom_steps: ZoomSteps,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            av_label: "f/8".to_string(),
            iso_label: "100".to_string(),
            tv_ref_label: "1/60".to_string(),
            delay_s: 3.0,
            post_shot_wait: 2.5,
            thumbnail_width_px: 180,
            zoom_steps: ZoomSteps::default(),
        }
    }
}

/// 变焦级别（文件中是字符串）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomSteps {
    #[serde(rename = "ZOOM_140_STR")]
    pub zoom_140: String,
    #[serde(rename = "ZOOM_120_STR")]
    pub zoom_120: String,
    #[serde(rename = "ZOOM_110_STR")]
    pub zoom_110: String,
    #[serde(rename = "ZOOM_100_STR")]
    pub zoom_100: String,
    #[serde(rename = "ZOOM_055_STR")]
    pub zoom_055: String,
}

impl Default for ZoomSteps {
    fn default() -> Self {
        Self {
            zoom_140: "140".to_string(),
            zoom_120: "120".to_string(),
            zoom_110: "110".to_string(),
            zoom_100: "100".to_string(),
            zoom_055: "55".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// 报告中的类别顺序（与拍摄顺序无关）
    #[serde(rename = "FEATURE_ORDER")]
    pub feature_order: Vec<String>,
    #[serde(rename = "ORDER_Z140")]
    pub order_z140: Vec<String>,
    #[serde(rename = "ORDER_Z120")]
    pub order_z120: Vec<String>,
    #[serde(rename = "ORDER_Z055")]
    pub order_z055: Vec<String>,
    #[serde(rename = "ORDER_Z110")]
    pub order_z110: Vec<String>,
}

impl CaptureConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_document(path)
    }

    /// 类别键 → 标签（未定义的键原样返回）
    pub fn category_label(&self, key: &str) -> String {
        self.categories
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    fn labels(&self, keys: &[String]) -> Vec<String> {
        keys.iter().map(|k| self.category_label(k)).collect()
    }

    /// 解析类别键、变焦级别和时长，并校验
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let zoom = ZoomLevels::parse(&self.camera.zoom_steps)?;
        let reference_category = self.category_label(REFERENCE_KEY);
        let groups = vec![
            GroupOrder::new(ZoomGroup::Z140, self.labels(&self.orders.order_z140)),
            GroupOrder::new(ZoomGroup::Z120, self.labels(&self.orders.order_z120)),
            GroupOrder::new(ZoomGroup::Z055, self.labels(&self.orders.order_z055)),
            GroupOrder::new(ZoomGroup::Z110, self.labels(&self.orders.order_z110)),
        ];
        let tv_map = self
            .tv_map
            .iter()
            .map(|(k, v)| (self.category_label(k), v.trim().to_string()))
            .collect();

        let resolved = ResolvedConfig {
            project_id: self.project.project_id.clone(),
            device_code: self.project.device_code.clone(),
            aperture_label: self.camera.av_label.clone(),
            iso_label: self.camera.iso_label.clone(),
            reference_tv_label: self.camera.tv_ref_label.clone(),
            operator_delay: seconds(self.camera.delay_s),
            post_shot_wait: seconds(self.camera.post_shot_wait),
            thumbnail_width_px: self.camera.thumbnail_width_px,
            zoom,
            reference_category,
            feature_order: self.labels(&self.orders.feature_order),
            groups,
            tv_map,
            header: self.excel_header.clone(),
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

// ==================== 解析后的配置 ====================

/// 已解析的变焦级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevels {
    pub z140: u32,
    pub z120: u32,
    pub z110: u32,
    pub z100: u32,
    pub z055: u32,
}

impl ZoomLevels {
    fn parse(steps: &ZoomSteps) -> Result<Self, ConfigError> {
        let parse = |key: &'static str, value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidZoom {
                    key,
                    value: value.to_string(),
                })
        };
        Ok(Self {
            z140: parse("ZOOM_140_STR", &steps.zoom_140)?,
            z120: parse("ZOOM_120_STR", &steps.zoom_120)?,
            z110: parse("ZOOM_110_STR", &steps.zoom_110)?,
            z100: parse("ZOOM_100_STR", &steps.zoom_100)?,
            z055: parse("ZOOM_055_STR", &steps.zoom_055)?,
        })
    }
}

/// 四个变焦组（固定顺序：140 → 120 → 55 → 110）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoomGroup {
    Z140,
    Z120,
    Z055,
    Z110,
}

impl ZoomGroup {
    /// 执行顺序
    pub const SEQUENCE: [ZoomGroup; 4] =
        [ZoomGroup::Z140, ZoomGroup::Z120, ZoomGroup::Z055, ZoomGroup::Z110];

    pub fn level(self, levels: &ZoomLevels) -> u32 {
        match self {
            ZoomGroup::Z140 => levels.z140,
            ZoomGroup::Z120 => levels.z120,
            ZoomGroup::Z055 => levels.z055,
            ZoomGroup::Z110 => levels.z110,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ZoomGroup::Z140 => "ZOOM 140",
            ZoomGroup::Z120 => "ZOOM 120",
            ZoomGroup::Z055 => "ZOOM 55",
            ZoomGroup::Z110 => "ZOOM 110",
        }
    }
}

/// 一个变焦组的类别顺序（已解析为标签）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrder {
    pub group: ZoomGroup,
    pub categories: Vec<String>,
}

impl GroupOrder {
    pub fn new(group: ZoomGroup, categories: Vec<String>) -> Self {
        Self { group, categories }
    }
}

/// 解析后的配置：会话期间只读
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub project_id: String,
    pub device_code: String,
    pub aperture_label: String,
    pub iso_label: String,
    pub reference_tv_label: String,
    pub operator_delay: Duration,
    pub post_shot_wait: Duration,
    pub thumbnail_width_px: u32,
    pub zoom: ZoomLevels,
    pub reference_category: String,
    pub feature_order: Vec<String>,
    /// 按执行顺序排列的四个组
    pub groups: Vec<GroupOrder>,
    /// 类别标签 → 快门速度标签
    pub tv_map: HashMap<String, String>,
    pub header: BTreeMap<String, String>,
}

impl ResolvedConfig {
    /// 类别的快门速度（没有覆盖时用参考快门）
    pub fn tv_for(&self, category: &str) -> &str {
        self.tv_map
            .get(category)
            .map(String::as_str)
            .unwrap_or(&self.reference_tv_label)
    }

    /// 类别在报告顺序中的位置
    pub fn feature_index(&self, category: &str) -> Option<usize> {
        self.feature_order.iter().position(|c| c == category)
    }

    pub fn group(&self, group: ZoomGroup) -> Option<&GroupOrder> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// 所有组的拍摄数
    pub fn shot_count(&self) -> usize {
        self.groups.iter().map(|g| g.categories.len()).sum()
    }

    /// 校验
    ///
    /// 错误：第一组为空、参考类别不是第一组的第一张、参考类别出现在别处、
    /// 快门覆盖为空字符串。标签不在参考表中只警告（运行时退回最近值）。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let first = self
            .groups
            .first()
            .ok_or_else(|| ConfigError::Invalid("no zoom groups".to_string()))?;
        match first.categories.first() {
            None => {
                return Err(ConfigError::Invalid(format!(
                    "{} group is empty",
                    first.group.name()
                )));
            },
            Some(c) if *c != self.reference_category => {
                return Err(ConfigError::Invalid(format!(
                    "first shot must be the reference category '{}', found '{}'",
                    self.reference_category, c
                )));
            },
            Some(_) => {},
        }
        let reference_shots = self
            .groups
            .iter()
            .flat_map(|g| g.categories.iter())
            .filter(|c| **c == self.reference_category)
            .count();
        if reference_shots > 1 {
            return Err(ConfigError::Invalid(format!(
                "reference category '{}' appears {} times",
                self.reference_category, reference_shots
            )));
        }
        if let Some((category, _)) = self.tv_map.iter().find(|(_, tv)| tv.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "empty shutter label for '{category}'"
            )));
        }

        let known_tv = |label: &str| TV_LABELS.iter().any(|(_, l)| *l == label);
        for tv in self
            .tv_map
            .values()
            .chain(std::iter::once(&self.reference_tv_label))
        {
            if !known_tv(tv) {
                warn!("Shutter label '{}' not in reference table; nearest match will be used", tv);
            }
        }
        let av = self.aperture_label.replace(".0", "");
        if !AV_LABELS.iter().any(|(_, l)| l.replace(".0", "") == av) {
            warn!(
                "Aperture label '{}' not in reference table; nearest match will be used",
                self.aperture_label
            );
        }
        for group in &self.groups {
            for category in &group.categories {
                if self.feature_index(category).is_none() && *category != self.reference_category {
                    warn!("Category '{}' missing from feature order; logged last", category);
                }
            }
        }
        Ok(())
    }
}

// ==================== 会话路径 ====================

/// 一次会话的目录和日志路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// `<base>/<PROJECT_ID>_<YYYY-mm-dd_HH-MM-SS>`
    pub session_dir: PathBuf,
    /// `<session_dir>/<PROJECT_ID>_<YYYY-mm-dd>_<DEVICE_CODE>.jsonl`
    pub log_path: PathBuf,
}

impl SessionPaths {
    pub fn new(base: &Path, project_id: &str, device_code: &str, at: &DateTime<Local>) -> Self {
        let session_dir = base.join(format!(
            "{}_{}",
            project_id,
            at.format("%Y-%m-%d_%H-%M-%S")
        ));
        let log_path = session_dir.join(format!(
            "{}_{}_{}.jsonl",
            project_id,
            at.format("%Y-%m-%d"),
            device_code
        ));
        Self {
            session_dir,
            log_path,
        }
    }

    /// 创建会话目录
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(&self.session_dir)
    }
}
