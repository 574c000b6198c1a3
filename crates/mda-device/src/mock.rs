//! Mock 相机（无硬件依赖）
//!
//! 可编程的模拟设备，用于单元测试、集成测试和 CLI 的模拟模式：
//!
//! - 每个属性可以排队脚本化的写入行为（接受 / busy / 静默丢弃 / 失败）
//! - 每个命令可以排队脚本化的执行结果
//! - 所有调用按顺序记录在事件日志中，便于断言顺序不变量
//! - 全按快门后产生资产，按 [`AssetDelivery`] 选择交付方式
//!
//! `MockDevice` 内部共享状态，克隆一份留在测试中即可在会话结束后检查事件日志。

use crate::{
    AssetEvent, AssetEventHandler, CameraBackend, DeviceChannel, DeviceError, DeviceErrorKind,
    DirectoryItem,
};
use mda_protocol::{
    DeviceCommand, HostCapacity, PropertyCode, PropertyId, PropertyValueSet, ShutterButton,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// 属性写入行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetBehavior {
    /// 接受并立即生效
    Accept,
    /// 返回 busy 错误
    Busy,
    /// 返回成功但不生效（静默丢弃）
    Ignore,
    /// 返回指定类型的错误
    Fail(DeviceErrorKind),
}

/// 命令执行行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBehavior {
    Accept,
    Busy,
    Fail(DeviceErrorKind),
}

/// 资产交付方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetDelivery {
    /// 下一次事件派发时通过回调交付（正常路径）
    Callback,
    /// 拍摄时直接把文件写入目录，不触发回调（回退扫描路径）
    DirectDrop(PathBuf),
    /// 不产生任何资产
    Silent,
}

/// 事件日志条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Get(PropertyId),
    Set {
        property: PropertyId,
        code: PropertyCode,
        accepted: bool,
    },
    Command {
        command: DeviceCommand,
        accepted: bool,
    },
    Capacity(HostCapacity),
    HandlerInstalled,
    AssetDelivered(String),
    Close,
}

impl MockEvent {
    /// 被接受的全按快门
    pub fn is_capture(&self) -> bool {
        matches!(
            self,
            MockEvent::Command {
                command: DeviceCommand::PressShutter(
                    ShutterButton::Completely | ShutterButton::CompletelyNonAf
                ),
                accepted: true,
            }
        )
    }

    /// 被接受的写入
    pub fn is_accepted_set(&self, property: PropertyId, code: PropertyCode) -> bool {
        matches!(
            self,
            MockEvent::Set { property: p, code: c, accepted: true } if *p == property && *c == code
        )
    }
}

struct MockItem {
    name: String,
    data: Vec<u8>,
}

impl DirectoryItem for MockItem {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn download_to(&mut self, path: &Path) -> Result<u64, DeviceError> {
        std::fs::write(path, &self.data)?;
        Ok(self.size())
    }
}

struct MockState {
    values: HashMap<PropertyId, PropertyCode>,
    descriptions: HashMap<PropertyId, PropertyValueSet>,
    unsupported: HashSet<PropertyId>,
    set_scripts: HashMap<PropertyId, VecDeque<SetBehavior>>,
    set_defaults: HashMap<PropertyId, SetBehavior>,
    readback_overrides: HashMap<PropertyId, PropertyCode>,
    command_scripts: HashMap<DeviceCommand, VecDeque<CommandBehavior>>,
    events: Vec<MockEvent>,
    handler: Option<Arc<dyn AssetEventHandler>>,
    delivery: AssetDelivery,
    assets_per_shot: usize,
    pending: VecDeque<MockItem>,
    shot_counter: u32,
    closed: bool,
}

impl MockState {
    fn empty() -> Self {
        Self {
            values: HashMap::new(),
            descriptions: HashMap::new(),
            unsupported: HashSet::new(),
            set_scripts: HashMap::new(),
            set_defaults: HashMap::new(),
            readback_overrides: HashMap::new(),
            command_scripts: HashMap::new(),
            events: Vec::new(),
            handler: None,
            delivery: AssetDelivery::Callback,
            assets_per_shot: 1,
            pending: VecDeque::new(),
            shot_counter: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::new(
                DeviceErrorKind::SessionClosed,
                "session already closed",
            ));
        }
        Ok(())
    }

    fn produce_assets(&mut self) {
        for _ in 0..self.assets_per_shot {
            self.shot_counter += 1;
            let name = format!("IMG_{:04}.JPG", self.shot_counter);
            let data = format!("mock-jpeg-{}", self.shot_counter).into_bytes();
            match &self.delivery {
                AssetDelivery::Callback => self.pending.push_back(MockItem { name, data }),
                AssetDelivery::DirectDrop(dir) => {
                    if let Err(e) = std::fs::write(dir.join(&name), &data) {
                        debug!("Mock direct drop of {} failed: {}", name, e);
                    }
                },
                AssetDelivery::Silent => {},
            }
        }
    }
}

/// 模拟相机
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDevice")
            .field("values", &state.values)
            .field("events", &state.events.len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// 预置的 ISO 码值（0 = Auto，其后对齐 100..3200）
pub const MOCK_ISO_CODES: [PropertyCode; 17] = [
    0x00, 0x48, 0x4b, 0x4d, 0x50, 0x53, 0x55, 0x58, 0x5b, 0x5d, 0x60, 0x63, 0x65, 0x68, 0x6b,
    0x6d, 0x70,
];

/// 预置的曝光补偿码值（以 0x00 为零点，每项 1/3 档）
pub const MOCK_EC_CODES: [PropertyCode; 13] = [
    0xEE, 0xF0, 0xF3, 0xF5, 0xF8, 0xFB, 0x00, 0x03, 0x05, 0x08, 0x0B, 0x0D, 0x10,
];

impl MockDevice {
    /// 带典型机身预置值的模拟相机
    pub fn new() -> Self {
        let device = Self::bare();
        {
            let mut state = device.state.lock();
            let tv: PropertyValueSet = [93, 96, 99, 101, 104, 107, 109, 112, 115, 117, 120, 123]
                .into_iter()
                .collect();
            let av: PropertyValueSet = [40, 43, 45, 48, 51, 53, 56, 59, 61, 64, 67]
                .into_iter()
                .collect();
            state.descriptions.insert(PropertyId::Zoom, PropertyValueSet::from([201]));
            state.descriptions.insert(PropertyId::ShutterSpeed, tv);
            state.descriptions.insert(PropertyId::Aperture, av);
            state.descriptions.insert(PropertyId::IsoSpeed, MOCK_ISO_CODES.into());
            state
                .descriptions
                .insert(PropertyId::ExposureCompensation, MOCK_EC_CODES.into());

            let initial = [
                (PropertyId::Zoom, 0),
                (PropertyId::ShutterSpeed, 104),
                (PropertyId::Aperture, 56),
                (PropertyId::IsoSpeed, 0x48),
                (PropertyId::ExposureCompensation, 0x00),
                (PropertyId::AfMode, 0),
                (PropertyId::ContinuousAfMode, 1),
                (PropertyId::MovieServoAf, 1),
                (PropertyId::LensDriveWhenAfImpossible, 1),
                (PropertyId::AfAssist, 1),
                (PropertyId::EvfMode, 0),
                (PropertyId::EvfOutputDevice, 1),
                (PropertyId::SaveTo, 1),
            ];
            state.values.extend(initial);
        }
        device
    }

    /// 没有任何属性的模拟相机
    pub fn bare() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::empty())),
        }
    }

    // ==================== 配置 ====================

    pub fn set_value(&self, property: PropertyId, code: PropertyCode) {
        self.state.lock().values.insert(property, code);
    }

    pub fn set_description(&self, property: PropertyId, values: impl Into<PropertyValueSet>) {
        self.state.lock().descriptions.insert(property, values.into());
    }

    /// 标记属性为当前机身不支持（读写均返回 `NotSupported`）
    pub fn mark_unsupported(&self, property: PropertyId) {
        self.state.lock().unsupported.insert(property);
    }

    /// 为属性排队写入行为（按顺序消耗，耗尽后使用默认行为）
    pub fn script_sets(
        &self,
        property: PropertyId,
        behaviors: impl IntoIterator<Item = SetBehavior>,
    ) {
        self.state
            .lock()
            .set_scripts
            .entry(property)
            .or_default()
            .extend(behaviors);
    }

    /// 设置属性的默认写入行为（脚本耗尽后使用，初始为 `Accept`）
    pub fn set_default_behavior(&self, property: PropertyId, behavior: SetBehavior) {
        self.state.lock().set_defaults.insert(property, behavior);
    }

    /// 固定属性的回读值（不论写入了什么）
    pub fn override_readback(&self, property: PropertyId, code: PropertyCode) {
        self.state.lock().readback_overrides.insert(property, code);
    }

    /// 为命令排队执行结果
    pub fn script_commands(
        &self,
        command: DeviceCommand,
        behaviors: impl IntoIterator<Item = CommandBehavior>,
    ) {
        self.state
            .lock()
            .command_scripts
            .entry(command)
            .or_default()
            .extend(behaviors);
    }

    pub fn set_delivery(&self, delivery: AssetDelivery) {
        self.state.lock().delivery = delivery;
    }

    /// 每次全按产生的资产数量
    pub fn set_assets_per_shot(&self, count: usize) {
        self.state.lock().assets_per_shot = count;
    }

    /// 排入一个仍在传输中的资产（下一次派发事件时交付）
    pub fn queue_pending_asset(&self, name: &str) {
        self.state.lock().pending.push_back(MockItem {
            name: name.to_string(),
            data: b"mock-jpeg-late".to_vec(),
        });
    }

    // ==================== 检查 ====================

    /// 事件日志快照
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    pub fn value(&self, property: PropertyId) -> Option<PropertyCode> {
        self.state.lock().values.get(&property).copied()
    }

    /// 属性收到的全部写入码值（含被拒绝的）
    pub fn set_calls(&self, property: PropertyId) -> Vec<PropertyCode> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Set { property: p, code, .. } if *p == property => Some(*code),
                _ => None,
            })
            .collect()
    }

    /// 下发过的全部命令（含被拒绝的）
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Command { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// 完成的拍摄次数
    pub fn capture_count(&self) -> usize {
        self.state.lock().events.iter().filter(|e| e.is_capture()).count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn handler_installed(&self) -> bool {
        self.state.lock().handler.is_some()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceChannel for MockDevice {
    fn get_property(&mut self, property: PropertyId) -> Result<PropertyCode, DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.events.push(MockEvent::Get(property));
        if state.unsupported.contains(&property) {
            return Err(DeviceError::not_supported(property));
        }
        if let Some(code) = state.readback_overrides.get(&property) {
            return Ok(*code);
        }
        state
            .values
            .get(&property)
            .copied()
            .ok_or_else(|| DeviceError::not_supported(property))
    }

    fn set_property(
        &mut self,
        property: PropertyId,
        code: PropertyCode,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if state.unsupported.contains(&property) {
            state.events.push(MockEvent::Set {
                property,
                code,
                accepted: false,
            });
            return Err(DeviceError::not_supported(property));
        }
        let default = state
            .set_defaults
            .get(&property)
            .copied()
            .unwrap_or(SetBehavior::Accept);
        let behavior = state
            .set_scripts
            .get_mut(&property)
            .and_then(VecDeque::pop_front)
            .unwrap_or(default);
        trace!("Mock set {}={} -> {:?}", property, code, behavior);

        let accepted = matches!(behavior, SetBehavior::Accept | SetBehavior::Ignore);
        state.events.push(MockEvent::Set {
            property,
            code,
            accepted,
        });
        match behavior {
            SetBehavior::Accept => {
                state.values.insert(property, code);
                Ok(())
            },
            SetBehavior::Ignore => Ok(()),
            SetBehavior::Busy => Err(DeviceError::busy("EDS_ERR_DEVICE_BUSY")),
            SetBehavior::Fail(kind) => Err(DeviceError::new(kind, "scripted set failure")),
        }
    }

    fn describe_property(
        &mut self,
        property: PropertyId,
    ) -> Result<PropertyValueSet, DeviceError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.descriptions.get(&property).cloned().unwrap_or_default())
    }

    fn send_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let behavior = state
            .command_scripts
            .get_mut(&command)
            .and_then(VecDeque::pop_front)
            .unwrap_or(CommandBehavior::Accept);
        let accepted = behavior == CommandBehavior::Accept;
        state.events.push(MockEvent::Command { command, accepted });
        match behavior {
            CommandBehavior::Accept => {
                if matches!(
                    command,
                    DeviceCommand::PressShutter(
                        ShutterButton::Completely | ShutterButton::CompletelyNonAf
                    )
                ) {
                    state.produce_assets();
                }
                Ok(())
            },
            CommandBehavior::Busy => Err(DeviceError::busy("EDS_ERR_DEVICE_BUSY")),
            CommandBehavior::Fail(kind) => {
                Err(DeviceError::new(kind, format!("{} failed", command.name())))
            },
        }
    }

    fn set_capacity(&mut self, capacity: HostCapacity) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.events.push(MockEvent::Capacity(capacity));
        Ok(())
    }

    fn set_asset_handler(
        &mut self,
        handler: Arc<dyn AssetEventHandler>,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.handler = Some(handler);
        state.events.push(MockEvent::HandlerInstalled);
        Ok(())
    }

    fn dispatch_events(&mut self) -> Result<(), DeviceError> {
        // 回调在锁外执行：处理器可能耗时（写文件）
        let (handler, items) = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return Ok(());
            }
            let items: Vec<MockItem> = state.pending.drain(..).collect();
            (state.handler.clone(), items)
        };
        let Some(handler) = handler else {
            debug!("Mock dropped {} asset(s): no handler installed", items.len());
            return Ok(());
        };
        for mut item in items {
            handler.on_asset_event(AssetEvent::DirItemRequestTransfer, &mut item);
            self.state
                .lock()
                .events
                .push(MockEvent::AssetDelivered(item.name.clone()));
        }
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.closed = true;
        state.handler = None;
        state.events.push(MockEvent::Close);
        Ok(())
    }
}

/// 模拟后端
#[derive(Debug, Default)]
pub struct MockBackend {
    cameras: Vec<MockDevice>,
    open_error: Option<DeviceError>,
}

impl MockBackend {
    pub fn new(device: MockDevice) -> Self {
        Self {
            cameras: vec![device],
            open_error: None,
        }
    }

    /// 没有连接任何相机
    pub fn empty() -> Self {
        Self::default()
    }

    /// 打开会话时返回指定错误
    pub fn with_open_error(mut self, error: DeviceError) -> Self {
        self.open_error = Some(error);
        self
    }
}

impl CameraBackend for MockBackend {
    type Channel = MockDevice;

    fn camera_count(&mut self) -> Result<usize, DeviceError> {
        Ok(self.cameras.len())
    }

    fn open_session(&mut self, index: usize) -> Result<MockDevice, DeviceError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        self.cameras.get(index).cloned().ok_or_else(|| {
            DeviceError::new(DeviceErrorKind::NotFound, format!("no camera at index {index}"))
        })
    }
}
