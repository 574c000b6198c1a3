//! 曝光设置：快门速度、光圈、ISO 和曝光补偿
//!
//! 标签先按设备当前公布的取值集合解析（精确或最近值），再走写入校验。
//! 单个属性失败不中止拍摄：记录日志并沿用设备当前值。

use crate::error::{CaptureError, Result};
use mda_device::DeviceChannel;
use mda_driver::{Camera, DriverError};
use mda_protocol::exposure::{
    Resolved, av_label, exposure_compensation, iso_label, resolve_av, resolve_iso, resolve_tv,
    tv_label,
};
use mda_protocol::{PropertyCode, PropertyId};
use tracing::{debug, info, warn};

/// 一次曝光属性设置的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSetting {
    /// 设备当前码值（读取失败时为 `None`）
    pub code: Option<PropertyCode>,
    /// 日志标签（未知时为空字符串）
    pub label: String,
    /// 是否写入并校验成功
    pub verified: bool,
}

/// 设置快门速度
pub fn apply_shutter<D: DeviceChannel>(
    camera: &mut Camera<D>,
    label: &str,
) -> Result<ExposureSetting> {
    let values = camera.describe(PropertyId::ShutterSpeed);
    if values.is_empty() {
        info!("No Tv list; leaving Tv as-is");
    }
    let resolved = resolve_tv(&values, label);
    apply(camera, PropertyId::ShutterSpeed, label, resolved, tv_label)
}

/// 设置光圈
pub fn apply_aperture<D: DeviceChannel>(
    camera: &mut Camera<D>,
    label: &str,
) -> Result<ExposureSetting> {
    let values = camera.describe(PropertyId::Aperture);
    if values.is_empty() {
        info!("No Av list; leaving Av as-is");
    }
    let resolved = resolve_av(&values, label);
    apply(camera, PropertyId::Aperture, label, resolved, av_label)
}

/// 设置 ISO（数字标签、`Auto`，或对齐标准序列后的最近值）
pub fn apply_iso<D: DeviceChannel>(camera: &mut Camera<D>, label: &str) -> Result<ExposureSetting> {
    let values = camera.describe(PropertyId::IsoSpeed);
    let resolved = resolve_iso(&values, label);
    if values.is_empty() {
        info!("ISO list not exposed; skipping ISO set");
    } else if resolved.is_none() {
        info!("ISO: could not resolve '{}'; leaving as-is", label);
    }
    apply(camera, PropertyId::IsoSpeed, label, resolved, |code| {
        iso_label(&values, code)
    })
}

/// 读取曝光补偿（EV）
pub fn read_exposure_compensation<D: DeviceChannel>(camera: &mut Camera<D>) -> Option<f64> {
    let code = match camera.read(PropertyId::ExposureCompensation) {
        Ok(code) => code,
        Err(e) => {
            debug!("EC read failed: {}", e);
            return None;
        },
    };
    let values = camera.describe(PropertyId::ExposureCompensation);
    exposure_compensation(&values, code)
}

fn apply<D: DeviceChannel>(
    camera: &mut Camera<D>,
    property: PropertyId,
    requested: &str,
    resolved: Option<Resolved>,
    label_of: impl Fn(PropertyCode) -> String,
) -> Result<ExposureSetting> {
    let Some(resolved) = resolved else {
        return current(camera, property, &label_of);
    };
    if !resolved.is_exact() {
        info!(
            "{}: '{}' not advertised; using nearest code {} ({})",
            property,
            requested,
            resolved.code,
            label_of(resolved.code)
        );
    }

    let attempts = camera.config().scalar_verify_attempts;
    match camera.write_verified(property, resolved.code, attempts) {
        Ok(report) => {
            info!(
                "{}: set code={} ({}) -> readback {} ({})",
                property,
                resolved.code,
                label_of(resolved.code),
                report.readback,
                label_of(report.readback)
            );
            Ok(ExposureSetting {
                code: Some(report.readback),
                label: label_of(report.readback),
                verified: true,
            })
        },
        Err(e) if e.is_fatal() => Err(CaptureError::Driver(e)),
        Err(DriverError::VerifyFailed {
            readback: Some(readback),
            ..
        }) => {
            warn!(
                "{}: wanted {} but device reports {} ({})",
                property,
                label_of(resolved.code),
                readback,
                label_of(readback)
            );
            Ok(ExposureSetting {
                code: Some(readback),
                label: label_of(readback),
                verified: false,
            })
        },
        Err(e) => {
            warn!("{}: set failed: {}", property, e);
            current(camera, property, &label_of)
        },
    }
}

fn current<D: DeviceChannel>(
    camera: &mut Camera<D>,
    property: PropertyId,
    label_of: &impl Fn(PropertyCode) -> String,
) -> Result<ExposureSetting> {
    match camera.read(property) {
        Ok(code) => Ok(ExposureSetting {
            code: Some(code),
            label: label_of(code),
            verified: false,
        }),
        Err(e) if e.is_fatal() => Err(CaptureError::Device(e)),
        Err(e) => {
            debug!("{} read failed: {}", property, e);
            Ok(ExposureSetting {
                code: None,
                label: String::new(),
                verified: false,
            })
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mock_camera;
    use mda_device::DeviceErrorKind;
    use mda_device::mock::SetBehavior;
    use mda_protocol::PropertyValueSet;

    #[test]
    fn test_shutter_exact_label() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_description(PropertyId::ShutterSpeed, [104, 112]);
        let tv = apply_shutter(&mut camera, "1/125").unwrap();
        assert_eq!(tv.code, Some(112));
        assert_eq!(tv.label, "1/125");
        assert!(tv.verified);
        assert_eq!(device.set_calls(PropertyId::ShutterSpeed), vec![112]);
    }

    #[test]
    fn test_shutter_nearest_fallback() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_description(PropertyId::ShutterSpeed, [104, 112]);
        // 1/40 (99) 不在列表中 → 最近的 104
        let tv = apply_shutter(&mut camera, "1/40").unwrap();
        assert_eq!(tv.code, Some(104));
        assert_eq!(tv.label, "1/60");
    }

    #[test]
    fn test_shutter_without_description_left_as_is() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_description(PropertyId::ShutterSpeed, PropertyValueSet::empty());
        let tv = apply_shutter(&mut camera, "1/125").unwrap();
        assert_eq!(tv.code, Some(104));
        assert!(!tv.verified);
        assert!(device.set_calls(PropertyId::ShutterSpeed).is_empty());
    }

    #[test]
    fn test_aperture_ignores_trailing_zero() {
        let (mut camera, device, _clock) = mock_camera();
        let av = apply_aperture(&mut camera, "f/4").unwrap();
        assert_eq!(av.code, Some(43));
        assert_eq!(av.label, "f/4.0");
        assert_eq!(device.value(PropertyId::Aperture), Some(43));
    }

    #[test]
    fn test_iso_nearest_with_readback_label() {
        let (mut camera, device, _clock) = mock_camera();
        device.set_description(PropertyId::IsoSpeed, [0, 1, 2, 3]);
        let iso = apply_iso(&mut camera, "150").unwrap();
        // 150 最接近 160（码值 3）
        assert_eq!(device.set_calls(PropertyId::IsoSpeed), vec![3]);
        assert_eq!(iso.label, "160");
    }

    #[test]
    fn test_iso_auto() {
        let (mut camera, device, _clock) = mock_camera();
        let iso = apply_iso(&mut camera, "Auto").unwrap();
        assert_eq!(iso.code, Some(0));
        assert_eq!(iso.label, "Auto");
        assert_eq!(device.value(PropertyId::IsoSpeed), Some(0));
    }

    #[test]
    fn test_unresolvable_iso_leaves_current() {
        let (mut camera, device, _clock) = mock_camera();
        let iso = apply_iso(&mut camera, "fast").unwrap();
        assert!(device.set_calls(PropertyId::IsoSpeed).is_empty());
        assert_eq!(iso.label, "100");
    }

    #[test]
    fn test_verify_failure_degrades_to_readback() {
        let (mut camera, device, _clock) = mock_camera();
        device.override_readback(PropertyId::Aperture, 51);
        let av = apply_aperture(&mut camera, "f/8").unwrap();
        assert!(!av.verified);
        assert_eq!(av.code, Some(51));
        assert_eq!(av.label, "f/5.6");
        assert_eq!(device.set_calls(PropertyId::Aperture).len(), 3);
    }

    #[test]
    fn test_rejected_write_degrades_to_current() {
        let (mut camera, device, _clock) = mock_camera();
        device.script_sets(PropertyId::ShutterSpeed, [SetBehavior::Fail(DeviceErrorKind::Backend)]);
        let tv = apply_shutter(&mut camera, "1/125").unwrap();
        assert!(!tv.verified);
        assert_eq!(tv.code, Some(104));
    }

    #[test]
    fn test_closed_session_is_fatal() {
        let (mut camera, _device, _clock) = mock_camera();
        camera.close().unwrap();
        let err = apply_shutter(&mut camera, "1/125").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_exposure_compensation() {
        let (mut camera, device, _clock) = mock_camera();
        assert_eq!(read_exposure_compensation(&mut camera), Some(0.0));
        device.set_value(PropertyId::ExposureCompensation, 0x05);
        assert_eq!(read_exposure_compensation(&mut camera), Some(0.7));
        device.set_value(PropertyId::ExposureCompensation, 0xF8);
        assert_eq!(read_exposure_compensation(&mut camera), Some(-0.7));
    }
}
