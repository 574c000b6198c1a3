//! 曝光设置场景测试：标签解析 + 写入校验 + 回读标签

use mda_client::exposure::{apply_iso, apply_shutter, read_exposure_compensation};
use mda_device::mock::{MockDevice, SetBehavior};
use mda_driver::{Camera, CameraBuilder, ManualClock};
use mda_protocol::PropertyId;
use std::sync::Arc;

fn camera(device: &MockDevice) -> Camera<MockDevice> {
    CameraBuilder::new()
        .clock(Arc::new(ManualClock::new()))
        .build(device.clone())
}

#[test]
fn test_shutter_exact_label_first_attempt() {
    let device = MockDevice::new();
    device.set_description(PropertyId::ShutterSpeed, [104, 112]);
    let mut camera = camera(&device);

    let setting = apply_shutter(&mut camera, "1/125").unwrap();

    assert_eq!(setting.code, Some(112));
    assert_eq!(setting.label, "1/125");
    assert!(setting.verified);
    assert_eq!(device.set_calls(PropertyId::ShutterSpeed), vec![112]);
}

#[test]
fn test_shutter_busy_then_success() {
    let device = MockDevice::new();
    device.set_description(PropertyId::ShutterSpeed, [104, 112]);
    device.script_sets(PropertyId::ShutterSpeed, [SetBehavior::Busy]);
    let mut camera = camera(&device);

    let setting = apply_shutter(&mut camera, "1/125").unwrap();

    assert!(setting.verified);
    assert_eq!(device.set_calls(PropertyId::ShutterSpeed), vec![112, 112]);
}

#[test]
fn test_iso_nearest_match_verifies_first_attempt() {
    // 100 / 125 / 160：140 最接近 125
    let device = MockDevice::new();
    device.set_description(PropertyId::IsoSpeed, [1, 2, 3]);
    let mut camera = camera(&device);

    let setting = apply_iso(&mut camera, "140").unwrap();

    assert_eq!(setting.code, Some(2));
    assert_eq!(setting.label, "125");
    assert!(setting.verified);
    assert_eq!(device.set_calls(PropertyId::IsoSpeed), vec![2]);
}

#[test]
fn test_iso_readback_mismatch_reports_device_value() {
    // 250 最接近 160（码值 3），设备却一直回读 2
    let device = MockDevice::new();
    device.set_description(PropertyId::IsoSpeed, [1, 2, 3]);
    device.override_readback(PropertyId::IsoSpeed, 2);
    let mut camera = camera(&device);
    let attempts = camera.config().scalar_verify_attempts as usize;

    let setting = apply_iso(&mut camera, "250").unwrap();

    assert_eq!(device.set_calls(PropertyId::IsoSpeed), vec![3; attempts]);
    assert!(!setting.verified);
    assert_eq!(setting.code, Some(2));
    assert_eq!(setting.label, "125");
}

#[test]
fn test_exposure_compensation_thirds() {
    let device = MockDevice::new();
    let mut camera = camera(&device);
    assert_eq!(read_exposure_compensation(&mut camera), Some(0.0));

    // 零点之上两步
    device.set_value(PropertyId::ExposureCompensation, 0x05);
    assert_eq!(read_exposure_compensation(&mut camera), Some(0.7));

    // 零点之下一步
    device.set_value(PropertyId::ExposureCompensation, 0xFB);
    assert_eq!(read_exposure_compensation(&mut camera), Some(-0.3));
}
