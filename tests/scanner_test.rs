use camrig::config::{PreviewConfig, ScanConfig};
use camrig::testing::{MockDeviceSpec, MockDriver, ReadStep};
use camrig::{
    BackendAdapter, DeviceClaims, DeviceScanner, IdentityRegistry, OpenSettings, PreviewManager,
};
use std::sync::Arc;
use std::time::Duration;

fn scan_config(max_os_index: u32) -> ScanConfig {
    ScanConfig {
        max_os_index,
        attempt_timeout_ms: 200,
        exclude_onboard: false,
        report_unresponsive: false,
    }
}

fn build_scanner(
    driver: Arc<MockDriver>,
    registry: Arc<IdentityRegistry>,
    config: ScanConfig,
) -> DeviceScanner {
    let adapter = Arc::new(BackendAdapter::new(
        driver,
        OpenSettings::default(),
        Duration::from_millis(config.attempt_timeout_ms),
    ));
    DeviceScanner::new(adapter, registry, Arc::new(DeviceClaims::new()), config)
}

#[tokio::test]
async fn scan_with_gap_reports_present_devices_in_order() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(2, MockDeviceSpec::new(1280, 720, 30)),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let scanner = build_scanner(driver, registry, scan_config(2));

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].logical_id, "cam_0");
    assert_eq!(devices[1].logical_id, "cam_1");
    let os_indices: Vec<u32> = devices.iter().map(|d| d.os_index).collect();
    assert_eq!(os_indices, vec![0, 2]);
}

#[tokio::test]
async fn rescan_with_unchanged_devices_keeps_logical_ids() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(1, MockDeviceSpec::new(1920, 1080, 25)),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let scanner = build_scanner(driver, registry, scan_config(3));

    let first = scanner.scan().await.unwrap();
    let second = scanner.scan().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn device_that_never_delivers_a_frame_is_discarded() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(
                1,
                MockDeviceSpec::new(640, 480, 30).with_after_script(ReadStep::Fail),
            ),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let scanner = build_scanner(driver, registry, scan_config(1));

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].os_index, 0);
}

#[tokio::test]
async fn timed_out_index_is_dropped_by_default() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(
                1,
                MockDeviceSpec::new(640, 480, 30).with_open_delay(Duration::from_millis(300)),
            ),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let mut config = scan_config(1);
    config.attempt_timeout_ms = 25;
    let scanner = build_scanner(driver, registry, config);

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].os_index, 0);
}

#[tokio::test]
async fn unresponsive_policy_reports_degraded_descriptor() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(
                1,
                MockDeviceSpec::new(640, 480, 30).with_open_delay(Duration::from_millis(300)),
            ),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let mut config = scan_config(1);
    config.attempt_timeout_ms = 25;
    config.report_unresponsive = true;
    let scanner = build_scanner(driver, registry, config);

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices.len(), 2);
    let degraded = devices.iter().find(|d| d.os_index == 1).unwrap();
    assert!(!degraded.responsive);
    assert!(degraded.display_name.contains("unresponsive"));
    let live = devices.iter().find(|d| d.os_index == 0).unwrap();
    assert!(live.responsive);
}

#[tokio::test]
async fn onboard_exclusion_drops_the_fastest_responder() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(
                1,
                MockDeviceSpec::new(1280, 720, 30).with_open_delay(Duration::from_millis(50)),
            ),
    );
    let registry = Arc::new(IdentityRegistry::session_local());
    let mut config = scan_config(1);
    config.exclude_onboard = true;
    let scanner = build_scanner(driver, registry, config);

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].os_index, 1);
}

#[tokio::test]
async fn scan_releases_every_probe_handle() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(1, MockDeviceSpec::new(640, 480, 30)),
    );
    let stats = driver.stats();
    let registry = Arc::new(IdentityRegistry::session_local());
    let scanner = build_scanner(driver, registry, scan_config(4));

    scanner.scan().await.unwrap();

    assert!(stats.open_indices().is_empty());
    assert_eq!(stats.open_count(), stats.release_count());
    assert_eq!(stats.double_open_count(), 0);
}

#[tokio::test]
async fn rescan_while_session_is_active_never_double_opens() {
    let driver = Arc::new(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(1, MockDeviceSpec::new(1280, 720, 30)),
    );
    let stats = driver.stats();
    let adapter = Arc::new(BackendAdapter::new(
        driver,
        OpenSettings::default(),
        Duration::from_millis(200),
    ));
    let registry = Arc::new(IdentityRegistry::session_local());
    let claims = Arc::new(DeviceClaims::new());
    let scanner = DeviceScanner::new(
        adapter.clone(),
        registry.clone(),
        claims.clone(),
        scan_config(1),
    );
    let preview = Arc::new(PreviewManager::new(
        adapter,
        registry,
        claims,
        PreviewConfig {
            cadence_ms: 5,
            failure_threshold: 10,
        },
    ));

    let first = scanner.scan().await.unwrap();
    assert!(preview.start("cam_0").await.unwrap());

    let second = scanner.scan().await.unwrap();

    // The held index was not reopened; its last observation stood in, so the
    // result set and the logical ids are unchanged.
    assert_eq!(stats.double_open_count(), 0);
    assert_eq!(first, second);
    assert!(preview.is_active("cam_0").await);
    assert_eq!(stats.open_indices(), vec![0]);

    preview.stop_all().await;
    assert_eq!(stats.open_count(), stats.release_count());
}

#[tokio::test]
async fn scan_picks_usb_ids_from_driver() {
    let driver = Arc::new(MockDriver::new().with_device(
        0,
        MockDeviceSpec::new(640, 480, 30).with_usb_ids(0x046d, 0x0825),
    ));
    let registry = Arc::new(IdentityRegistry::session_local());
    let scanner = build_scanner(driver, registry, scan_config(0));

    let devices = scanner.scan().await.unwrap();

    assert_eq!(devices[0].vendor_id, Some(0x046d));
    assert_eq!(devices[0].product_id, Some(0x0825));
}
