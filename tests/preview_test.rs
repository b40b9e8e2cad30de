use camrig::config::{PreviewConfig, ScanConfig};
use camrig::testing::{DriverStats, MockDeviceSpec, MockDriver, ReadStep};
use camrig::{
    BackendAdapter, CameraError, DeviceClaims, DeviceScanner, IdentityRegistry, OpenSettings,
    PreviewManager,
};
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    driver: Arc<MockDriver>,
    stats: Arc<DriverStats>,
    preview: Arc<PreviewManager>,
    scanner: DeviceScanner,
}

fn rig(driver: MockDriver, cadence_ms: u64, failure_threshold: u32, max_os_index: u32) -> Rig {
    let driver = Arc::new(driver);
    let stats = driver.stats();
    let adapter = Arc::new(BackendAdapter::new(
        driver.clone(),
        OpenSettings::default(),
        Duration::from_millis(200),
    ));
    let registry = Arc::new(IdentityRegistry::session_local());
    let claims = Arc::new(DeviceClaims::new());
    let scanner = DeviceScanner::new(
        adapter.clone(),
        registry.clone(),
        claims.clone(),
        ScanConfig {
            max_os_index,
            attempt_timeout_ms: 200,
            exclude_onboard: false,
            report_unresponsive: false,
        },
    );
    let preview = Arc::new(PreviewManager::new(
        adapter,
        registry,
        claims,
        PreviewConfig {
            cadence_ms,
            failure_threshold,
        },
    ));
    Rig {
        driver,
        stats,
        preview,
        scanner,
    }
}

/// Poll until the condition holds or roughly two seconds pass.
macro_rules! eventually {
    ($cond:expr) => {{
        let mut ok = false;
        for _ in 0..400 {
            if $cond {
                ok = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        ok
    }};
}

#[tokio::test]
async fn start_is_idempotent_and_opens_once() {
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();

    assert!(r.preview.start("cam_0").await.unwrap());
    assert!(r.preview.start("cam_0").await.unwrap());
    assert!(r.preview.is_active("cam_0").await);
    assert_eq!(r.preview.active_ids().await, vec!["cam_0".to_string()]);

    // One probe open during the scan plus one session open; the second
    // start was a no-op.
    assert_eq!(r.stats.open_count(), 2);
    assert_eq!(r.stats.open_indices(), vec![0]);
}

#[tokio::test]
async fn latest_frame_serves_pollers_without_extra_hardware_reads() {
    // Long cadence: the loop reads once immediately, then not again for a
    // second, so poller behavior is observable in isolation.
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        1000,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();

    assert!(eventually!(r.preview.get_latest_frame("cam_0").await.is_some()));
    let reads_before = r.stats.read_count();

    let polls = futures::future::join_all(
        (0..20).map(|_| r.preview.get_latest_frame("cam_0")),
    )
    .await;

    assert!(polls.iter().all(|f| f.is_some()));
    assert_eq!(r.stats.read_count(), reads_before);
    let frame = polls[0].as_ref().unwrap();
    assert_eq!(frame.source_id, "cam_0");
}

#[tokio::test]
async fn stop_clears_cache_and_releases_handle() {
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();
    assert!(eventually!(r.preview.get_latest_frame("cam_0").await.is_some()));

    r.preview.stop("cam_0").await;

    assert!(!r.preview.is_active("cam_0").await);
    assert!(r.preview.get_latest_frame("cam_0").await.is_none());
    assert!(r.stats.open_indices().is_empty());
    assert_eq!(r.stats.open_count(), r.stats.release_count());
}

#[tokio::test]
async fn restart_never_observes_a_stale_frame() {
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();
    assert!(eventually!(r.preview.get_latest_frame("cam_0").await.is_some()));

    r.preview.stop("cam_0").await;

    // The restarted session's device delivers nothing, so any frame seen now
    // would have to be a stale leftover from the first session.
    r.driver.set_read_script(0, vec![], ReadStep::Fail);
    assert!(r.preview.start("cam_0").await.unwrap());
    assert!(r.preview.get_latest_frame("cam_0").await.is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(r.preview.get_latest_frame("cam_0").await.is_none());
}

#[tokio::test]
async fn threshold_minus_one_failures_then_success_keeps_running() {
    // Probe read, then four failures (threshold is five), then frames again.
    let r = rig(
        MockDriver::new().with_device(
            0,
            MockDeviceSpec::new(640, 480, 30).with_read_script(vec![
                ReadStep::Frame,
                ReadStep::Fail,
                ReadStep::Fail,
                ReadStep::Fail,
                ReadStep::Fail,
            ]),
        ),
        5,
        5,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();

    assert!(eventually!(r.preview.get_latest_frame("cam_0").await.is_some()));
    assert!(r.preview.is_active("cam_0").await);
    assert_eq!(r.preview.consecutive_failures("cam_0").await, Some(0));
}

#[tokio::test]
async fn threshold_failures_self_terminate_and_release() {
    // Probe read succeeds, then every session read fails.
    let r = rig(
        MockDriver::new().with_device(
            0,
            MockDeviceSpec::new(640, 480, 30)
                .with_read_script(vec![ReadStep::Frame])
                .with_after_script(ReadStep::Fail),
        ),
        5,
        5,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();

    assert!(eventually!(!r.preview.is_active("cam_0").await));
    assert!(r.preview.get_latest_frame("cam_0").await.is_none());
    assert!(eventually!(r.stats.open_indices().is_empty()));
    assert_eq!(r.stats.open_count(), r.stats.release_count());
    assert_eq!(r.stats.double_open_count(), 0);
}

#[tokio::test]
async fn start_unknown_id_is_identity_not_found() {
    let r = rig(MockDriver::new(), 5, 10, 0);
    let result = r.preview.start("cam_9").await;
    assert!(matches!(result, Err(CameraError::IdentityNotFound(_))));
}

#[tokio::test]
async fn start_reports_false_when_device_cannot_open() {
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();

    // Device unplugged between the scan and the start.
    r.driver.set_refuse_open(0, true);

    assert!(!r.preview.start("cam_0").await.unwrap());
    assert!(!r.preview.is_active("cam_0").await);
}

#[tokio::test]
async fn stop_on_idle_session_is_a_noop() {
    let r = rig(
        MockDriver::new().with_device(0, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.stop("cam_0").await;
    assert!(!r.preview.is_active("cam_0").await);
}

#[tokio::test]
async fn stop_all_drains_every_session() {
    let r = rig(
        MockDriver::new()
            .with_device(0, MockDeviceSpec::new(640, 480, 30))
            .with_device(1, MockDeviceSpec::new(640, 480, 30)),
        5,
        10,
        1,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();
    r.preview.start("cam_1").await.unwrap();

    r.preview.stop_all().await;

    assert!(r.preview.active_ids().await.is_empty());
    assert!(r.stats.open_indices().is_empty());
}

#[tokio::test]
async fn self_terminated_session_is_not_resurrected() {
    let r = rig(
        MockDriver::new().with_device(
            0,
            MockDeviceSpec::new(640, 480, 30)
                .with_read_script(vec![ReadStep::Frame])
                .with_after_script(ReadStep::Fail),
        ),
        5,
        3,
        0,
    );
    r.scanner.scan().await.unwrap();
    r.preview.start("cam_0").await.unwrap();
    assert!(eventually!(!r.preview.is_active("cam_0").await));

    // Absence stays observable until the caller starts anew.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!r.preview.is_active("cam_0").await);

    // An explicit new start succeeds and fails over the same path again.
    assert!(r.preview.start("cam_0").await.unwrap());
}
