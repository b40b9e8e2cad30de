use camrig::CameraError;

#[test]
fn unavailable_message_names_the_index() {
    let err = CameraError::unavailable(3, false);
    let text = err.to_string();
    assert!(text.contains("index 3"));
    assert!(text.contains("timed out: false"));
}

#[test]
fn unavailable_timeout_message_says_so() {
    let err = CameraError::unavailable(2, true);
    assert!(err.to_string().contains("timed out: true"));
    assert!(err.is_device_unavailable());
}

#[test]
fn read_failure_carries_the_cause() {
    let err = CameraError::read_failure("sensor returned empty buffer");
    assert!(err.to_string().contains("sensor returned empty buffer"));
    assert!(!err.is_device_unavailable());
}

#[test]
fn identity_not_found_names_the_id() {
    let err = CameraError::identity_not_found("cam_4");
    assert!(err.to_string().contains("cam_4"));
}

#[test]
fn errors_compare_by_value() {
    assert_eq!(
        CameraError::unavailable(1, true),
        CameraError::unavailable(1, true)
    );
    assert_ne!(
        CameraError::unavailable(1, true),
        CameraError::unavailable(1, false)
    );
}
