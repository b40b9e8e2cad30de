use thiserror::Error;

/// Crate-level error taxonomy.
///
/// Per-device failures (`DeviceUnavailable`, `ReadFailure`) are reported
/// individually and never escalate a bulk operation; only structural problems
/// such as `IdentityNotFound` surface to the caller as outright errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    /// No backend could open the index within its timeout budget. Not fatal;
    /// the device is simply absent or wedged. `timed_out` is true when at
    /// least one backend attempt exhausted its timeout rather than failing
    /// outright, which feeds the scanner's unresponsive-device policy.
    #[error("device unavailable: no backend opened os index {os_index} (timed out: {timed_out})")]
    DeviceUnavailable { os_index: u32, timed_out: bool },

    /// Transient frame read failure; tolerated by preview loops up to the
    /// consecutive-failure threshold.
    #[error("read failure: {0}")]
    ReadFailure(String),

    /// A logical id referenced by a caller has no current mapping. The caller
    /// must rescan before retrying.
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(String),

    /// A spawned capture task failed to join.
    #[error("task error: {0}")]
    TaskError(String),
}

impl CameraError {
    pub fn unavailable(os_index: u32, timed_out: bool) -> Self {
        CameraError::DeviceUnavailable { os_index, timed_out }
    }

    pub fn read_failure(message: impl Into<String>) -> Self {
        CameraError::ReadFailure(message.into())
    }

    pub fn identity_not_found(logical_id: &str) -> Self {
        CameraError::IdentityNotFound(logical_id.to_string())
    }

    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, CameraError::DeviceUnavailable { .. })
    }
}
