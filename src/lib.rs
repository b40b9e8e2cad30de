//! Camrig: multi-camera acquisition and session concurrency for capture rigs
//!
//! This crate manages a variable-sized fleet of attached cameras: it
//! discovers devices and gives each a stable logical identity independent of
//! volatile OS indices, opens them through competing hardware backends with
//! per-attempt timeouts, runs one continuous preview loop per device for any
//! number of frame consumers, and takes coordinated snapshots across many
//! devices at once while reusing already-open sessions.
//!
//! # Features
//! - Device enumeration with fingerprint-based identity reconciliation
//! - Backend fallback opening (native first, generic last) with timeouts
//! - Preview sessions: one capture loop, many independent pollers
//! - Parallel multi-device snapshots with per-device failure isolation
//! - Session-local or persisted identity policy, chosen at construction
//!
//! # Usage
//! ```rust,no_run
//! use camrig::{
//!     BackendAdapter, CaptureOrchestrator, DeviceClaims, DeviceScanner, IdentityRegistry,
//!     NokhwaDriver, PreviewManager, RigConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), camrig::CameraError> {
//! let config = RigConfig::load_or_default();
//! let adapter = Arc::new(BackendAdapter::new(
//!     Arc::new(NokhwaDriver::new()),
//!     config.open_settings(),
//!     config.attempt_timeout(),
//! ));
//! let registry = Arc::new(IdentityRegistry::new(config.identity_policy())?);
//! let claims = Arc::new(DeviceClaims::new());
//! let scanner = DeviceScanner::new(
//!     adapter.clone(),
//!     registry.clone(),
//!     claims.clone(),
//!     config.scan.clone(),
//! );
//! let preview = Arc::new(PreviewManager::new(
//!     adapter.clone(),
//!     registry.clone(),
//!     claims,
//!     config.preview.clone(),
//! ));
//! let orchestrator = CaptureOrchestrator::new(adapter, preview.clone());
//!
//! let devices = scanner.scan().await?;
//! for device in &devices {
//!     preview.start(&device.logical_id).await?;
//! }
//! let ids: Vec<String> = devices.iter().map(|d| d.logical_id.clone()).collect();
//! let results = orchestrator.capture_many(&ids).await;
//! # let _ = results;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod capture;
pub mod config;
pub mod errors;
pub mod identity;
pub mod preview;
pub mod scanner;
pub mod storage;
pub mod types;

// Testing utilities - scripted mock driver for offline testing
pub mod testing;

// Re-exports for convenience
pub use backend::{BackendAdapter, BackendKind, CameraDevice, CameraDriver, DeviceHandle, NokhwaDriver, OpenSettings};
pub use capture::CaptureOrchestrator;
pub use config::RigConfig;
pub use errors::CameraError;
pub use identity::{Fingerprint, IdentityPolicy, IdentityRegistry};
pub use preview::{CaptureSource, DeviceClaims, PreviewManager};
pub use scanner::DeviceScanner;
pub use storage::{FrameSink, ImageFileSink};
pub use types::{
    CameraFrame, CaptureResult, DeviceDescriptor, DeviceProperties, ExposureMode, FrameCodec,
    ObservedDevice, SnapshotResult,
};

/// Initialize logging for the acquisition subsystem
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "camrig=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
