//! Hardware backend adapter.
//!
//! The [`CameraDriver`] / [`CameraDevice`] traits seat both the production
//! nokhwa driver and the scripted mock used in tests. [`BackendAdapter`] wraps
//! a driver in the async discipline the rest of the crate relies on: blocking
//! calls offloaded to `spawn_blocking`, a fixed backend priority order, and an
//! identical timeout per backend attempt regardless of device.

pub mod native;

pub use native::NokhwaDriver;

use crate::errors::CameraError;
use crate::types::{CameraFrame, DeviceProperties, ExposureMode, FrameCodec};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One of the competing low-level access paths, tried in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Platform-native backend (Media Foundation, V4L2, AVFoundation).
    Native,
    /// Generic auto-selecting fallback.
    Auto,
}

/// Device configuration applied in one batch when a handle is opened.
#[derive(Debug, Clone)]
pub struct OpenSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub buffer_depth: u32,
    pub codec: FrameCodec,
    pub exposure: ExposureMode,
}

impl Default for OpenSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_rate: 30,
            buffer_depth: 1,
            codec: FrameCodec::Mjpeg,
            exposure: ExposureMode::Auto,
        }
    }
}

/// A live, exclusively owned device resource. Implementations must make
/// `release` idempotent and must never panic out of it.
pub trait CameraDevice: Send {
    fn read_frame(&mut self) -> Result<CameraFrame, CameraError>;
    fn properties(&self) -> DeviceProperties;
    fn release(&mut self);
}

/// Blocking driver for one family of hardware backends. Knows nothing about
/// identity or sessions.
pub trait CameraDriver: Send + Sync {
    /// Fixed priority order of backends to attempt, fastest native first.
    fn backend_order(&self) -> Vec<BackendKind>;

    /// Open `os_index` through `backend`, applying `settings` before the
    /// device is returned. Blocking; called from a blocking task.
    fn open(
        &self,
        backend: BackendKind,
        os_index: u32,
        settings: &OpenSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError>;
}

struct HandleSlot {
    device: Option<Box<dyn CameraDevice>>,
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        // Backstop so cancelled callers can never leak a live device.
        if let Some(mut device) = self.device.take() {
            device.release();
        }
    }
}

/// An open device handle bound to exactly one backend + os_index pair.
///
/// Cloning shares the same underlying device; reads are serialized through an
/// internal mutex so no two reads are ever in flight on one handle. The
/// device is released exactly once, either by an explicit [`release`] call or
/// when the last clone drops.
///
/// [`release`]: BackendAdapter::release
#[derive(Clone)]
pub struct DeviceHandle {
    os_index: u32,
    properties: DeviceProperties,
    slot: Arc<Mutex<HandleSlot>>,
}

impl DeviceHandle {
    fn new(os_index: u32, device: Box<dyn CameraDevice>) -> Self {
        let properties = device.properties();
        Self {
            os_index,
            properties,
            slot: Arc::new(Mutex::new(HandleSlot {
                device: Some(device),
            })),
        }
    }

    pub fn os_index(&self) -> u32 {
        self.os_index
    }

    /// Properties captured at open time.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub(crate) fn read_blocking(&self) -> Result<CameraFrame, CameraError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CameraError::read_failure("device lock poisoned"))?;
        match slot.device.as_mut() {
            Some(device) => device.read_frame(),
            None => Err(CameraError::read_failure("handle already released")),
        }
    }

    pub(crate) fn release_blocking(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            if let Some(mut device) = slot.device.take() {
                device.release();
            }
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("os_index", &self.os_index)
            .field("backend", &self.properties.backend_name)
            .finish()
    }
}

/// Async wrapper around a [`CameraDriver`].
///
/// Backend attempts for one device are always sequential; concurrent
/// low-level access to the same index is unsafe on some platforms.
pub struct BackendAdapter {
    driver: Arc<dyn CameraDriver>,
    settings: OpenSettings,
    attempt_timeout: Duration,
}

impl BackendAdapter {
    pub fn new(driver: Arc<dyn CameraDriver>, settings: OpenSettings, attempt_timeout: Duration) -> Self {
        Self {
            driver,
            settings,
            attempt_timeout,
        }
    }

    pub fn settings(&self) -> &OpenSettings {
        &self.settings
    }

    /// Open a device, trying each backend in priority order with an identical
    /// per-attempt timeout. A multi-backend open can therefore take up to
    /// timeout * backend count in the worst case.
    pub async fn open(&self, os_index: u32) -> Result<DeviceHandle, CameraError> {
        let mut timed_out = false;

        for backend in self.driver.backend_order() {
            let driver = self.driver.clone();
            let settings = self.settings.clone();
            let attempt =
                tokio::task::spawn_blocking(move || driver.open(backend, os_index, &settings));

            match tokio::time::timeout(self.attempt_timeout, attempt).await {
                Ok(Ok(Ok(device))) => {
                    let handle = DeviceHandle::new(os_index, device);
                    log::info!(
                        "Opened os index {} via {:?} backend ({})",
                        os_index,
                        backend,
                        handle.properties().backend_name
                    );
                    return Ok(handle);
                }
                Ok(Ok(Err(e))) => {
                    log::debug!("Backend {:?} failed for os index {}: {}", backend, os_index, e);
                }
                Ok(Err(join_err)) => {
                    log::warn!(
                        "Open task for os index {} via {:?} panicked: {}",
                        os_index,
                        backend,
                        join_err
                    );
                }
                Err(_) => {
                    // The orphaned blocking task keeps running; a late-opened
                    // device is dropped, and thereby released, when it ends.
                    timed_out = true;
                    log::warn!(
                        "Backend {:?} timed out after {:?} for os index {}",
                        backend,
                        self.attempt_timeout,
                        os_index
                    );
                }
            }
        }

        Err(CameraError::unavailable(os_index, timed_out))
    }

    /// Read one frame. Serialized per handle; concurrent callers queue.
    pub async fn read(&self, handle: &DeviceHandle) -> Result<CameraFrame, CameraError> {
        let handle = handle.clone();
        tokio::task::spawn_blocking(move || handle.read_blocking())
            .await
            .map_err(|e| CameraError::TaskError(e.to_string()))?
    }

    /// Release a handle. Idempotent, best-effort; never fails to the caller.
    pub async fn release(&self, handle: &DeviceHandle) {
        let handle = handle.clone();
        if tokio::task::spawn_blocking(move || handle.release_blocking())
            .await
            .is_err()
        {
            log::warn!("Release task panicked; device dropped by runtime");
        }
    }
}
