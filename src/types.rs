//! Core data types shared across the acquisition subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A camera device discovered by a scan, annotated with its stable logical id.
///
/// The `os_index` is volatile and may be reassigned by the operating system
/// between scans; callers should address devices by `logical_id`. Descriptors
/// are immutable once returned and superseded wholesale by the next scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub logical_id: String,
    pub os_index: u32,
    pub display_name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    /// False for devices reported under the unresponsive-device policy:
    /// every backend attempt timed out and no frame was ever read. Treat
    /// such a descriptor as provisional until a successful capture.
    pub responsive: bool,
}

impl DeviceDescriptor {
    pub fn new(logical_id: String, os_index: u32, display_name: String) -> Self {
        Self {
            logical_id,
            os_index,
            display_name,
            vendor_id: None,
            product_id: None,
            responsive: true,
        }
    }

    pub fn with_usb_ids(mut self, vendor_id: Option<u16>, product_id: Option<u16>) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }

    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }
}

/// Properties observed from a live device handle, captured at open time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub backend_name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

/// One device as seen by a single scan pass, before identity reconciliation.
#[derive(Debug, Clone)]
pub struct ObservedDevice {
    pub os_index: u32,
    pub properties: DeviceProperties,
    /// Time the probe took to open and confirm the device; used by the
    /// optional onboard-camera exclusion filter.
    pub probe_latency: Duration,
    pub responsive: bool,
}

impl ObservedDevice {
    pub fn new(os_index: u32, properties: DeviceProperties, probe_latency: Duration) -> Self {
        Self {
            os_index,
            properties,
            probe_latency,
            responsive: true,
        }
    }

    /// Placeholder observation for an index that never produced a frame.
    pub fn unresponsive(os_index: u32) -> Self {
        Self {
            os_index,
            properties: DeviceProperties {
                width: 0,
                height: 0,
                frame_rate: 0,
                backend_name: "unresponsive".to_string(),
                vendor_id: None,
                product_id: None,
            },
            probe_latency: Duration::ZERO,
            responsive: false,
        }
    }
}

/// A single captured frame with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub id: Uuid,
    /// Raw RGB8 pixel data, width * height * 3 bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Logical id of the producing device once stamped by the session or
    /// orchestrator layer; the raw os index string at the driver level.
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: usize,
    pub format: String,
}

impl CameraFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, source_id: String) -> Self {
        let size_bytes = data.len();
        Self {
            id: Uuid::new_v4(),
            data,
            width,
            height,
            source_id,
            timestamp: Utc::now(),
            size_bytes,
            format: "RGB8".to_string(),
        }
    }

    pub fn with_format(mut self, format: String) -> Self {
        self.format = format;
        self
    }

    pub fn with_source(mut self, source_id: String) -> Self {
        self.source_id = source_id;
        self
    }
}

/// Pixel stream codec requested from the hardware at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameCodec {
    Mjpeg,
    Yuyv,
    RawRgb,
}

impl FrameCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameCodec::Mjpeg => "MJPG",
            FrameCodec::Yuyv => "YUYV",
            FrameCodec::RawRgb => "RGB",
        }
    }
}

/// Exposure behavior applied to the handle in the batched open configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "value")]
pub enum ExposureMode {
    Auto,
    Manual(i64),
}

/// Outcome of one device within a multi-device snapshot. Failures are always
/// per-device; a snapshot never fails as a whole because one device did.
#[derive(Debug)]
pub struct CaptureResult {
    pub logical_id: String,
    pub outcome: Result<CameraFrame, crate::errors::CameraError>,
}

impl CaptureResult {
    pub fn ok(logical_id: String, frame: CameraFrame) -> Self {
        Self {
            logical_id,
            outcome: Ok(frame),
        }
    }

    pub fn err(logical_id: String, error: crate::errors::CameraError) -> Self {
        Self {
            logical_id,
            outcome: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Outcome of one device within a capture-and-persist snapshot.
#[derive(Debug)]
pub struct SnapshotResult {
    pub logical_id: String,
    /// Destination path the frame was written to, when the write succeeded.
    pub path: Option<std::path::PathBuf>,
    pub outcome: Result<(), crate::errors::CameraError>,
}
