//! Production camera driver backed by nokhwa.

use crate::backend::{BackendKind, CameraDevice, CameraDriver, OpenSettings};
use crate::errors::CameraError;
use crate::types::{CameraFrame, DeviceProperties, ExposureMode, FrameCodec};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat as HardwareFormat, CameraIndex, ControlValueSetter, FrameFormat,
    KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

/// Driver that opens devices through nokhwa's native platform backends.
#[derive(Default)]
pub struct NokhwaDriver;

impl NokhwaDriver {
    pub fn new() -> Self {
        Self
    }

    fn api_backend(kind: BackendKind) -> ApiBackend {
        match kind {
            BackendKind::Auto => ApiBackend::Auto,
            BackendKind::Native => {
                #[cfg(target_os = "windows")]
                {
                    ApiBackend::MediaFoundation
                }
                #[cfg(target_os = "linux")]
                {
                    ApiBackend::Video4Linux
                }
                #[cfg(target_os = "macos")]
                {
                    ApiBackend::AVFoundation
                }
                #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
                {
                    ApiBackend::Auto
                }
            }
        }
    }

    fn frame_format(codec: FrameCodec) -> FrameFormat {
        match codec {
            FrameCodec::Mjpeg => FrameFormat::MJPEG,
            FrameCodec::Yuyv => FrameFormat::YUYV,
            FrameCodec::RawRgb => FrameFormat::RAWRGB,
        }
    }
}

impl CameraDriver for NokhwaDriver {
    fn backend_order(&self) -> Vec<BackendKind> {
        vec![BackendKind::Native, BackendKind::Auto]
    }

    fn open(
        &self,
        backend: BackendKind,
        os_index: u32,
        settings: &OpenSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError> {
        let api = Self::api_backend(backend);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            HardwareFormat::new(
                Resolution::new(settings.width, settings.height),
                Self::frame_format(settings.codec),
                settings.frame_rate,
            ),
        ));

        let mut camera = Camera::with_backend(CameraIndex::Index(os_index), requested, api)
            .map_err(|e| {
                log::debug!("nokhwa open failed for index {} via {:?}: {}", os_index, api, e);
                CameraError::unavailable(os_index, false)
            })?;

        // Exposure rides along with the batched open configuration. Control
        // support varies per driver, so a refusal is not an open failure.
        if let ExposureMode::Manual(value) = settings.exposure {
            if let Err(e) =
                camera.set_camera_control(KnownCameraControl::Exposure, ControlValueSetter::Integer(value))
            {
                log::warn!("Manual exposure rejected by os index {}: {}", os_index, e);
            }
        }
        if settings.buffer_depth > 1 {
            log::debug!(
                "Buffer depth {} requested; nokhwa manages its own buffering",
                settings.buffer_depth
            );
        }

        camera
            .open_stream()
            .map_err(|_| CameraError::unavailable(os_index, false))?;

        let resolution = camera.resolution();
        let properties = DeviceProperties {
            width: resolution.width_x,
            height: resolution.height_y,
            frame_rate: camera.frame_rate(),
            backend_name: format!("{:?}", api),
            vendor_id: None,
            product_id: None,
        };

        Ok(Box::new(NokhwaDevice {
            camera: Some(camera),
            properties,
            os_index,
        }))
    }
}

struct NokhwaDevice {
    camera: Option<Camera>,
    properties: DeviceProperties,
    os_index: u32,
}

impl CameraDevice for NokhwaDevice {
    fn read_frame(&mut self) -> Result<CameraFrame, CameraError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| CameraError::read_failure("device already released"))?;

        let buffer = camera
            .frame()
            .map_err(|e| CameraError::read_failure(format!("frame grab failed: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::read_failure(format!("frame decode failed: {}", e)))?;

        let (width, height) = decoded.dimensions();
        Ok(CameraFrame::new(
            decoded.into_raw(),
            width,
            height,
            self.os_index.to_string(),
        ))
    }

    fn properties(&self) -> DeviceProperties {
        self.properties.clone()
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::debug!("stop_stream on os index {} failed: {}", self.os_index, e);
            }
        }
    }
}

impl Drop for NokhwaDevice {
    fn drop(&mut self) {
        self.release();
    }
}
