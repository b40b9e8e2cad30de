//! Frame persistence collaborator.
//!
//! The acquisition subsystem's only contract with storage: something that
//! accepts a frame and a destination path. [`ImageFileSink`] is the stock
//! implementation; deployments with other stores supply their own sink.

use crate::errors::CameraError;
use crate::types::CameraFrame;
use std::fs::File;
use std::path::Path;

/// Accepts a raw frame and a destination path. Blocking; callers offload to
/// a blocking task.
pub trait FrameSink: Send + Sync {
    fn save(&self, frame: &CameraFrame, path: &Path) -> Result<(), CameraError>;
}

/// Writes frames as PNG or JPEG image files, chosen by the path's extension.
pub struct ImageFileSink {
    jpeg_quality: u8,
}

impl ImageFileSink {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

impl Default for ImageFileSink {
    fn default() -> Self {
        Self { jpeg_quality: 85 }
    }
}

impl FrameSink for ImageFileSink {
    fn save(&self, frame: &CameraFrame, path: &Path) -> Result<(), CameraError> {
        let img = image::RgbImage::from_vec(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| {
                CameraError::IoError(format!(
                    "frame data does not match {}x{} RGB8",
                    frame.width, frame.height
                ))
            })?;
        let dynamic = image::DynamicImage::ImageRgb8(img);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CameraError::IoError(format!("create output directory: {}", e)))?;
        }

        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_lowercase();
                e == "jpg" || e == "jpeg"
            })
            .unwrap_or(false);

        if is_jpeg {
            let mut file = File::create(path)
                .map_err(|e| CameraError::IoError(format!("create {}: {}", path.display(), e)))?;
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut file, self.jpeg_quality);
            dynamic
                .write_with_encoder(encoder)
                .map_err(|e| CameraError::IoError(format!("encode jpeg: {}", e)))?;
        } else {
            dynamic
                .save_with_format(path, image::ImageFormat::Png)
                .map_err(|e| CameraError::IoError(format!("encode png: {}", e)))?;
        }

        log::debug!("Frame {} written to {}", frame.id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_frame() -> CameraFrame {
        CameraFrame::new(vec![128u8; 4 * 4 * 3], 4, 4, "cam_0".to_string())
    }

    #[test]
    fn saves_png_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        ImageFileSink::default().save(&small_frame(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn saves_jpeg_for_jpg_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        ImageFileSink::new(70).save(&small_frame(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let frame = CameraFrame::new(vec![0u8; 5], 4, 4, "cam_0".to_string());
        let result = ImageFileSink::default().save(&frame, &path);
        assert!(matches!(result, Err(CameraError::IoError(_))));
    }
}
