//! Configuration for the acquisition subsystem.
//!
//! The crate consumes this configuration; it does not own where it comes
//! from. A TOML file can be loaded and saved for deployments that want one,
//! with typed sections, defaults, and validation.

use crate::backend::OpenSettings;
use crate::errors::CameraError;
use crate::identity::IdentityPolicy;
use crate::types::{ExposureMode, FrameCodec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigConfig {
    pub capture: CaptureConfig,
    pub scan: ScanConfig,
    pub preview: PreviewConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
}

/// Target format and device settings applied at open time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Requested resolution [width, height].
    pub resolution: [u32; 2],
    pub frame_rate: u32,
    /// Driver buffer depth; 1 keeps preview latency low.
    pub buffer_depth: u32,
    pub codec: FrameCodec,
    pub exposure: ExposureMode,
}

/// Device enumeration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Highest os index probed, inclusive.
    pub max_os_index: u32,
    /// Timeout applied to every backend attempt, for every device alike.
    pub attempt_timeout_ms: u64,
    /// Drop the single fastest-responding device. Heuristic for rigs whose
    /// host has an onboard camera next to the purpose-mounted ones.
    pub exclude_onboard: bool,
    /// Report indices whose every backend attempt timed out as degraded
    /// descriptors instead of dropping them.
    pub report_unresponsive: bool,
}

/// Preview capture loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Milliseconds between reads; 33 gives roughly 30 reads per second.
    pub cadence_ms: u64,
    /// Consecutive read failures after which a session terminates itself.
    pub failure_threshold: u32,
}

/// Identity assignment policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// True: fingerprint table is written to `table_path` and ids survive
    /// process restarts. False: ids are stable only within one process run.
    pub persist: bool,
    pub table_path: String,
}

/// Snapshot persistence settings for the file sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub output_directory: String,
    /// "png" or "jpeg".
    pub image_format: String,
    pub jpeg_quality: u8,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                resolution: [1280, 720],
                frame_rate: 30,
                buffer_depth: 1,
                codec: FrameCodec::Mjpeg,
                exposure: ExposureMode::Auto,
            },
            scan: ScanConfig {
                max_os_index: 15,
                attempt_timeout_ms: 10_000,
                exclude_onboard: false,
                report_unresponsive: false,
            },
            preview: PreviewConfig {
                cadence_ms: 33,
                failure_threshold: 10,
            },
            identity: IdentityConfig {
                persist: false,
                table_path: "camrig_identity.json".to_string(),
            },
            storage: StorageConfig {
                output_directory: "./captures".to_string(),
                image_format: "png".to_string(),
                jpeg_quality: 85,
            },
        }
    }
}

impl RigConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config file: {}", e)))?;
        let config: RigConfig = toml::from_str(&contents)
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| CameraError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)
            .map_err(|e| CameraError::ConfigError(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("camrig.toml")
    }

    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capture.resolution[0] == 0 || self.capture.resolution[1] == 0 {
            return Err("Invalid capture resolution".to_string());
        }
        if self.capture.frame_rate == 0 || self.capture.frame_rate > 240 {
            return Err("Invalid frame rate (must be 1-240)".to_string());
        }
        if self.capture.buffer_depth == 0 {
            return Err("Buffer depth must be at least 1".to_string());
        }
        if self.scan.attempt_timeout_ms == 0 {
            return Err("Backend attempt timeout must be non-zero".to_string());
        }
        if self.preview.cadence_ms == 0 {
            return Err("Preview cadence must be non-zero".to_string());
        }
        if self.preview.failure_threshold == 0 {
            return Err("Failure threshold must be at least 1".to_string());
        }
        if self.storage.image_format != "png" && self.storage.image_format != "jpeg" {
            return Err("Image format must be png or jpeg".to_string());
        }
        if self.storage.jpeg_quality == 0 || self.storage.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        Ok(())
    }

    /// Batched device settings derived from the capture section.
    pub fn open_settings(&self) -> OpenSettings {
        OpenSettings {
            width: self.capture.resolution[0],
            height: self.capture.resolution[1],
            frame_rate: self.capture.frame_rate,
            buffer_depth: self.capture.buffer_depth,
            codec: self.capture.codec,
            exposure: self.capture.exposure,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.attempt_timeout_ms)
    }

    pub fn preview_cadence(&self) -> Duration {
        Duration::from_millis(self.preview.cadence_ms)
    }

    pub fn identity_policy(&self) -> IdentityPolicy {
        if self.identity.persist {
            IdentityPolicy::Persisted(PathBuf::from(&self.identity.table_path))
        } else {
            IdentityPolicy::SessionLocal
        }
    }
}
