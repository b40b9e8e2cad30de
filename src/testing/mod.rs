//! Testing utilities.
//!
//! A scripted mock camera driver and synthetic frame data, enabling offline
//! testing of scanning, preview sessions, and snapshot orchestration without
//! hardware attached.

pub mod mock;

pub use mock::{DriverStats, MockDeviceSpec, MockDriver, ReadStep};

use crate::types::CameraFrame;

/// Create a synthetic RGB8 test frame with a per-index gradient pattern, so
/// frames from different devices are distinguishable in assertions.
pub fn synthetic_frame(os_index: u32, width: u32, height: u32) -> CameraFrame {
    let mut data = vec![0u8; (width * height * 3) as usize];
    let base = (os_index % 256) as u8;

    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }

    CameraFrame::new(data, width, height, os_index.to_string())
}
