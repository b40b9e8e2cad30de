//! Scripted mock camera driver.
//!
//! Devices are declared per os index with optional open delays, refusals,
//! and read scripts. The driver instruments every open and release so tests
//! can assert the single-open-handle invariant directly.

use crate::backend::{BackendKind, CameraDevice, CameraDriver, OpenSettings};
use crate::errors::CameraError;
use crate::testing::synthetic_frame;
use crate::types::{CameraFrame, DeviceProperties};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted read outcome. When a device's script runs out, its
/// `after_script` step repeats forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    Frame,
    Fail,
}

/// Declarative behavior of one mock device.
pub struct MockDeviceSpec {
    width: u32,
    height: u32,
    frame_rate: u32,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
    /// Blocking delay inside open, to exercise the adapter's timeout path.
    open_delay: Option<Duration>,
    refuse_open: bool,
    /// Refuse the native backend so opens fall through to the generic one.
    fail_native: bool,
    script: Arc<Mutex<VecDeque<ReadStep>>>,
    after_script: ReadStep,
}

impl MockDeviceSpec {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            vendor_id: None,
            product_id: None,
            open_delay: None,
            refuse_open: false,
            fail_native: false,
            script: Arc::new(Mutex::new(VecDeque::new())),
            after_script: ReadStep::Frame,
        }
    }

    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn refusing_open(mut self) -> Self {
        self.refuse_open = true;
        self
    }

    pub fn failing_native_backend(mut self) -> Self {
        self.fail_native = true;
        self
    }

    pub fn with_read_script(self, steps: Vec<ReadStep>) -> Self {
        self.script.lock().expect("script lock").extend(steps);
        self
    }

    pub fn with_after_script(mut self, step: ReadStep) -> Self {
        self.after_script = step;
        self
    }
}

/// Open/read/release instrumentation shared by all devices of one driver.
#[derive(Default)]
pub struct DriverStats {
    opens: AtomicUsize,
    releases: AtomicUsize,
    reads: AtomicUsize,
    double_opens: AtomicUsize,
    currently_open: Mutex<HashSet<u32>>,
}

impl DriverStats {
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Times a device was opened while already holding an open handle. Any
    /// nonzero value is a violation of the single-handle invariant.
    pub fn double_open_count(&self) -> usize {
        self.double_opens.load(Ordering::SeqCst)
    }

    pub fn open_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self
            .currently_open
            .lock()
            .expect("stats lock")
            .iter()
            .copied()
            .collect();
        indices.sort_unstable();
        indices
    }
}

pub struct MockDriver {
    devices: Mutex<HashMap<u32, MockDeviceSpec>>,
    stats: Arc<DriverStats>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            stats: Arc::new(DriverStats::default()),
        }
    }

    pub fn with_device(self, os_index: u32, spec: MockDeviceSpec) -> Self {
        self.devices.lock().expect("devices lock").insert(os_index, spec);
        self
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        self.stats.clone()
    }

    /// Toggle open refusal for a device, e.g. to unplug it between a scan
    /// and a capture.
    pub fn set_refuse_open(&self, os_index: u32, refuse: bool) {
        let mut devices = self.devices.lock().expect("devices lock");
        if let Some(spec) = devices.get_mut(&os_index) {
            spec.refuse_open = refuse;
        }
    }

    /// Replace the remaining read script of a device. Scripted steps are
    /// shared with already-open handles; the after-script default takes
    /// effect from the next open.
    pub fn set_read_script(&self, os_index: u32, steps: Vec<ReadStep>, after: ReadStep) {
        let mut devices = self.devices.lock().expect("devices lock");
        if let Some(spec) = devices.get_mut(&os_index) {
            let mut script = spec.script.lock().expect("script lock");
            script.clear();
            script.extend(steps);
            spec.after_script = after;
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraDriver for MockDriver {
    fn backend_order(&self) -> Vec<BackendKind> {
        vec![BackendKind::Native, BackendKind::Auto]
    }

    fn open(
        &self,
        backend: BackendKind,
        os_index: u32,
        _settings: &OpenSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError> {
        let (properties, script, after_script, delay) = {
            let devices = self.devices.lock().expect("devices lock");
            let spec = devices
                .get(&os_index)
                .ok_or_else(|| CameraError::unavailable(os_index, false))?;

            if spec.refuse_open {
                return Err(CameraError::unavailable(os_index, false));
            }
            if spec.fail_native && backend == BackendKind::Native {
                return Err(CameraError::unavailable(os_index, false));
            }

            (
                DeviceProperties {
                    width: spec.width,
                    height: spec.height,
                    frame_rate: spec.frame_rate,
                    backend_name: format!("Mock{:?}", backend),
                    vendor_id: spec.vendor_id,
                    product_id: spec.product_id,
                },
                spec.script.clone(),
                spec.after_script,
                spec.open_delay,
            )
        };

        // Outside the devices lock so a wedged device stalls only itself.
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if !self
            .stats
            .currently_open
            .lock()
            .expect("stats lock")
            .insert(os_index)
        {
            self.stats.double_opens.fetch_add(1, Ordering::SeqCst);
        }

        Ok(Box::new(MockDevice {
            os_index,
            properties,
            script,
            after_script,
            stats: self.stats.clone(),
            released: false,
        }))
    }
}

struct MockDevice {
    os_index: u32,
    properties: DeviceProperties,
    script: Arc<Mutex<VecDeque<ReadStep>>>,
    after_script: ReadStep,
    stats: Arc<DriverStats>,
    released: bool,
}

impl CameraDevice for MockDevice {
    fn read_frame(&mut self) -> Result<CameraFrame, CameraError> {
        if self.released {
            return Err(CameraError::read_failure("mock device released"));
        }
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        let step = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(self.after_script);

        match step {
            ReadStep::Frame => Ok(synthetic_frame(
                self.os_index,
                self.properties.width,
                self.properties.height,
            )),
            ReadStep::Fail => Err(CameraError::read_failure(format!(
                "injected read failure on index {}",
                self.os_index
            ))),
        }
    }

    fn properties(&self) -> DeviceProperties {
        self.properties.clone()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        self.stats
            .currently_open
            .lock()
            .expect("stats lock")
            .remove(&self.os_index);
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.release();
    }
}
