//! Device enumeration.
//!
//! Probes os indices sequentially, confirms liveness with a real frame read,
//! and hands the surviving observations to the identity registry. Sequential
//! probing is deliberate: concurrent enumeration provokes backend-level
//! contention and false negatives on several platforms.

use crate::backend::BackendAdapter;
use crate::config::ScanConfig;
use crate::errors::CameraError;
use crate::identity::IdentityRegistry;
use crate::preview::DeviceClaims;
use crate::types::{DeviceDescriptor, ObservedDevice};
use std::sync::Arc;
use std::time::Instant;

pub struct DeviceScanner {
    adapter: Arc<BackendAdapter>,
    registry: Arc<IdentityRegistry>,
    claims: Arc<DeviceClaims>,
    config: ScanConfig,
}

impl DeviceScanner {
    pub fn new(
        adapter: Arc<BackendAdapter>,
        registry: Arc<IdentityRegistry>,
        claims: Arc<DeviceClaims>,
        config: ScanConfig,
    ) -> Self {
        Self {
            adapter,
            registry,
            claims,
            config,
        }
    }

    /// Probe indices `0..=max_os_index` and return the present devices,
    /// annotated with logical ids and ordered by logical id.
    ///
    /// A candidate only survives if one frame could actually be read from it;
    /// an index that opens but never delivers a frame is discarded. With
    /// `report_unresponsive` set, indices whose every backend attempt timed
    /// out are still reported as degraded descriptors.
    pub async fn scan(&self) -> Result<Vec<DeviceDescriptor>, CameraError> {
        let mut observed: Vec<ObservedDevice> = Vec::new();

        for os_index in 0..=self.config.max_os_index {
            // An index whose handle is held open elsewhere (a running preview
            // session or a snapshot in flight) must not be opened a second
            // time; its state from the last scan stands in for a fresh probe.
            let Some(_claim) = self.claims.try_claim(os_index) else {
                match self.registry.last_observation(os_index) {
                    Some(previous) => {
                        log::debug!(
                            "Os index {} is held open, reusing its last observation",
                            os_index
                        );
                        observed.push(previous);
                    }
                    None => {
                        log::warn!(
                            "Os index {} is held open with no prior observation, skipping",
                            os_index
                        );
                    }
                }
                continue;
            };

            let probe_start = Instant::now();

            match self.adapter.open(os_index).await {
                Ok(handle) => {
                    let read_result = self.adapter.read(&handle).await;
                    let probe_latency = probe_start.elapsed();
                    let properties = handle.properties().clone();
                    self.adapter.release(&handle).await;

                    match read_result {
                        Ok(_) => {
                            log::debug!(
                                "Probe confirmed os index {} ({}x{} @ {} via {}) in {:?}",
                                os_index,
                                properties.width,
                                properties.height,
                                properties.frame_rate,
                                properties.backend_name,
                                probe_latency
                            );
                            observed.push(ObservedDevice::new(os_index, properties, probe_latency));
                        }
                        Err(e) => {
                            log::debug!(
                                "Os index {} opened but produced no frame, discarding: {}",
                                os_index,
                                e
                            );
                        }
                    }
                }
                Err(CameraError::DeviceUnavailable { timed_out: true, .. })
                    if self.config.report_unresponsive =>
                {
                    log::warn!(
                        "Os index {} timed out on every backend, reporting as unresponsive",
                        os_index
                    );
                    observed.push(ObservedDevice::unresponsive(os_index));
                }
                Err(e) => {
                    log::debug!("Os index {} not present: {}", os_index, e);
                }
            }
        }

        if self.config.exclude_onboard {
            Self::drop_fastest(&mut observed);
        }

        let descriptors = self.registry.reconcile(observed)?;
        log::info!("Scan found {} device(s)", descriptors.len());
        Ok(descriptors)
    }

    /// Onboard-camera heuristic: the integrated camera answers its probe far
    /// faster than purpose-mounted external devices, so drop the single
    /// fastest responder. Only applies when at least two devices answered.
    fn drop_fastest(observed: &mut Vec<ObservedDevice>) {
        let responsive = observed.iter().filter(|o| o.responsive).count();
        if responsive < 2 {
            return;
        }

        let fastest = observed
            .iter()
            .enumerate()
            .filter(|(_, o)| o.responsive)
            .min_by_key(|(_, o)| o.probe_latency)
            .map(|(i, _)| i);

        if let Some(index) = fastest {
            let dropped = observed.remove(index);
            log::info!(
                "Excluding fastest-responding os index {} ({:?}) as onboard camera",
                dropped.os_index,
                dropped.probe_latency
            );
        }
    }
}
