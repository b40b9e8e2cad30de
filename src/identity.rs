//! Stable device identity.
//!
//! Physical cameras are re-recognized across scans by a deterministic
//! fingerprint of their observed properties; the registry maps fingerprints
//! to logical ids so callers never have to track volatile os indices.

use crate::errors::CameraError;
use crate::types::{DeviceDescriptor, ObservedDevice};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Deterministic digest of a probed device's properties. Two devices sharing
/// a fingerprint are treated as the same physical unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Pure function of the observed properties; the property order is fixed
    /// so the digest is reproducible across scans and processes.
    pub fn compute(
        os_index: u32,
        width: u32,
        height: u32,
        frame_rate: u32,
        backend_name: &str,
    ) -> Self {
        let canonical = format!(
            "cam_{}|backend:{}|fps:{}|height:{}|width:{}",
            os_index, backend_name, frame_rate, height, width
        );
        let digest = Sha256::digest(canonical.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Fingerprint(hex[..12].to_string())
    }

    pub fn of(observed: &ObservedDevice) -> Self {
        Self::compute(
            observed.os_index,
            observed.properties.width,
            observed.properties.height,
            observed.properties.frame_rate,
            &observed.properties.backend_name,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sort key placing logical ids in mint order: `cam_2` before `cam_10`,
/// which plain lexicographic comparison gets wrong past ten devices. Ids
/// without a numeric suffix sort after all minted ones, by string.
pub(crate) fn id_sort_key(logical_id: &str) -> (u64, String) {
    let ordinal = logical_id
        .rsplit('_')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(u64::MAX);
    (ordinal, logical_id.to_string())
}

/// How fingerprint-to-logical-id assignments survive.
///
/// `SessionLocal` keeps the table in memory: logical ids are stable from scan
/// to scan within one process run, but a restart mints fresh ids.
/// `Persisted` additionally flushes the table to a JSON file, so the same
/// physical camera keeps its id across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPolicy {
    SessionLocal,
    Persisted(PathBuf),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedTable {
    assignments: HashMap<String, String>,
    next_ordinal: u64,
}

struct RegistryState {
    assignments: HashMap<Fingerprint, String>,
    next_ordinal: u64,
    descriptors: HashMap<String, DeviceDescriptor>,
    observations: HashMap<u32, ObservedDevice>,
}

/// Owns the fingerprint table and the descriptors of the most recent scan.
///
/// Injected into the scanner, preview manager, and orchestrator rather than
/// living in a process-wide global, so the identity policy is an explicit
/// construction-time choice.
pub struct IdentityRegistry {
    policy: IdentityPolicy,
    state: Mutex<RegistryState>,
}

impl IdentityRegistry {
    pub fn new(policy: IdentityPolicy) -> Result<Self, CameraError> {
        let mut state = RegistryState {
            assignments: HashMap::new(),
            next_ordinal: 0,
            descriptors: HashMap::new(),
            observations: HashMap::new(),
        };

        if let IdentityPolicy::Persisted(path) = &policy {
            if path.exists() {
                let raw = fs::read_to_string(path)
                    .map_err(|e| CameraError::IoError(format!("identity table read: {}", e)))?;
                let table: PersistedTable = serde_json::from_str(&raw)
                    .map_err(|e| CameraError::ConfigError(format!("identity table parse: {}", e)))?;
                state.next_ordinal = table.next_ordinal;
                state.assignments = table
                    .assignments
                    .into_iter()
                    .map(|(fp, id)| (Fingerprint(fp), id))
                    .collect();
                log::info!(
                    "Loaded {} persisted identity assignments from {}",
                    state.assignments.len(),
                    path.display()
                );
            }
        }

        Ok(Self {
            policy,
            state: Mutex::new(state),
        })
    }

    pub fn session_local() -> Self {
        // SessionLocal construction touches no storage and cannot fail.
        match Self::new(IdentityPolicy::SessionLocal) {
            Ok(registry) => registry,
            Err(_) => unreachable!("session-local registry construction is infallible"),
        }
    }

    pub fn policy(&self) -> &IdentityPolicy {
        &self.policy
    }

    /// Match observed devices against prior assignments and mint logical ids
    /// for the rest, in ascending os index order so repeated scans in one run
    /// produce identical output. Returns descriptors in mint order; the
    /// previous scan's descriptor set is superseded wholesale.
    pub fn reconcile(
        &self,
        mut observed: Vec<ObservedDevice>,
    ) -> Result<Vec<DeviceDescriptor>, CameraError> {
        observed.sort_by_key(|o| o.os_index);

        let mut state = self.state.lock().expect("identity lock poisoned");
        state.observations = observed.iter().map(|o| (o.os_index, o.clone())).collect();
        let mut seen: HashSet<Fingerprint> = HashSet::new();
        let mut descriptors = Vec::with_capacity(observed.len());
        let mut minted = false;

        for device in observed {
            let fingerprint = Fingerprint::of(&device);
            if !seen.insert(fingerprint.clone()) {
                // Same fingerprint, same physical unit; keep the first sighting.
                log::debug!(
                    "Duplicate fingerprint {} at os index {}, skipping",
                    fingerprint.as_str(),
                    device.os_index
                );
                continue;
            }

            let logical_id = match state.assignments.get(&fingerprint) {
                Some(id) => id.clone(),
                None => {
                    let id = format!("cam_{}", state.next_ordinal);
                    state.next_ordinal += 1;
                    state.assignments.insert(fingerprint.clone(), id.clone());
                    minted = true;
                    log::info!(
                        "Minted logical id {} for fingerprint {} (os index {})",
                        id,
                        fingerprint.as_str(),
                        device.os_index
                    );
                    id
                }
            };

            let display_name = if device.responsive {
                format!("Camera {}", device.os_index)
            } else {
                format!("Camera {} (unresponsive)", device.os_index)
            };

            let mut descriptor = DeviceDescriptor::new(logical_id, device.os_index, display_name)
                .with_usb_ids(device.properties.vendor_id, device.properties.product_id);
            if !device.responsive {
                descriptor = descriptor.unresponsive();
            }
            descriptors.push(descriptor);
        }

        state.descriptors = descriptors
            .iter()
            .map(|d| (d.logical_id.clone(), d.clone()))
            .collect();

        if minted {
            self.persist_locked(&state)?;
        }

        descriptors.sort_by_key(|d| id_sort_key(&d.logical_id));
        Ok(descriptors)
    }

    /// The observation a given os index contributed to the most recent scan.
    /// Lets a rescan reuse the known state of an index whose handle is
    /// currently held open, instead of opening a second one.
    pub fn last_observation(&self, os_index: u32) -> Option<ObservedDevice> {
        let state = self.state.lock().expect("identity lock poisoned");
        state.observations.get(&os_index).cloned()
    }

    /// Descriptor from the most recent scan, or `IdentityNotFound` when the
    /// id was never assigned or its device was absent in the last scan.
    pub fn descriptor(&self, logical_id: &str) -> Result<DeviceDescriptor, CameraError> {
        let state = self.state.lock().expect("identity lock poisoned");
        state
            .descriptors
            .get(logical_id)
            .cloned()
            .ok_or_else(|| CameraError::identity_not_found(logical_id))
    }

    /// Logical ids present in the most recent scan, in mint order.
    pub fn known_ids(&self) -> Vec<String> {
        let state = self.state.lock().expect("identity lock poisoned");
        let mut ids: Vec<String> = state.descriptors.keys().cloned().collect();
        ids.sort_by_key(|id| id_sort_key(id));
        ids
    }

    fn persist_locked(&self, state: &RegistryState) -> Result<(), CameraError> {
        let IdentityPolicy::Persisted(path) = &self.policy else {
            return Ok(());
        };
        let table = PersistedTable {
            assignments: state
                .assignments
                .iter()
                .map(|(fp, id)| (fp.0.clone(), id.clone()))
                .collect(),
            next_ordinal: state.next_ordinal,
        };
        let raw = serde_json::to_string_pretty(&table)
            .map_err(|e| CameraError::ConfigError(format!("identity table encode: {}", e)))?;
        fs::write(path, raw)
            .map_err(|e| CameraError::IoError(format!("identity table write: {}", e)))?;
        log::debug!("Persisted identity table to {}", path.display());
        Ok(())
    }
}
