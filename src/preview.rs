//! Preview session management.
//!
//! One continuous capture loop per device, multiplexed to any number of
//! frame consumers. Consumers poll the cached latest frame; the hardware is
//! read exactly once per cadence tick no matter how many of them there are.
//!
//! Session lifecycle per logical id: Idle -> Starting -> Running, then either
//! an explicit `stop` back to Idle or self-termination after the consecutive
//! failure threshold. A self-terminated session is never resurrected
//! silently; the caller must issue a new `start`.
//!
//! The os_index -> open handle relation is tracked by [`DeviceClaims`]:
//! session starts, one-shot transient opens (via [`acquire_source`]), and
//! scan probes all take a claim first, the single gate that keeps any device
//! from ever being opened twice.
//!
//! [`acquire_source`]: PreviewManager::acquire_source

use crate::backend::{BackendAdapter, DeviceHandle};
use crate::config::PreviewConfig;
use crate::errors::CameraError;
use crate::identity::IdentityRegistry;
use crate::types::CameraFrame;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as SyncMutex, RwLock as SyncRwLock};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Marks an os index as holding an open handle; the mark clears on drop.
pub struct UsageGuard {
    os_index: u32,
    in_use: Arc<SyncMutex<HashSet<u32>>>,
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_use.lock() {
            set.remove(&self.os_index);
        }
    }
}

/// The set of os indices currently holding an open device handle.
///
/// One instance is shared by every component that opens devices: whoever
/// holds the claim for an index is the only party allowed to open it, so at
/// most one handle is ever live per index. Constructed once and injected,
/// like the identity registry.
#[derive(Default)]
pub struct DeviceClaims {
    in_use: Arc<SyncMutex<HashSet<u32>>>,
}

impl DeviceClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an index for opening. `None` means another open is in flight or
    /// a handle is already live; the claim clears when the guard drops.
    pub fn try_claim(&self, os_index: u32) -> Option<UsageGuard> {
        let mut set = self.in_use.lock().ok()?;
        if set.insert(os_index) {
            Some(UsageGuard {
                os_index,
                in_use: self.in_use.clone(),
            })
        } else {
            None
        }
    }
}

/// Where a one-shot capture should take its frame from.
pub enum CaptureSource {
    /// Active session with a cached frame; no hardware touch needed.
    CachedFrame(CameraFrame),
    /// Active session that has not cached a frame yet; read once on the
    /// borrowed handle and do not release it.
    SessionRead(DeviceHandle),
    /// No session: a freshly opened handle the caller must release, plus the
    /// usage guard keeping the index claimed until then.
    Transient(DeviceHandle, UsageGuard),
}

struct SessionEntry {
    handle: DeviceHandle,
    latest: Arc<SyncRwLock<Option<CameraFrame>>>,
    failures: Arc<AtomicU32>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    // Holds the os index claim for the session's lifetime.
    _usage: UsageGuard,
}

/// Owns all live preview sessions and their capture loops.
pub struct PreviewManager {
    adapter: Arc<BackendAdapter>,
    registry: Arc<IdentityRegistry>,
    claims: Arc<DeviceClaims>,
    config: PreviewConfig,
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl PreviewManager {
    pub fn new(
        adapter: Arc<BackendAdapter>,
        registry: Arc<IdentityRegistry>,
        claims: Arc<DeviceClaims>,
        config: PreviewConfig,
    ) -> Self {
        Self {
            adapter,
            registry,
            claims,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start a preview session. Idempotent: `Ok(true)` if one is already
    /// running. `Ok(false)` means the device could not be opened, either
    /// because no backend answered or because a one-shot capture currently
    /// holds its handle. `IdentityNotFound` means the id has no mapping and
    /// the caller must rescan.
    pub async fn start(&self, logical_id: &str) -> Result<bool, CameraError> {
        let descriptor = self.registry.descriptor(logical_id)?;

        if self.sessions.read().await.contains_key(logical_id) {
            log::debug!("Preview for {} already active", logical_id);
            return Ok(true);
        }

        // The usage claim is the gate: whoever holds it is the only party
        // allowed to open this index. The sessions lock itself is never held
        // across an open, so one slow device cannot stall work on others.
        let Some(usage) = self.claims.try_claim(descriptor.os_index) else {
            if self.sessions.read().await.contains_key(logical_id) {
                return Ok(true);
            }
            log::warn!(
                "Cannot start preview for {}: os index {} is held by another open",
                logical_id,
                descriptor.os_index
            );
            return Ok(false);
        };

        let handle = match self.adapter.open(descriptor.os_index).await {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to open {} for preview: {}", logical_id, e);
                return Ok(false);
            }
        };

        let latest = Arc::new(SyncRwLock::new(None));
        let failures = Arc::new(AtomicU32::new(0));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(Self::capture_loop(
            self.adapter.clone(),
            self.sessions.clone(),
            logical_id.to_string(),
            handle.clone(),
            latest.clone(),
            failures.clone(),
            stop_rx,
            self.config.clone(),
        ));

        self.sessions.write().await.insert(
            logical_id.to_string(),
            SessionEntry {
                handle,
                latest,
                failures,
                stop_tx,
                task,
                _usage: usage,
            },
        );

        log::info!(
            "Started preview for {} (os index {})",
            logical_id,
            descriptor.os_index
        );
        Ok(true)
    }

    /// Stop a session: cancel its loop, wait for acknowledgement, release the
    /// handle, drop the cached frame. Safe to call on an idle id.
    pub async fn stop(&self, logical_id: &str) {
        let entry = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(logical_id)
        };

        let Some(entry) = entry else {
            log::debug!("Stop requested for idle session {}", logical_id);
            return;
        };

        let _ = entry.stop_tx.send(true);
        // The loop observes cancellation at its next tick; waiting for it
        // prevents a release-while-reading race.
        if let Err(e) = entry.task.await {
            log::warn!("Capture loop for {} ended abnormally: {}", logical_id, e);
        }
        self.adapter.release(&entry.handle).await;

        log::info!("Stopped preview for {}", logical_id);
    }

    /// Stop every active session. Used on shutdown.
    pub async fn stop_all(&self) {
        for logical_id in self.active_ids().await {
            self.stop(&logical_id).await;
        }
    }

    /// Most recently cached frame. Never touches hardware; any number of
    /// pollers can call this concurrently.
    pub async fn get_latest_frame(&self, logical_id: &str) -> Option<CameraFrame> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(logical_id)?;
        entry.latest.read().map(|g| g.clone()).unwrap_or(None)
    }

    pub async fn is_active(&self, logical_id: &str) -> bool {
        self.sessions.read().await.contains_key(logical_id)
    }

    /// Logical ids with a running session, in mint order.
    pub async fn active_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort_by_key(|id| crate::identity::id_sort_key(id));
        ids
    }

    /// Current consecutive failure count, `None` when the session is idle.
    pub async fn consecutive_failures(&self, logical_id: &str) -> Option<u32> {
        let sessions = self.sessions.read().await;
        sessions
            .get(logical_id)
            .map(|e| e.failures.load(Ordering::Relaxed))
    }

    /// The single gating function for one-shot captures.
    ///
    /// Prefers an active session (cached frame first, else a borrow of the
    /// session's handle); only when none exists is a transient handle opened,
    /// under the same usage claim `start` takes, so a device is never opened
    /// twice. An open already in flight for the same index reports the
    /// device as busy via `ReadFailure`.
    pub async fn acquire_source(&self, logical_id: &str) -> Result<CaptureSource, CameraError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(logical_id) {
                let cached = entry.latest.read().map(|g| g.clone()).unwrap_or(None);
                return Ok(match cached {
                    Some(frame) => CaptureSource::CachedFrame(frame),
                    None => CaptureSource::SessionRead(entry.handle.clone()),
                });
            }
        }

        let descriptor = self.registry.descriptor(logical_id)?;
        let Some(usage) = self.claims.try_claim(descriptor.os_index) else {
            return Err(CameraError::read_failure(format!(
                "os index {} busy with another open",
                descriptor.os_index
            )));
        };

        // Claim held: neither a session start nor another transient can open
        // this index until the guard drops.
        let handle = self.adapter.open(descriptor.os_index).await?;
        Ok(CaptureSource::Transient(handle, usage))
    }

    #[allow(clippy::too_many_arguments)]
    async fn capture_loop(
        adapter: Arc<BackendAdapter>,
        sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
        logical_id: String,
        handle: DeviceHandle,
        latest: Arc<SyncRwLock<Option<CameraFrame>>>,
        failures: Arc<AtomicU32>,
        mut stop_rx: watch::Receiver<bool>,
        config: PreviewConfig,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(config.cadence_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    // Cancelled by stop(); the stopper releases the handle
                    // once this task has returned.
                    log::debug!("Capture loop for {} cancelled", logical_id);
                    return;
                }
                _ = ticker.tick() => {}
            }

            match adapter.read(&handle).await {
                Ok(frame) => {
                    let frame = frame.with_source(logical_id.clone());
                    if let Ok(mut slot) = latest.write() {
                        *slot = Some(frame);
                    }
                    failures.store(0, Ordering::Relaxed);
                }
                Err(e) => {
                    let count = failures.fetch_add(1, Ordering::Relaxed) + 1;
                    log::debug!(
                        "Read failure {}/{} on preview {}: {}",
                        count,
                        config.failure_threshold,
                        logical_id,
                        e
                    );

                    if count >= config.failure_threshold {
                        log::warn!(
                            "Preview {} self-terminating after {} consecutive read failures",
                            logical_id,
                            count
                        );
                        // Release before clearing the usage claim (held by
                        // the session entry) so the index can never be
                        // reopened against a still-live handle. Dropping our
                        // own JoinHandle here simply detaches the task.
                        adapter.release(&handle).await;
                        sessions.write().await.remove(&logical_id);
                        return;
                    }
                }
            }
        }
    }
}
