//! Multi-device snapshot orchestration.
//!
//! Produces one fresh frame per requested device, all devices in parallel,
//! with per-device failure isolation. Devices with an active preview session
//! are served from that session (cached frame first, then one direct read on
//! the borrowed handle); everything else gets a transient open/read/release.

use crate::backend::BackendAdapter;
use crate::errors::CameraError;
use crate::preview::{CaptureSource, PreviewManager};
use crate::storage::FrameSink;
use crate::types::{CaptureResult, SnapshotResult};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct CaptureOrchestrator {
    adapter: Arc<BackendAdapter>,
    preview: Arc<PreviewManager>,
}

impl CaptureOrchestrator {
    pub fn new(adapter: Arc<BackendAdapter>, preview: Arc<PreviewManager>) -> Self {
        Self { adapter, preview }
    }

    /// Capture one frame from every target, concurrently.
    ///
    /// Always returns exactly one result per requested id, in request order.
    /// A slow or failing device never delays the others, and partial success
    /// is normal: each entry carries its own outcome.
    pub async fn capture_many(&self, targets: &[String]) -> Vec<CaptureResult> {
        let mut tasks = Vec::with_capacity(targets.len());
        for logical_id in targets {
            let adapter = self.adapter.clone();
            let preview = self.preview.clone();
            let id = logical_id.clone();
            tasks.push((
                logical_id.clone(),
                tokio::spawn(async move { Self::capture_one(adapter, preview, id).await }),
            ));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (logical_id, task) in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    results.push(CaptureResult::err(
                        logical_id,
                        CameraError::TaskError(e.to_string()),
                    ));
                }
            }
        }
        results
    }

    /// Capture from every target and persist each frame through `sink`,
    /// naming files `<logical_id>_<timestamp>.<ext>` with one shared
    /// timestamp for the whole snapshot.
    pub async fn capture_all_to_sink(
        &self,
        targets: &[String],
        sink: Arc<dyn FrameSink>,
        output_dir: &Path,
        extension: &str,
    ) -> Vec<SnapshotResult> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let results = self.capture_many(targets).await;

        let mut snapshots = Vec::with_capacity(results.len());
        for result in results {
            let logical_id = result.logical_id;
            match result.outcome {
                Ok(frame) => {
                    let path: PathBuf =
                        output_dir.join(format!("{}_{}.{}", logical_id, timestamp, extension));
                    let sink = sink.clone();
                    let write_path = path.clone();
                    let write = tokio::task::spawn_blocking(move || sink.save(&frame, &write_path))
                        .await
                        .map_err(|e| CameraError::TaskError(e.to_string()))
                        .and_then(|r| r);

                    match write {
                        Ok(()) => {
                            log::info!("Captured {} to {}", logical_id, path.display());
                            snapshots.push(SnapshotResult {
                                logical_id,
                                path: Some(path),
                                outcome: Ok(()),
                            });
                        }
                        Err(e) => {
                            log::error!("Failed to persist frame from {}: {}", logical_id, e);
                            snapshots.push(SnapshotResult {
                                logical_id,
                                path: Some(path),
                                outcome: Err(e),
                            });
                        }
                    }
                }
                Err(e) => snapshots.push(SnapshotResult {
                    logical_id,
                    path: None,
                    outcome: Err(e),
                }),
            }
        }
        snapshots
    }

    async fn capture_one(
        adapter: Arc<BackendAdapter>,
        preview: Arc<PreviewManager>,
        logical_id: String,
    ) -> CaptureResult {
        let source = match preview.acquire_source(&logical_id).await {
            Ok(source) => source,
            Err(e) => return CaptureResult::err(logical_id, e),
        };

        match source {
            CaptureSource::CachedFrame(frame) => {
                log::debug!("Snapshot cache hit for {}", logical_id);
                CaptureResult::ok(logical_id, frame)
            }
            CaptureSource::SessionRead(handle) => {
                // Session just started and has no frame yet; one direct read
                // on the borrowed handle, which the session keeps owning.
                match adapter.read(&handle).await {
                    Ok(frame) => {
                        let frame = frame.with_source(logical_id.clone());
                        CaptureResult::ok(logical_id, frame)
                    }
                    Err(e) => CaptureResult::err(logical_id, e),
                }
            }
            CaptureSource::Transient(handle, _usage) => {
                // Released on both outcomes below; the handle's drop guard
                // covers caller cancellation in between.
                let read_result = adapter.read(&handle).await;
                adapter.release(&handle).await;

                match read_result {
                    Ok(frame) => {
                        let frame = frame.with_source(logical_id.clone());
                        log::debug!("Transient snapshot read from {}", logical_id);
                        CaptureResult::ok(logical_id, frame)
                    }
                    Err(e) => CaptureResult::err(logical_id, e),
                }
            }
        }
    }

    /// Convenience view of a bulk result for presentation layers:
    /// (succeeded, total, error messages).
    pub fn summarize(results: &[CaptureResult]) -> (usize, usize, Vec<String>) {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let errors = results
            .iter()
            .filter_map(|r| {
                r.outcome
                    .as_ref()
                    .err()
                    .map(|e| format!("{}: {}", r.logical_id, e))
            })
            .collect();
        (succeeded, total, errors)
    }
}
