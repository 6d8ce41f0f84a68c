//! Fetch → scan → build → publish, one run at a time.
//!
//! [`SyncOrchestrator::run_once`] drives a single pass of the pipeline behind a
//! one-slot gate: a caller arriving while a pass is in flight is turned away
//! with [`RunOutcome::Busy`] instead of being queued. [`SyncWorker`] owns a
//! background thread that performs passes in response to [`SyncTrigger`]
//! requests. The trigger mailbox holds at most one pending request, so a
//! burst of requests collapses into a single extra pass.
//!
//! A failed pass never touches the published snapshot; readers keep being
//! served whatever the last successful pass produced.

use crate::aggregate::{self, Build};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::render::Renderer;
use crate::scanner;
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where the documents come from and where the working copy lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Remote location handed to the fetcher (may be empty for local trees)
    pub remote: String,
    pub local_dir: PathBuf,
}

/// Summary of one successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub fetch_log: String,
    pub directories: usize,
    pub documents: usize,
    pub rendered: usize,
    pub reused: usize,
    pub failed: usize,
    pub categories: usize,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Published(SyncReport),
    /// Another pass was already running; nothing was done.
    Busy,
}

/// Running totals and the most recent results, for status reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    pub busy_drops: u64,
    pub last_success: Option<SyncReport>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Clears the running flag when a pass ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncOrchestrator {
    source: SourceConfig,
    fetcher: Box<dyn Fetcher>,
    renderer: Box<dyn Renderer>,
    store: Arc<SnapshotStore>,
    running: AtomicBool,
    status: Mutex<SyncStatus>,
}

impl SyncOrchestrator {
    pub fn new(
        source: SourceConfig,
        fetcher: impl Fetcher + 'static,
        renderer: impl Renderer + 'static,
        store: Arc<SnapshotStore>,
    ) -> Self {
        SyncOrchestrator {
            source,
            fetcher: Box::new(fetcher),
            renderer: Box::new(renderer),
            store,
            running: AtomicBool::new(false),
            status: Mutex::new(SyncStatus::default()),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        status.running = self.is_running();
        status
    }

    fn update_status(&self, update: impl FnOnce(&mut SyncStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut *status);
    }

    fn note_busy_drop(&self) {
        self.update_status(|s| s.busy_drops += 1);
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Run one full pass unless one is already in progress.
    ///
    /// Fetch and scan failures are returned; the published snapshot is left
    /// as it was. Documents that fail to render are published empty and only
    /// logged.
    pub fn run_once(&self) -> Result<RunOutcome> {
        let Some(_guard) = self.try_begin() else {
            log::warn!("Sync already in progress, dropping request");
            self.note_busy_drop();
            return Ok(RunOutcome::Busy);
        };

        let started = Instant::now();
        match self.pipeline(started) {
            Ok(report) => {
                self.update_status(|s| {
                    s.runs += 1;
                    s.last_success = Some(report.clone());
                });
                Ok(RunOutcome::Published(report))
            }
            Err(e) => {
                self.update_status(|s| {
                    s.runs += 1;
                    s.failures += 1;
                    s.last_error = Some(e.to_string());
                    s.last_error_at = Some(Utc::now());
                });
                Err(e)
            }
        }
    }

    fn pipeline(&self, started: Instant) -> Result<SyncReport> {
        let local_dir = &self.source.local_dir;

        let fetch_log = self.fetcher.fetch_latest(&self.source.remote, local_dir)?;
        if !fetch_log.is_empty() {
            log::info!("Fetch output: {fetch_log}");
        }

        let directories = scanner::scan(local_dir)?;

        let previous = self.store.current().reuse_cache();
        let Build { snapshot, report } =
            aggregate::build(&directories, &previous, self.renderer.as_ref());
        for failure in &report.failures {
            log::warn!(
                "Publishing {} ({}) without content: {}",
                failure.path.display(),
                failure.id,
                failure.error
            );
        }

        let categories = snapshot.categories().len();
        self.store.publish(snapshot);

        let elapsed = started.elapsed();
        log::info!(
            "Published {} documents in {} directories ({} rendered, {} reused, {} failed) in {:?}",
            report.documents,
            report.directories,
            report.rendered,
            report.reused,
            report.failures.len(),
            elapsed
        );

        Ok(SyncReport {
            fetch_log,
            directories: report.directories,
            documents: report.documents,
            rendered: report.rendered,
            reused: report.reused,
            failed: report.failures.len(),
            categories,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            finished_at: Utc::now(),
        })
    }
}

enum Signal {
    Sync,
    Stop,
}

/// What happened to a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A pass will start as soon as the worker is free
    Accepted,
    /// A request was already pending; this one was folded into it
    Coalesced,
    /// A pass is running; the request was dropped
    Busy,
    /// The worker has stopped
    Closed,
}

/// Cheap, cloneable handle for asking the worker to sync. Never blocks.
#[derive(Clone)]
pub struct SyncTrigger {
    tx: SyncSender<Signal>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncTrigger {
    pub fn request_sync(&self) -> TriggerOutcome {
        if self.orchestrator.is_running() {
            log::warn!("Sync worker is busy, dropping sync request");
            self.orchestrator.note_busy_drop();
            return TriggerOutcome::Busy;
        }

        match self.tx.try_send(Signal::Sync) {
            Ok(()) => {
                log::info!("Sync request accepted");
                TriggerOutcome::Accepted
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("Sync request already pending, coalescing");
                TriggerOutcome::Coalesced
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Sync worker has stopped, ignoring sync request");
                TriggerOutcome::Closed
            }
        }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }
}

/// Background thread that runs passes on request.
pub struct SyncWorker {
    trigger: SyncTrigger,
    thread: Option<JoinHandle<()>>,
}

impl SyncWorker {
    /// Start the worker. After each pass it waits `cooldown` before taking the
    /// next request, which debounces bursts of change notifications.
    pub fn start(orchestrator: Arc<SyncOrchestrator>, cooldown: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Signal>(1);
        let worker = Arc::clone(&orchestrator);

        let thread = thread::Builder::new()
            .name("docshelf-sync".to_string())
            .spawn(move || {
                while let Ok(Signal::Sync) = rx.recv() {
                    match worker.run_once() {
                        Ok(RunOutcome::Published(_)) => log::info!("Snapshot updated successfully"),
                        Ok(RunOutcome::Busy) => {}
                        Err(e) => {
                            log::error!("Sync failed, still serving the previous snapshot: {e}")
                        }
                    }
                    if !cooldown.is_zero() {
                        thread::sleep(cooldown);
                    }
                }
                log::debug!("Sync worker stopped");
            })?;

        Ok(SyncWorker {
            trigger: SyncTrigger { tx, orchestrator },
            thread: Some(thread),
        })
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Stop taking requests, let the current pass finish and join the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // Blocks only until the worker frees the mailbox slot
            let _ = self.trigger.tx.send(Signal::Stop);
            if thread.join().is_err() {
                log::error!("Sync worker panicked");
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
