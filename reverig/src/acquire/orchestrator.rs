//! Acquisition orchestrator.
//!
//! Each start launches one worker thread that walks the source list in order,
//! downloads the first archive a source provides and installs it. Progress is
//! published through the shared [`StateStore`]; callers poll it.
//!
//! ```text
//! queued ─► checking ─┬─► downloading ─► processing ─► installing ─► done
//!              ▲      │        │              │             │
//!              └──────┴────────┘              └─────────────┴──► failed
//!   (next source on 404 / error)
//! ```
//!
//! Workers are registered by app id. Starting an id that is still in flight
//! cancels the old worker and replaces it; the replacement waits for the old
//! thread to exit before touching the archive path.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{AcquireFailure, StartError};
use super::fetch::{remove_archive, ArchiveFetcher, FetchOutcome, FetchProgress};
use super::sources::SourceList;
use super::state::{AcquisitionState, AcquisitionStatus, StateStore, StateUpdate, UpdateOutcome};
use crate::install::{InstallReport, Installer};

/// Settings for an [`Acquirer`].
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    /// Sources tried for every acquisition, in order.
    pub sources: SourceList,
    /// Directory where `<id>.zip` archives are staged.
    pub download_dir: PathBuf,
    /// Whether to leave the archive in place after processing.
    pub keep_archives: bool,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            sources: SourceList::default(),
            download_dir: std::env::temp_dir().join("reverig"),
            keep_archives: true,
        }
    }
}

impl AcquirerConfig {
    /// Set the source list.
    pub fn with_sources(mut self, sources: SourceList) -> Self {
        self.sources = sources;
        self
    }

    /// Set the staging directory.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set whether archives are kept after processing.
    pub fn with_keep_archives(mut self, keep: bool) -> Self {
        self.keep_archives = keep;
        self
    }

    /// Staging path for an app's archive.
    pub fn archive_path(&self, app_id: u32) -> PathBuf {
        self.download_dir.join(format!("{}.zip", app_id))
    }
}

struct TaskHandle {
    token: CancellationToken,
    generation: u64,
    thread: JoinHandle<()>,
}

/// Runs acquisitions and tracks their workers.
pub struct Acquirer {
    config: AcquirerConfig,
    store: Arc<StateStore>,
    fetcher: Mutex<Option<Arc<dyn ArchiveFetcher>>>,
    installer: Installer,
    tasks: Mutex<HashMap<u32, TaskHandle>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("config", &self.config)
            .field("active", &self.tasks.lock().len())
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Acquirer {
    /// Create an acquirer.
    ///
    /// The fetcher is shared by every worker and released by [`shutdown`].
    ///
    /// [`shutdown`]: Acquirer::shutdown
    pub fn new(
        config: AcquirerConfig,
        store: Arc<StateStore>,
        fetcher: Arc<dyn ArchiveFetcher>,
        installer: Installer,
    ) -> Self {
        Self {
            config,
            store,
            fetcher: Mutex::new(Some(fetcher)),
            installer,
            tasks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// The state store workers publish into.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn config(&self) -> &AcquirerConfig {
        &self.config
    }

    /// Start acquiring `app_id` and return immediately.
    ///
    /// The record is reset to `queued` before this returns. Returns the
    /// generation of the new run.
    pub fn start(&self, app_id: u32) -> Result<u64, StartError> {
        if self.shutdown.is_cancelled() {
            return Err(StartError::ShutDown);
        }
        let fetcher = self.fetcher.lock().clone().ok_or(StartError::ShutDown)?;

        let dest = self.config.archive_path(app_id);
        let mut tasks = self.tasks.lock();

        let previous = tasks.remove(&app_id).map(|prev| {
            if !prev.thread.is_finished() {
                info!(
                    app_id,
                    generation = prev.generation,
                    "replacing in-flight acquisition"
                );
            }
            prev.token.cancel();
            prev.thread
        });

        let generation = self
            .store
            .reset(app_id, AcquisitionState::queued(dest.display().to_string()));
        let token = self.shutdown.child_token();

        let worker = Worker {
            app_id,
            generation,
            urls: self.config.sources.urls_for(app_id),
            dest,
            keep_archives: self.config.keep_archives,
            store: Arc::clone(&self.store),
            fetcher,
            installer: self.installer.clone(),
            cancel: token.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("acquire-{}", app_id))
            .spawn(move || worker.run(previous))
            .map_err(|e| {
                self.store.update_owned(
                    app_id,
                    generation,
                    StateUpdate::status(AcquisitionStatus::Failed).with_error(e.to_string()),
                );
                StartError::Spawn(e)
            })?;

        tasks.insert(
            app_id,
            TaskHandle {
                token,
                generation,
                thread,
            },
        );
        Ok(generation)
    }

    /// Current state for `app_id`.
    pub fn status(&self, app_id: u32) -> AcquisitionState {
        self.store.get(app_id)
    }

    /// Whether a worker for `app_id` is still running.
    pub fn is_active(&self, app_id: u32) -> bool {
        self.tasks
            .lock()
            .get(&app_id)
            .map(|t| !t.thread.is_finished())
            .unwrap_or(false)
    }

    /// Signal the worker for `app_id` to stop.
    ///
    /// Returns whether a running worker was signalled. The record moves to
    /// `cancelled` once the worker notices.
    pub fn cancel(&self, app_id: u32) -> bool {
        match self.tasks.lock().get(&app_id) {
            Some(task) if !task.thread.is_finished() => {
                info!(app_id, generation = task.generation, "cancelling acquisition");
                task.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every worker, wait for them to exit and release the fetcher.
    ///
    /// Later starts fail with [`StartError::ShutDown`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let tasks: Vec<(u32, TaskHandle)> = self.tasks.lock().drain().collect();
        for (app_id, task) in tasks {
            if task.thread.join().is_err() {
                warn!(app_id, "acquisition worker panicked");
            }
        }
        self.fetcher.lock().take();
        info!("acquirer shut down");
    }
}

impl Drop for Acquirer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One acquisition run, owned by its worker thread.
struct Worker {
    app_id: u32,
    generation: u64,
    urls: Vec<String>,
    dest: PathBuf,
    keep_archives: bool,
    store: Arc<StateStore>,
    fetcher: Arc<dyn ArchiveFetcher>,
    installer: Installer,
    cancel: CancellationToken,
}

impl Worker {
    fn run(self, previous: Option<JoinHandle<()>>) {
        if let Some(previous) = previous {
            if previous.join().is_err() {
                warn!(app_id = self.app_id, "replaced acquisition worker panicked");
            }
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.acquire()))
            .unwrap_or_else(|payload| {
                remove_archive(&self.dest);
                Err(AcquireFailure::Aborted(panic_message(payload.as_ref())))
            });

        let update = match result {
            Ok(report) => StateUpdate::status(AcquisitionStatus::Done)
                .with_installed_path(report.installed_path.display().to_string())
                .with_success(true),
            Err(AcquireFailure::Cancelled) => StateUpdate::status(AcquisitionStatus::Cancelled),
            Err(failure) => {
                warn!(app_id = self.app_id, error = %failure, "acquisition failed");
                StateUpdate::status(AcquisitionStatus::Failed).with_error(failure.to_string())
            }
        };
        self.publish(update);
    }

    fn acquire(&self) -> Result<InstallReport, AcquireFailure> {
        for url in &self.urls {
            self.check_cancelled()?;
            self.publish(
                StateUpdate::status(AcquisitionStatus::Checking)
                    .with_current_source("")
                    .with_bytes_read(0)
                    .with_total_bytes(0),
            );
            debug!(app_id = self.app_id, url = %url, "checking source");

            let mut started = false;
            let outcome = self
                .fetcher
                .fetch(url, &self.dest, &self.cancel, &mut |event| match event {
                    FetchProgress::Started { total_bytes } => {
                        started = true;
                        self.publish(
                            StateUpdate::status(AcquisitionStatus::Downloading)
                                .with_total_bytes(total_bytes)
                                .with_current_source(url.as_str()),
                        );
                    }
                    FetchProgress::Advanced { bytes_read } => {
                        self.publish(StateUpdate::progress(bytes_read));
                    }
                });

            match outcome {
                FetchOutcome::Downloaded {
                    bytes_read,
                    total_bytes,
                } => {
                    if !started {
                        self.publish(
                            StateUpdate::status(AcquisitionStatus::Downloading)
                                .with_current_source(url.as_str()),
                        );
                    }
                    self.publish(StateUpdate::progress(bytes_read).with_total_bytes(total_bytes));
                    info!(app_id = self.app_id, url = %url, bytes_read, "archive downloaded");

                    let result = self.install();
                    self.discard_archive();
                    return result;
                }
                FetchOutcome::Unavailable(reason) => {
                    if started {
                        remove_archive(&self.dest);
                    }
                    debug!(app_id = self.app_id, url = %url, reason = %reason, "source unavailable");
                }
                FetchOutcome::Cancelled => {
                    remove_archive(&self.dest);
                    return Err(AcquireFailure::Cancelled);
                }
            }
        }

        Err(AcquireFailure::Exhausted)
    }

    fn install(&self) -> Result<InstallReport, AcquireFailure> {
        self.check_cancelled()?;
        self.publish(StateUpdate::status(AcquisitionStatus::Processing));
        let prepared = self
            .installer
            .prepare(self.app_id, &self.dest, &self.cancel)?;

        self.check_cancelled()?;
        self.publish(StateUpdate::status(AcquisitionStatus::Installing));
        Ok(self.installer.commit(prepared)?)
    }

    fn check_cancelled(&self) -> Result<(), AcquireFailure> {
        if self.cancel.is_cancelled() {
            Err(AcquireFailure::Cancelled)
        } else {
            Ok(())
        }
    }

    fn publish(&self, update: StateUpdate) {
        if let UpdateOutcome::Superseded =
            self.store.update_owned(self.app_id, self.generation, update)
        {
            debug!(
                app_id = self.app_id,
                generation = self.generation,
                "update from superseded run dropped"
            );
        }
    }

    fn discard_archive(&self) {
        if !self.keep_archives {
            remove_archive(&self.dest);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
