//! Acquisition state tracking.
//!
//! Every acquisition writes its progress into a [`StateStore`] keyed by app
//! id. The store is shared between the acquisition routines (writers) and any
//! number of status pollers (readers). A single mutex guards the mapping and
//! is held only for one merge or one copy, never across I/O.
//!
//! Records carry a generation number. [`StateStore::reset`] starts a new
//! generation, and routines write through [`StateStore::update_owned`] so a
//! superseded routine cannot clobber the record of the one that replaced it.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Lifecycle status of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionStatus {
    /// No acquisition has been started for this id.
    #[default]
    Unknown,
    /// Start accepted, routine not yet running.
    Queued,
    /// Probing a source.
    Checking,
    /// Streaming an archive from a source.
    Downloading,
    /// Archive downloaded, inspecting contents.
    Processing,
    /// Writing the patched script.
    Installing,
    /// Script installed.
    Done,
    /// Terminal failure; see the `error` field.
    Failed,
    /// Stopped by a cancel request or shutdown.
    Cancelled,
}

impl AcquisitionStatus {
    /// Lowercase name as exposed to callers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Queued => "queued",
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Installing => "installing",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions will happen for this run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether a routine may move from `self` to `next`.
    ///
    /// `Queued` is reachable from anywhere because a fresh start resets the
    /// record. Terminal states accept nothing else.
    pub fn can_transition_to(self, next: AcquisitionStatus) -> bool {
        if next == Self::Queued {
            return true;
        }
        match self {
            Self::Unknown => false,
            Self::Queued => matches!(next, Self::Checking | Self::Failed | Self::Cancelled),
            Self::Checking => matches!(
                next,
                Self::Checking | Self::Downloading | Self::Failed | Self::Cancelled
            ),
            Self::Downloading => matches!(
                next,
                Self::Downloading
                    | Self::Checking
                    | Self::Processing
                    | Self::Failed
                    | Self::Cancelled
            ),
            Self::Processing => {
                matches!(next, Self::Installing | Self::Failed | Self::Cancelled)
            }
            Self::Installing => matches!(next, Self::Done | Self::Failed | Self::Cancelled),
            Self::Done | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for AcquisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of one acquisition as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionState {
    pub status: AcquisitionStatus,
    pub bytes_read: u64,
    /// Expected archive size; 0 when the server sent no `Content-Length`.
    pub total_bytes: u64,
    pub current_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_path: Option<String>,
    pub destination_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl AcquisitionState {
    /// Fresh record for a newly accepted start.
    pub fn queued(destination_path: impl Into<String>) -> Self {
        Self {
            status: AcquisitionStatus::Queued,
            destination_path: destination_path.into(),
            ..Default::default()
        }
    }

    /// Download progress in percent, if the total is known.
    pub fn progress_percent(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            None
        } else {
            Some((self.bytes_read as f64 / self.total_bytes as f64) * 100.0)
        }
    }
}

/// Partial update merged into an [`AcquisitionState`].
///
/// Only fields that are `Some` are written; nothing is ever cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateUpdate {
    pub status: Option<AcquisitionStatus>,
    pub bytes_read: Option<u64>,
    pub total_bytes: Option<u64>,
    pub current_source: Option<String>,
    pub error: Option<String>,
    pub installed_path: Option<String>,
    pub destination_path: Option<String>,
    pub success: Option<bool>,
}

impl StateUpdate {
    /// Update that only changes the status.
    pub fn status(status: AcquisitionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Update that only changes the byte counter.
    pub fn progress(bytes_read: u64) -> Self {
        Self {
            bytes_read: Some(bytes_read),
            ..Default::default()
        }
    }

    pub fn with_bytes_read(mut self, bytes: u64) -> Self {
        self.bytes_read = Some(bytes);
        self
    }

    pub fn with_total_bytes(mut self, bytes: u64) -> Self {
        self.total_bytes = Some(bytes);
        self
    }

    pub fn with_current_source(mut self, source: impl Into<String>) -> Self {
        self.current_source = Some(source.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_installed_path(mut self, path: impl Into<String>) -> Self {
        self.installed_path = Some(path.into());
        self
    }

    pub fn with_destination_path(mut self, path: impl Into<String>) -> Self {
        self.destination_path = Some(path.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    fn apply(&self, state: &mut AcquisitionState) {
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(bytes) = self.bytes_read {
            state.bytes_read = bytes;
        }
        if let Some(total) = self.total_bytes {
            state.total_bytes = total;
        }
        if let Some(ref source) = self.current_source {
            state.current_source = source.clone();
        }
        if let Some(ref error) = self.error {
            state.error = Some(error.clone());
        }
        if let Some(ref path) = self.installed_path {
            state.installed_path = Some(path.clone());
        }
        if let Some(ref path) = self.destination_path {
            state.destination_path = path.clone();
        }
        if let Some(success) = self.success {
            state.success = Some(success);
        }

        // A server may send more than it announced; keep bytes_read <= total.
        if state.total_bytes > 0 && state.bytes_read > state.total_bytes {
            state.total_bytes = state.bytes_read;
        }
    }
}

/// Result of a generation-checked update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was merged.
    Applied,
    /// The record belongs to a newer run; the update was dropped.
    Superseded,
    /// The status change is not a legal transition; nothing was merged.
    Rejected {
        from: AcquisitionStatus,
        to: AcquisitionStatus,
    },
}

#[derive(Debug, Clone)]
struct Record {
    state: AcquisitionState,
    generation: u64,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<u32, Record>,
    next_generation: u64,
}

/// Concurrent-safe map from app id to acquisition state.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<Inner>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `update` into the record for `app_id`, creating it if absent.
    pub fn set(&self, app_id: u32, update: StateUpdate) {
        {
            let mut inner = self.inner.lock();
            let record = inner.records.entry(app_id).or_insert_with(|| Record {
                state: AcquisitionState::default(),
                generation: 0,
            });
            update.apply(&mut record.state);
        }
        log_status_change(app_id, &update);
    }

    /// Copy of the record for `app_id`, or the default `unknown` record.
    pub fn get(&self, app_id: u32) -> AcquisitionState {
        self.inner
            .lock()
            .records
            .get(&app_id)
            .map(|r| r.state.clone())
            .unwrap_or_default()
    }

    /// Replace the record for `app_id` and start a new generation.
    ///
    /// Returns the generation that future owned updates must present.
    pub fn reset(&self, app_id: u32, state: AcquisitionState) -> u64 {
        let status = state.status;
        let generation = {
            let mut inner = self.inner.lock();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            inner.records.insert(app_id, Record { state, generation });
            generation
        };
        info!(app_id, status = %status, generation, "acquisition state reset");
        generation
    }

    /// Current generation for `app_id`, if a record exists.
    pub fn generation(&self, app_id: u32) -> Option<u64> {
        self.inner.lock().records.get(&app_id).map(|r| r.generation)
    }

    /// Merge `update` only if `generation` still owns the record and any
    /// status change is a legal transition.
    pub fn update_owned(&self, app_id: u32, generation: u64, update: StateUpdate) -> UpdateOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            match inner.records.get_mut(&app_id) {
                Some(record) if record.generation == generation => {
                    let from = record.state.status;
                    match update.status {
                        Some(to) if !from.can_transition_to(to) => {
                            UpdateOutcome::Rejected { from, to }
                        }
                        _ => {
                            update.apply(&mut record.state);
                            UpdateOutcome::Applied
                        }
                    }
                }
                _ => UpdateOutcome::Superseded,
            }
        };

        match outcome {
            UpdateOutcome::Applied => log_status_change(app_id, &update),
            UpdateOutcome::Rejected { from, to } => {
                warn!(app_id, from = %from, to = %to, "illegal acquisition transition rejected");
            }
            UpdateOutcome::Superseded => {}
        }
        outcome
    }

    /// Copies of every record, ordered by app id.
    pub fn snapshot(&self) -> Vec<(u32, AcquisitionState)> {
        let mut all: Vec<_> = self
            .inner
            .lock()
            .records
            .iter()
            .map(|(id, r)| (*id, r.state.clone()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

fn log_status_change(app_id: u32, update: &StateUpdate) {
    if let Some(status) = update.status {
        info!(app_id, status = %status, "acquisition state changed");
    }
}
