//! Archive acquisition from an ordered list of mirrors.
//!
//! This module provides:
//! - Source URL templates and their expansion (`sources`)
//! - Single-source streaming fetch (`fetch`)
//! - Concurrent per-app state tracking (`state`)
//! - Worker supervision and the acquisition state machine (`orchestrator`)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reverig::acquire::{Acquirer, AcquirerConfig, HttpFetcher, StateStore};
//! use reverig::{Installer, ProbingLocator};
//!
//! let acquirer = Acquirer::new(
//!     AcquirerConfig::default(),
//!     Arc::new(StateStore::new()),
//!     Arc::new(HttpFetcher::with_defaults()?),
//!     Installer::new(Arc::new(ProbingLocator::new(None))),
//! );
//! acquirer.start(440)?;
//! println!("{}", acquirer.status(440).status);
//! ```

mod error;
mod fetch;
mod orchestrator;
mod sources;
mod state;

pub use error::{AcquireFailure, StartError};
pub use fetch::{
    ArchiveFetcher, FetchOutcome, FetchProgress, FetcherBuildError, FetcherConfig, HttpFetcher,
    Unavailable, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use orchestrator::{Acquirer, AcquirerConfig};
pub use sources::{SourceList, DEFAULT_SOURCES, ID_PLACEHOLDER};
pub use state::{AcquisitionState, AcquisitionStatus, StateStore, StateUpdate, UpdateOutcome};
