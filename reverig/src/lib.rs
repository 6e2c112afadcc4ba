//! Reverig - manifest script acquisition for Steam plugin backends.
//!
//! This library fetches per-app archives from an ordered list of mirrors,
//! tracks every in-flight acquisition in a shared state store, and installs
//! the contained manifest script into Steam's `config/stplug-in` directory
//! after commenting out `setManifestid` directives.
//!
//! # Architecture
//!
//! ```text
//! PluginApi (reply surface)
//!     │
//!     ├── Acquirer ──► SourceList ──► ArchiveFetcher (HttpFetcher)
//!     │      │                               │
//!     │      └──► StateStore ◄── progress ───┘
//!     │      │
//!     │      └──► Installer ──► patch rules ──► SteamLayout
//!     │
//!     ├── presence (has / remove)
//!     └── dlc (metadata API ──► Steamtools.lua)
//! ```

pub mod acquire;
pub mod api;
pub mod config;
pub mod dlc;
pub mod install;
pub mod layout;
pub mod logging;

pub use acquire::{
    AcquisitionState, AcquisitionStatus, Acquirer, AcquirerConfig, ArchiveFetcher, FetchOutcome,
    HttpFetcher, SourceList, StateStore, StateUpdate,
};
pub use api::{AppId, PluginApi};
pub use install::{InstallError, Installer};
pub use layout::{FixedLocator, ProbingLocator, SteamLayout, SteamLocator};
