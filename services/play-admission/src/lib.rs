//! Play admission service.
//!
//! Sits in front of the play rewards ledger and decides which client play
//! reports count: a per-source fixed window limit, a minimum engagement time
//! and a content fingerprint check. Admitted plays are counted in the local
//! play store and mirrored to the ledger on a best-effort basis.
//!
//! Rate windows live in process memory only; a restart clears them while the
//! play counts survive.

pub mod api;
pub mod config;
pub mod gate;
pub mod limiter;
pub mod mirror;
pub mod store;

pub use api::router;
pub use config::{log_filter, AdmissionConfig, Args, ConfigError, MirrorConfig, ServiceConfig};
pub use gate::{Accepted, AdmissionController, PlayReport, Rejection};
pub use limiter::WindowLimiter;
pub use mirror::{HttpMirror, LedgerMirror, MirrorDispatcher};
pub use store::{fingerprint_of, CatalogEntry, CatalogStore, PlayItem, PlayStore, StoreError};
