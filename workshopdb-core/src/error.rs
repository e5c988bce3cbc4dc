//! Run-level error taxonomy
//!
//! Only the conditions below surface as sync failures. Everything else
//! (a failed detail batch, a corrupt prior snapshot) is absorbed into
//! logs and snapshot content.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that terminate a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    /// Credential failed shape validation or was rejected by the service
    #[error("workshop API not available: {reason}")]
    InvalidCredential { reason: String },

    /// The list endpoint could not be enumerated at all
    #[error("workshop API not available while enumerating the catalog")]
    ApiUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// Enumeration succeeded but yielded zero items
    #[error("catalog enumeration for app {app_id} returned no items")]
    EmptyCatalog { app_id: u64 },

    /// Cooperative cancellation was requested before the run completed
    #[error("sync cancelled before completion")]
    Cancelled,

    /// The final snapshot could not be serialized or written
    #[error("failed to write snapshot to {}", path.display())]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

// Note: We don't implement From<SyncError> for anyhow::Error because
// anyhow already has a blanket implementation for all Error types.
