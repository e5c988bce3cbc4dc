//! Remote workshop service interface
//!
//! The catalog service is a black box behind two async traits: the main
//! metadata API ([`WorkshopApi`]) and the optional platform-dependency
//! lookup facility ([`AppDependencyProvider`]). [`HttpWorkshopApi`]
//! implements both over the service's JSON WebAPI.

mod http;

pub use http::{HttpWorkshopApi, DEFAULT_BASE_URL};

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::snapshot::ItemId;

/// Remote-imposed upper bound on ids per details call
pub const DETAILS_BATCH_LIMIT: usize = 215;

/// Cursor sentinel meaning "start enumeration from the beginning"
pub const START_CURSOR: &str = "*";

/// Result code the service uses for a live, publicly visible item
pub const RESULT_OK: i32 = 1;

/// Errors from the remote service layer
#[derive(Error, Debug)]
pub enum ApiError {
    /// The service refused the credential outright
    #[error("credential rejected by the workshop service (HTTP {status})")]
    CredentialRejected { status: u16 },

    /// Non-success status for anything other than a credential problem
    #[error("workshop service returned HTTP {status} from {endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    /// Connection, timeout or body-decoding failure
    #[error("failed to call {endpoint}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The caller violated a request contract (e.g. batch size)
    #[error("invalid {endpoint} request: {detail}")]
    InvalidRequest {
        endpoint: &'static str,
        detail: String,
    },
}

/// A pre-obtained workshop WebAPI key
///
/// Shape validation happens here, before any network call: keys are
/// exactly 32 hexadecimal characters. Debug output is redacted.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub const LEN: usize = 32;

    pub fn new(raw: impl Into<String>) -> Result<Self, String> {
        let raw = raw.into().trim().to_string();

        if raw.len() != Self::LEN {
            return Err(format!(
                "expected {} characters, got {}",
                Self::LEN,
                raw.len()
            ));
        }
        if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("expected hexadecimal characters only".to_string());
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(****{})", &self.0[Self::LEN - 4..])
    }
}

/// One page from the list endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPage {
    pub ids: Vec<ItemId>,
    /// Total item count across the whole catalog
    pub total: u64,
    pub next_cursor: String,
}

/// One record from the details endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDetails {
    pub id: ItemId,
    /// Service result code; [`RESULT_OK`] means the item is live
    pub result: i32,
    pub title: Option<String>,
    pub time_created: Option<i64>,
    pub time_updated: Option<i64>,
    /// Ids of items this item declares as dependencies
    pub children: Vec<ItemId>,
}

/// The remote catalog service
#[async_trait]
pub trait WorkshopApi: Send + Sync {
    /// Fetch one page of item ids for a catalog
    async fn list_items(
        &self,
        app_id: u64,
        cursor: &str,
        page_size: u32,
    ) -> Result<ItemPage, ApiError>;

    /// Fetch full metadata for up to [`DETAILS_BATCH_LIMIT`] ids
    async fn get_details(&self, ids: &[ItemId]) -> Result<Vec<ItemDetails>, ApiError>;

    /// Lightweight `id -> time_updated` map used by change detection
    async fn get_bulk_timestamps(
        &self,
        ids: &[ItemId],
    ) -> Result<HashMap<ItemId, i64>, ApiError>;
}

/// Optional platform/DLC dependency lookup facility
#[async_trait]
pub trait AppDependencyProvider: Send + Sync {
    /// Resolve the platform app ids each item requires
    async fn app_dependencies(
        &self,
        ids: &[ItemId],
    ) -> Result<HashMap<ItemId, Vec<u64>>, ApiError>;
}
