//! Snapshot data model and file I/O
//!
//! The snapshot is a JSON document: a top-level integer `version` plus a
//! `database` object mapping item id to record. Readers elsewhere compare
//! `version` against wall-clock time to judge staleness; this engine only
//! writes it.
//!
//! Both [`Snapshot`] and [`ItemRecord`] carry a flattened capture map for
//! fields this engine does not understand, so a load/merge/save round trip
//! never destroys data written by other tooling.

pub mod merge;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a catalog item
///
/// Platform/DLC pseudo-items share the same key space with a fixed
/// well-known set (see [`crate::sync::platform`]).
pub type ItemId = String;

/// Dependency edge payload: `[name, url]` of the child at the time the
/// edge was recorded
pub type DependencyEdge = (String, String);

/// Canonical remote location for an item id
pub fn item_url(id: &str) -> String {
    format!("https://steamcommunity.com/sharedfiles/filedetails/?id={id}")
}

/// The versioned local database of item records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Expiry epoch (generation time + configured lifetime); 0 never expires
    pub version: i64,

    /// All known item records, keyed by item id
    pub database: BTreeMap<ItemId, ItemRecord>,

    /// Top-level fields owned by other tooling
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Metadata for one catalog item
///
/// Every field is optional on the wire; a freshly discovered id starts as
/// a skeleton carrying only `url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Canonical remote location; required once the record is populated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Display name; a locally-known name wins over the remote title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Edges to other records; every key exists in `database` once
    /// closure resolution completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<ItemId, DependencyEdge>>,

    /// The service reports the item as no longer publicly visible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpublished: Option<bool>,

    /// Tombstone: the item disappeared from the live catalog
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,

    /// When the tombstone was set (Unix epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    /// Platform/DLC pseudo-item rather than a user-published one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appid: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_created: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<i64>,

    /// Fields owned by other tooling
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Snapshot {
    /// Create an empty snapshot with the given version stamp
    pub fn new(version: i64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Load a snapshot from disk
    ///
    /// Fails when the file is unreadable or the document lacks the
    /// top-level `database` map; callers decide whether that is fatal or
    /// a reason to rebuild.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot: {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse snapshot: {}", path.display()))
    }

    /// Save the snapshot to disk as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;

        std::fs::write(path, content)
            .with_context(|| format!("failed to write snapshot: {}", path.display()))?;

        Ok(())
    }
}

impl ItemRecord {
    /// Bare entry created the moment an id is discovered, pending detail
    /// resolution
    pub fn skeleton(id: &str) -> Self {
        Self {
            url: Some(item_url(id)),
            ..Default::default()
        }
    }

    /// Platform/DLC pseudo-item record
    pub fn platform(name: &str, url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            name: Some(name.to_string()),
            appid: Some(true),
            ..Default::default()
        }
    }

    pub fn is_unpublished(&self) -> bool {
        self.unpublished.unwrap_or(false)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }

    pub fn is_platform(&self) -> bool {
        self.appid.unwrap_or(false)
    }

    /// A record counts as populated once detail resolution gave it a name
    /// and the service still reports it as published
    pub fn is_populated(&self) -> bool {
        self.name.is_some() && !self.is_unpublished()
    }

    /// Tombstone this record in place, keeping previously known fields
    pub fn tombstone(&mut self, at: i64) {
        self.deleted = Some(true);
        self.deleted_at = Some(at);
    }

    /// Record a dependency edge to `child`
    pub fn add_dependency(&mut self, child: ItemId, name: String, url: String) {
        self.dependencies
            .get_or_insert_with(BTreeMap::new)
            .insert(child, (name, url));
    }
}
