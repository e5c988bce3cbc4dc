//! `workshopdb check` - inspect an existing snapshot
//!
//! Exercises the same reader path other tooling uses: load the file,
//! judge staleness from `version` against the wall clock, and count
//! record kinds.

use std::path::Path;

use anyhow::Result;
use chrono::{TimeZone, Utc};

use workshopdb_core::snapshot::Snapshot;

pub fn execute(path: &Path) -> Result<()> {
    let snapshot = Snapshot::load(path)?;

    let total = snapshot.database.len();
    let unpublished = snapshot
        .database
        .values()
        .filter(|r| r.is_unpublished())
        .count();
    let tombstoned = snapshot.database.values().filter(|r| r.is_deleted()).count();
    let platform = snapshot.database.values().filter(|r| r.is_platform()).count();
    let edges: usize = snapshot
        .database
        .values()
        .filter_map(|r| r.dependencies.as_ref())
        .map(|deps| deps.len())
        .sum();

    println!("Snapshot: {}", path.display());
    match snapshot.version {
        0 => println!("  Version: 0 (never expires)"),
        version => {
            let expires = Utc
                .timestamp_opt(version, 0)
                .single()
                .map(|stamp| stamp.to_rfc3339())
                .unwrap_or_else(|| version.to_string());
            if version > Utc::now().timestamp() {
                println!("  Version: {version} (expires {expires})");
            } else {
                println!("  Version: {version} (STALE since {expires})");
            }
        }
    }
    println!(
        "  Items: {total} total, {unpublished} unpublished, {tombstoned} deleted, \
         {platform} platform"
    );
    println!("  Dependency edges: {edges}");

    Ok(())
}
