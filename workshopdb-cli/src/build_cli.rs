//! `workshopdb build` - run the catalog sync
//!
//! Resolves the credential (flag, then environment, then key file),
//! validates the output location, wires progress and Ctrl-C handling into
//! the engine and maps the run result onto the exit-code policy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tracing::debug;

use workshopdb_core::api::{ApiKey, HttpWorkshopApi};
use workshopdb_core::error::SyncError;
use workshopdb_core::progress::{ProgressEvent, ProgressSink, SyncPhase};
use workshopdb_core::sync::{SyncEngine, SyncOptions, SyncReport, DEFAULT_APP_ID};

/// Environment variable consulted when --api-key is absent
pub const API_KEY_ENV: &str = "WORKSHOPDB_API_KEY";

/// Last-resort key file name in the platform config directory
const API_KEY_FILE: &str = "apikey.txt";

#[derive(Parser, Debug)]
pub struct BuildCommand {
    /// Workshop WebAPI key (falls back to WORKSHOPDB_API_KEY, then to
    /// apikey.txt in the config directory)
    #[clap(long)]
    api_key: Option<String>,

    /// Snapshot file to write; the parent directory must already exist
    #[clap(long)]
    output: PathBuf,

    /// Target catalog app id
    #[clap(long, default_value_t = DEFAULT_APP_ID)]
    app_id: u64,

    /// Snapshot lifetime in seconds (0 = never expires)
    #[clap(long, default_value_t = 0)]
    expiry: i64,

    /// Skip platform/DLC dependency attachment
    #[clap(long)]
    no_app_deps: bool,

    /// Merge into the existing snapshot instead of overwriting it
    #[clap(long)]
    update: bool,

    /// Suppress progress output (errors still print)
    #[clap(long)]
    quiet: bool,
}

impl BuildCommand {
    pub async fn execute(self) -> Result<()> {
        let key = resolve_api_key(self.api_key.clone())?;
        validate_output(&self.output, self.update)?;

        let api = Arc::new(
            HttpWorkshopApi::new(key).context("failed to construct workshop API client")?,
        );
        let mut engine = SyncEngine::new(api.clone());
        if !self.no_app_deps {
            engine = engine.with_app_dependency_provider(api);
        }
        if !self.quiet {
            engine = engine.with_progress(Arc::new(StderrProgress));
        }

        let cancel = engine.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupt received, stopping at the next batch boundary...");
                cancel.cancel();
            }
        });

        let mut opts = SyncOptions::new(&self.output);
        opts.app_id = self.app_id;
        opts.expiry_secs = self.expiry;
        opts.attach_app_deps = !self.no_app_deps;
        opts.update = self.update;
        debug!("sync options: {opts:?}");

        match engine.run(&opts).await {
            Ok(report) => {
                self.print_report(&report);
                Ok(())
            }
            Err(SyncError::Cancelled) => {
                eprintln!("sync cancelled");
                std::process::exit(2);
            }
            Err(err) => Err(err.into()),
        }
    }

    fn print_report(&self, report: &SyncReport) {
        if self.quiet {
            return;
        }

        println!(
            "Synced {} of {} items ({} skipped, {} unpublished)",
            report.fetched, report.enumerated, report.skipped, report.unpublished
        );
        if report.updated {
            println!(
                "Merged changes into {} ({} new, {} changed, {} deleted)",
                self.output.display(),
                report.new,
                report.changed,
                report.deleted
            );
        } else {
            println!("Wrote {}", self.output.display());
        }
    }
}

/// Resolve the credential: flag, then environment, then key file
fn resolve_api_key(flag: Option<String>) -> Result<ApiKey> {
    let env_value = std::env::var(API_KEY_ENV).ok();
    let file_value = read_key_file();

    let raw = pick_raw_key(flag, env_value, file_value).with_context(|| {
        format!(
            "no API key: pass --api-key, set {API_KEY_ENV}, or create {API_KEY_FILE} \
             in the config directory"
        )
    })?;

    ApiKey::new(raw).map_err(|reason| anyhow!("invalid API key: {reason}"))
}

/// Priority order for the credential sources; blank values are skipped
fn pick_raw_key(
    flag: Option<String>,
    env_value: Option<String>,
    file_value: Option<String>,
) -> Option<String> {
    [flag, env_value, file_value]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn read_key_file() -> Option<String> {
    let path = key_file_path()?;
    let content = std::fs::read_to_string(&path).ok()?;
    debug!("using API key from {}", path.display());
    Some(content)
}

fn key_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "workshopdb", "workshopdb")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| dirs::config_dir().map(|d| d.join("workshopdb")))
        .map(|dir| dir.join(API_KEY_FILE))
}

/// The parent directory must exist, and update mode needs a file to update
fn validate_output(output: &Path, update: bool) -> Result<()> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            bail!("output directory does not exist: {}", parent.display());
        }
    }
    if update && !output.exists() {
        bail!(
            "--update requires an existing snapshot at {}",
            output.display()
        );
    }
    Ok(())
}

/// Human-readable progress lines on stderr
struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Phase { phase, done, total } => {
                let label = match phase {
                    SyncPhase::Crawling => "Crawling catalog",
                    SyncPhase::Diffing => "Checking remote timestamps",
                    SyncPhase::Fetching => "Fetching details",
                    SyncPhase::AttachingDeps => "Attaching platform dependencies",
                    SyncPhase::Writing => "Writing snapshot",
                };
                eprintln!("{label} [{done}/{total}]");
            }
            ProgressEvent::Summary {
                new,
                changed,
                deleted,
            } => {
                eprintln!("Catalog changes: {new} new, {changed} changed, {deleted} deleted");
            }
        }
    }
}
