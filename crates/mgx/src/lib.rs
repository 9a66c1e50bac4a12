//! 🪣 mgx — the group-merge engine for yearly JSON shards.
//!
//! The bucket holds documents named like `vendor-feed_2021.json`: a group
//! identifier, an underscore, a year, and a pile of newline-delimited JSON
//! inside. This crate walks that bucket twice — once to count how many files
//! each group owns (the census), once to download, decode, and concatenate
//! them (the merge) — and uploads one merged `{group}.json` per group, the
//! moment its last file has been consumed. Exactly once per group, with
//! retry-and-backoff on the upload and a firm policy of not letting one
//! stubborn group ruin everyone else's evening.
//!
//! Entry point: [`run`]. Everything else is supporting cast.

mod accumulator;
pub mod app_config;
mod census;
mod classify;
mod committer;
mod decode;
mod orchestrator;
pub mod progress;
mod scratch;
mod stores;

use anyhow::{Context, Result};
use tracing::info;

pub use app_config::AppConfig;
pub use committer::UploadConfig;
pub use orchestrator::RunReport;
pub use stores::{InMemoryStoreConfig, S3StoreConfig};

use crate::orchestrator::MergeOrchestrator;
use crate::stores::StoreBackend;

/// 🚀 One full merge run: resolve the store, take the census, merge, report.
///
/// 💀 Fatal errors (listing, credentials, downloads, decodes) come back as
/// `Err` with the whole context chain attached. Upload failures do not —
/// those are per-group and live in [`RunReport::groups_failed`], because
/// best-effort is the contract on that path.
pub async fn run(app_config: AppConfig) -> Result<RunReport> {
    let store = StoreBackend::from_config(&app_config.store)
        .await
        .context("💀 Could not stand up the object store backend")?;

    let expected = census::census(
        &store,
        &app_config.source_bucket,
        &app_config.source_prefix,
    )
    .await?;

    let orchestrator = MergeOrchestrator::new(&store, &app_config);
    let report = orchestrator.run(expected).await?;

    info!(
        "🏁 run complete: {} groups committed, {} failed, {} files merged",
        report.groups_committed,
        report.groups_failed.len(),
        report.files_merged
    );
    Ok(report)
}
