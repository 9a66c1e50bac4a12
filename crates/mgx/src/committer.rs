//! 📤 committer.rs — the part that keeps asking S3 nicely, then less nicely.
//!
//! Uploads fail. Networks hiccup, tokens expire, buckets have moods. The
//! committer's whole personality is: try the PutObject, and if the cloud
//! says no, wait twice as long as last time and ask again. A bounded number
//! of times. Then give up *on this group only* — one unshippable group must
//! never take the other nine hundred down with it.
//!
//! 💀 That makes `commit` the one failure in this pipeline that is reported
//! instead of propagated. It returns a verdict, not a Result, and the
//! orchestrator files the group under Failed and moves on with its life.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::stores::{ObjectStore, StoreBackend};

/// 🔧 Retry knobs for the upload path. The defaults are the ones the vault
/// tooling has always run with: five attempts, half a second of patience,
/// doubling.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    /// 🔁 Total attempts, first try included. Zero would mean "never try",
    /// which is a philosophy, not a config value — we floor it at 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// ⏳ Base backoff in milliseconds. Attempt n sleeps base * 2^n after
    /// failing, so the default ladder runs 500ms, 1s, 2s, 4s.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

/// ⏳ The backoff ladder as a pure function: `base * 2^attempt` for the
/// zero-indexed attempt that just failed. Pure so the doubling can be
/// asserted in a test without anyone actually sleeping through it.
pub(crate) fn backoff_delay(config: &UploadConfig, attempt: u32) -> Duration {
    let multiplier = 2u64.saturating_pow(attempt);
    Duration::from_millis(config.backoff_base_ms.saturating_mul(multiplier))
}

/// 📤 Upload the staged file as `key`, with retries. Returns `true` on
/// success, `false` once every attempt is spent.
///
/// The staged file is re-read from disk by the store on every attempt, so
/// attempt four uploads exactly what attempt one tried to. Exhaustion is
/// logged at ERROR and swallowed — the caller marks the group Failed and
/// the run continues. Best effort, by design, out loud.
pub(crate) async fn commit(
    store: &StoreBackend,
    config: &UploadConfig,
    bucket: &str,
    key: &str,
    source: &Path,
) -> bool {
    let attempts = config.max_attempts.max(1);
    for attempt in 0..attempts {
        match store.put_object(bucket, key, source).await {
            Ok(()) => {
                info!("✅ uploaded s3://{bucket}/{key} (attempt {})", attempt + 1);
                return true;
            }
            Err(error) => {
                warn!(
                    "⚠️ upload attempt {}/{} for s3://{bucket}/{key} failed: {error:#}",
                    attempt + 1,
                    attempts
                );
                if attempt + 1 < attempts {
                    tokio::time::sleep(backoff_delay(config, attempt)).await;
                }
            }
        }
    }
    error!(
        "💀 gave up on s3://{bucket}/{key} after {attempts} attempts. This group \
         ships nothing today. The rest of the run carries on without it."
    );
    false
}
