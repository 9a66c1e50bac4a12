//! 🎬 *[camera pans across a bucket of ten thousand yearly shards]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where every group's files were scattered by year..."
//! 🎬 "One orchestrator dared to walk the listing twice."
//! 🎬 *[record scratch]* 🦆
//!
//! The merge pass. The census already told us how many files each group is
//! owed; this module walks the listing a second time and, for every
//! qualifying key, runs the whole chain: download → decode → append →
//! maybe commit. One key fully processed before the next begins. No
//! concurrency, no locks, no surprises — the only thing that ever waits is
//! the network.
//!
//! 🧠 Per-group state machine, for the record:
//! `Unseen → Accumulating` on the first append, `Accumulating → Complete`
//! when processed == expected, `Complete → Committed` when the committer
//! lands the upload, `Complete → Failed` when it runs out of retries.
//! Committed and Failed are terminal — a re-listed key for a finished group
//! is ignored, which is what makes the single pass idempotent by
//! construction.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::accumulator::Accumulators;
use crate::app_config::AppConfig;
use crate::classify::{classify, sanitize};
use crate::committer;
use crate::decode::NdjsonReader;
use crate::progress;
use crate::scratch::Scratch;
use crate::stores::{ObjectStore, StoreBackend};

/// 📊 What a run has to show for itself once the dust settles.
#[derive(Debug, Default, Clone)]
pub struct RunReport {
    /// 📊 groups the census found (and therefore the merge pass owed)
    pub groups_discovered: usize,
    /// 📄 source files fully downloaded, decoded, and appended
    pub files_merged: u64,
    /// ✅ groups whose merged artifact landed in the destination bucket
    pub groups_committed: usize,
    /// 💀 groups that spent every retry and shipped nothing — by name,
    /// so the operator can re-run them without archaeology
    pub groups_failed: Vec<String>,
}

/// 🎬 Drives the merge pass against one store and one config.
///
/// Owns nothing long-lived itself — the accumulators, the terminal-state
/// sets, and the progress bar all live inside [`run`](MergeOrchestrator::run)
/// for exactly one pass and are torn down with it. A crash mid-run means a
/// fresh full re-scan; that trade was made on purpose and is documented
/// where the operators can see it.
pub(crate) struct MergeOrchestrator<'a> {
    store: &'a StoreBackend,
    config: &'a AppConfig,
}

impl<'a> MergeOrchestrator<'a> {
    pub(crate) fn new(store: &'a StoreBackend, config: &'a AppConfig) -> Self {
        Self { store, config }
    }

    /// 🚀 The second pass. Takes the census ledger, returns the report.
    ///
    /// 💀 Download and decode errors abort the run — a skipped file would
    /// silently freeze its group one count short of Complete, and a group
    /// that never completes is a worse failure mode than a loud crash.
    /// Upload exhaustion does NOT abort; that group is marked Failed and
    /// the caravan moves on. Every error path evicts the scratch files it
    /// opened before leaving.
    pub(crate) async fn run(&self, expected: HashMap<String, u64>) -> Result<RunReport> {
        let scratch = Scratch::prepare(self.config.scratch_dir.clone()).await?;
        let mut accumulators = Accumulators::new(scratch.clone(), expected);

        let mut report = RunReport {
            groups_discovered: accumulators.groups_discovered(),
            ..RunReport::default()
        };
        // 🔒 terminal states — a group in here is done, forever, this run
        let mut committed: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();

        let total_files = accumulators.expected_total_files();
        let bar = progress::merge_bar(total_files);
        info!("🪣 starting the merge pass: {total_files} files across {} groups", report.groups_discovered);

        let merge_result = self
            .merge_listing(
                &scratch,
                &mut accumulators,
                &mut committed,
                &mut failed,
                &mut report,
                &bar,
            )
            .await;
        bar.finish_and_clear();

        if let Err(error) = merge_result {
            // 🧹 fatal exit — evict every in-flight staging file first, so
            // the scratch dir is as empty as our sense of accomplishment
            accumulators.discard_all().await;
            return Err(error);
        }

        // ⚠️ a group still accumulating after the full listing means the
        // bucket changed between passes. Say so; don't ship a partial merge.
        for group in accumulators.unfinished_groups() {
            warn!(
                "⚠️ group '{group}' never reached its census count — the bucket \
                 shifted between the two passes. Nothing was uploaded for it. \
                 Re-run for a fresh census."
            );
        }
        accumulators.discard_all().await;

        report.groups_committed = committed.len();
        report.groups_failed = failed.into_iter().collect();
        report.groups_failed.sort();
        Ok(report)
    }

    /// 🔄 Walks the listing page by page and feeds every qualifying key
    /// through the chain. Split out so `run` can wrap it with teardown.
    #[allow(clippy::too_many_arguments)]
    async fn merge_listing(
        &self,
        scratch: &Scratch,
        accumulators: &mut Accumulators,
        committed: &mut HashSet<String>,
        failed: &mut HashSet<String>,
        report: &mut RunReport,
        bar: &indicatif::ProgressBar,
    ) -> Result<()> {
        let total_files = accumulators.expected_total_files();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .store
                .list_page(
                    &self.config.source_bucket,
                    &self.config.source_prefix,
                    continuation,
                )
                .await
                .context("💀 The merge-pass listing died. Same fatality rules as the census: no complete listing, no run.")?;

            for key in &page.keys {
                let Some(group) = classify(key) else {
                    debug!("🤷 merge pass skipping non-qualifying key '{key}'");
                    continue;
                };

                if committed.contains(&group) || failed.contains(&group) {
                    // 🔒 terminal means terminal — even if the store re-lists
                    debug!("🔒 key '{key}' belongs to finished group '{group}', ignoring");
                    continue;
                }
                if !accumulators.expects(&group) {
                    // the census never met this group: the bucket changed
                    // between passes. Skip it loudly rather than corrupt state.
                    warn!("⚠️ key '{key}' maps to group '{group}' unknown to the census — skipping");
                    continue;
                }

                self.consume_document(scratch, accumulators, key, &group)
                    .await?;
                report.files_merged += 1;
                bar.inc(1);
                info!(
                    "📄 processed file {}/{} for group '{}'",
                    report.files_merged, total_files, group
                );

                if accumulators.is_complete(&group)? {
                    self.commit_group(accumulators, &group, committed, failed)
                        .await?;
                }
            }

            match page.next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    /// 📥 Download one document to scratch, stream its records into the
    /// group's accumulator, and evict the download — success or failure.
    async fn consume_document(
        &self,
        scratch: &Scratch,
        accumulators: &mut Accumulators,
        key: &str,
        group: &str,
    ) -> Result<()> {
        let basename = key.rsplit('/').next().unwrap_or(key);
        let doc_path = scratch.doc_path(&sanitize(basename));

        let outcome = async {
            self.store
                .download(&self.config.source_bucket, key, &doc_path)
                .await?;
            let mut records = NdjsonReader::open(&doc_path).await?;
            accumulators.append(group, &mut records).await
        }
        .await;

        // 🗑️ the per-document scratch file goes NOW, whatever just happened.
        // A long run that leaks one download per file eats the disk by lunch.
        scratch.remove(&doc_path).await?;
        outcome?;
        Ok(())
    }

    /// 📤 Complete → Committed or Complete → Failed. Either way the staging
    /// file is discarded before we look at the next key — no partial state
    /// outlives its group.
    async fn commit_group(
        &self,
        accumulators: &mut Accumulators,
        group: &str,
        committed: &mut HashSet<String>,
        failed: &mut HashSet<String>,
    ) -> Result<()> {
        let destination_key = format!("{}{}.json", self.config.destination_prefix, group);
        info!("📦 group '{group}' is complete — committing to '{destination_key}'");

        let staged = accumulators.finalize(group)?.to_path_buf();
        let shipped = committer::commit(
            self.store,
            &self.config.upload,
            &self.config.destination_bucket,
            &destination_key,
            &staged,
        )
        .await;

        accumulators.discard(group).await?;
        if shipped {
            committed.insert(group.to_string());
        } else {
            failed.insert(group.to_string());
        }
        Ok(())
    }
}

// ============================================================
//  🧪 Tests — the whole engine, on a bucket made of RAM.
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::StoreConfig;
    use crate::census::census;
    use crate::committer::UploadConfig;
    use crate::stores::InMemoryStoreConfig;
    use crate::stores::in_mem_store::InMemoryStore;

    fn test_config(scratch_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            source_bucket: "vault".to_string(),
            source_prefix: "feed/".to_string(),
            destination_bucket: "vault".to_string(),
            destination_prefix: "merged/".to_string(),
            scratch_dir: scratch_dir.to_path_buf(),
            upload: UploadConfig {
                max_attempts: 2,
                backoff_base_ms: 1,
            },
            store: StoreConfig::InMemory(InMemoryStoreConfig::default()),
        }
    }

    fn vault_corpus() -> InMemoryStore {
        InMemoryStore::seeded(
            2, // small pages so the merge pass actually paginates
            &[
                ("vault", "feed/a_2020.json", "{\"x\": 1}\n"),
                ("vault", "feed/a_2021.json", "{\"x\": 2}\n"),
                ("vault", "feed/b_1999.json", "{\"x\": 3}\n"),
                ("vault", "feed/bystander.txt", "not even json"),
                ("vault", "feed/noyear.json", "{\"x\": 9}\n"),
            ],
        )
    }

    async fn run_pipeline(fake: InMemoryStore) -> (InMemoryStore, Result<RunReport>, tempfile::TempDir) {
        let scratch_dir = tempfile::tempdir().unwrap();
        let config = test_config(scratch_dir.path());
        let store = StoreBackend::InMemory(fake.clone());

        let expected = census(&store, "vault", "feed/").await.unwrap();
        let orchestrator = MergeOrchestrator::new(&store, &config);
        let report = orchestrator.run(expected).await;
        (fake, report, scratch_dir)
    }

    #[tokio::test]
    async fn the_one_where_the_classic_corpus_merges_end_to_end() {
        let (fake, report, scratch_dir) = run_pipeline(vault_corpus()).await;
        let report = report.expect("a healthy corpus must merge without drama");

        // census said {a:2, b:1}; three files crossed the belt
        assert_eq!(report.groups_discovered, 2);
        assert_eq!(report.files_merged, 3);
        assert_eq!(report.groups_committed, 2);
        assert!(report.groups_failed.is_empty());

        // merged artifacts: listing order, compact lines
        assert_eq!(
            fake.object("vault", "merged/a.json").await,
            Some(b"{\"x\":1}\n{\"x\":2}\n".to_vec())
        );
        assert_eq!(
            fake.object("vault", "merged/b.json").await,
            Some(b"{\"x\":3}\n".to_vec())
        );
        // the bystanders shipped nothing
        assert!(fake.object("vault", "merged/noyear.json").await.is_none());

        // 🧹 the scratch dir is spotless
        let mut leftovers = tokio::fs::read_dir(scratch_dir.path()).await.unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn the_one_where_a_lone_file_group_commits_on_the_spot() {
        let fake = InMemoryStore::seeded(10, &[("vault", "feed/solo_2005.json", "{\"x\": 7}\n")]);
        let (fake, report, _scratch) = run_pipeline(fake).await;
        let report = report.unwrap();

        assert_eq!(report.groups_committed, 1);
        assert_eq!(
            fake.object("vault", "merged/solo.json").await,
            Some(b"{\"x\":7}\n".to_vec())
        );
    }

    #[tokio::test]
    async fn the_one_where_upload_exhaustion_fails_the_group_not_the_run() {
        let fake = vault_corpus().with_failing_uploads();
        let (fake, report, scratch_dir) = run_pipeline(fake).await;
        let report = report.expect("upload failure is best-effort, never fatal");

        assert_eq!(report.groups_committed, 0);
        assert_eq!(report.groups_failed, vec!["a".to_string(), "b".to_string()]);
        // two groups × max_attempts(2) — every retry spent, none extra
        assert_eq!(fake.upload_attempts(), 4);

        // staging files were still discarded on the failure path
        let mut leftovers = tokio::fs::read_dir(scratch_dir.path()).await.unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn the_one_where_a_poisoned_document_stops_the_run_but_not_the_janitor() {
        let fake = InMemoryStore::seeded(
            10,
            &[
                ("vault", "feed/c_2000.json", "this is not json\n"),
                ("vault", "feed/d_2001.json", "{\"x\": 1}\n"),
            ],
        );
        let (_fake, report, scratch_dir) = run_pipeline(fake).await;

        // decode errors are fatal by documented choice
        assert!(report.is_err());

        // ...but every scratch file was evicted on the way out
        let mut leftovers = tokio::fs::read_dir(scratch_dir.path()).await.unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn the_one_where_append_calls_match_the_census_exactly() {
        // replaying the same keys through both passes: the merge pass owes
        // precisely census[group] appends per group, and each group
        // completes exactly once — that's the whole two-pass contract
        let (fake, report, _scratch) = run_pipeline(vault_corpus()).await;
        let report = report.unwrap();

        let store = StoreBackend::InMemory(fake);
        let counts = census(&store, "vault", "feed/").await.unwrap();
        let census_total: u64 = counts.values().sum();
        assert_eq!(report.files_merged, census_total);
        assert_eq!(report.groups_committed, counts.len());
    }
}
