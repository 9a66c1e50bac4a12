//! 📦 accumulator.rs — where the groups pile up their lines, one file at a time.
//!
//! Each group gets an append-only staging file on scratch disk and a
//! processed-files counter. Records stream straight from the decoder into
//! the staging file through a `BufWriter` — the merged group is never in
//! memory, only on disk, which is how a 40GB group merges on a laptop.
//!
//! 🧠 Knowledge graph:
//! - Completion is measured in FILES, not records. The census counted files,
//!   so the accumulator counts files. One unit. One truth.
//! - Complete ⇔ processed == expected. Not expected-minus-one. The
//!   off-by-one variant ships every group missing its final file's records
//!   and looks fine in the logs. We do not speak of it. (We speak of it in
//!   the tests, where it is pinned down so it can never come back.)
//! - State lives HERE, keyed by GroupId, owned by whoever owns the
//!   `Accumulators`. No ambient globals. The engine tests without a bucket.
//!
//! 📜 Ancient proverb: "He who counts records when the census counted files,
//! completes never or twice."

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::fs::OpenOptions;
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, trace};

use crate::decode::NdjsonReader;
use crate::scratch::Scratch;

/// 📦 One group's staging state: how many files it has eaten, and where the
/// lines went.
#[derive(Debug)]
struct GroupState {
    processed: u64,
    staging: PathBuf,
}

/// 📦 Per-group staging buffers plus the census ledger they answer to.
///
/// Created once per run with the expected counts; groups materialize lazily
/// on their first [`append`](Accumulators::append) and vanish at
/// [`discard`](Accumulators::discard). Asking about a group that never
/// appended is a contract violation and fails fast — the orchestrator's
/// state machine is supposed to make that impossible, and we'd rather learn
/// it didn't from a bail than from a silent zero.
#[derive(Debug)]
pub(crate) struct Accumulators {
    scratch: Scratch,
    expected: HashMap<String, u64>,
    groups: HashMap<String, GroupState>,
}

impl Accumulators {
    pub(crate) fn new(scratch: Scratch, expected: HashMap<String, u64>) -> Self {
        Self {
            scratch,
            expected,
            groups: HashMap::new(),
        }
    }

    /// 📊 The census total — the merge pass's progress-bar denominator.
    pub(crate) fn expected_total_files(&self) -> u64 {
        self.expected.values().sum()
    }

    /// 📊 How many groups the census put on the books.
    pub(crate) fn groups_discovered(&self) -> usize {
        self.expected.len()
    }

    /// 🔍 Did the census count this group? The orchestrator checks before
    /// appending, so a bucket that changed between passes gets a skip-and-warn
    /// instead of the contract-violation bail below.
    pub(crate) fn expects(&self, group: &str) -> bool {
        self.expected.contains_key(group)
    }

    /// ⚠️ Groups still short of their census count — only ever non-empty
    /// when the bucket shifted between the two passes.
    pub(crate) fn unfinished_groups(&self) -> Vec<String> {
        let mut unfinished: Vec<String> = self
            .groups
            .iter()
            .filter(|(group, state)| state.processed < self.expected[group.as_str()])
            .map(|(group, _)| group.clone())
            .collect();
        unfinished.sort();
        unfinished
    }

    /// 📥 Streams every record of one source document onto the group's
    /// staging file, then bumps the group's processed-files count by one.
    ///
    /// The staging file is opened in append mode per document and flushed
    /// before this returns, so a group with a thousand files never holds a
    /// thousand open handles — or even two.
    ///
    /// 💀 Bails if the census never heard of `group`: the orchestrator only
    /// appends groups it classified during the merge pass, and both passes
    /// share one classifier, so this firing means the store changed under us.
    pub(crate) async fn append(
        &mut self,
        group: &str,
        records: &mut NdjsonReader,
    ) -> Result<u64> {
        if !self.expected.contains_key(group) {
            bail!(
                "💀 Contract violation: group '{group}' was never counted by the \
                 census, yet here we are appending to it. Either the bucket \
                 changed mid-run or the two passes stopped agreeing on the \
                 classifier. Both deserve a loud crash."
            );
        }

        let state = match self.groups.entry(group.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                // 🐣 first file for this group — Unseen becomes Accumulating
                let staging = self.scratch.staging_path(group);
                debug!("🐣 group '{group}' opens its staging file at {}", staging.display());
                entry.insert(GroupState {
                    processed: 0,
                    staging,
                })
            }
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&state.staging)
            .await
            .context(format!(
                "💀 Could not open staging file '{}' for appending",
                state.staging.display()
            ))?;
        let mut writer = io::BufWriter::new(file);

        let mut records_written = 0u64;
        while let Some(record) = records.next_record().await? {
            // 📦 compact re-serialization: one record, one line, no decoration
            let line = serde_json::to_string(&record)
                .context("💀 A record that parsed refused to re-serialize. Exotic.")?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            records_written += 1;
        }
        writer.flush().await.context(format!(
            "💀 Flush to staging file '{}' failed — the lines were SO close to disk",
            state.staging.display()
        ))?;

        state.processed += 1;
        trace!(
            "📥 group '{}' absorbed {} records (file {}/{})",
            group,
            records_written,
            state.processed,
            self.expected[group]
        );
        Ok(records_written)
    }

    /// ✅ True exactly when the group has eaten as many files as the census
    /// promised. Count-reaches-expected. No minus one. Ever.
    pub(crate) fn is_complete(&self, group: &str) -> Result<bool> {
        let state = self.known(group)?;
        Ok(state.processed == self.expected[group])
    }

    /// 📤 Hands out the staging path for upload. Only legal once complete —
    /// shipping a partial merge is worse than shipping nothing, because it
    /// looks like success.
    pub(crate) fn finalize(&self, group: &str) -> Result<&Path> {
        let state = self.known(group)?;
        if state.processed != self.expected[group] {
            bail!(
                "💀 Contract violation: finalize('{group}') at {}/{} files. The \
                 orchestrator tried to ship a group that is still chewing.",
                state.processed,
                self.expected[group]
            );
        }
        Ok(&state.staging)
    }

    /// 🗑️ Deletes the group's staging file and forgets the group. Runs after
    /// commit, successful or not — no partial state outlives its group.
    pub(crate) async fn discard(&mut self, group: &str) -> Result<()> {
        let state = match self.groups.remove(group) {
            Some(state) => state,
            None => bail!("💀 Contract violation: discard('{group}') on a group with no state"),
        };
        self.scratch.remove(&state.staging).await
    }

    /// 🧹 Best-effort teardown for fatal-error paths: every staging file
    /// goes, so an aborted run doesn't leave the scratch dir full of orphans.
    pub(crate) async fn discard_all(&mut self) {
        for (group, state) in self.groups.drain() {
            if let Err(error) = self.scratch.remove(&state.staging).await {
                debug!("🧹 could not evict staging for '{group}' during teardown: {error:#}");
            }
        }
    }

    fn known(&self, group: &str) -> Result<&GroupState> {
        match self.groups.get(group) {
            Some(state) => Ok(state),
            None => bail!(
                "💀 Contract violation: group '{group}' was asked about before its \
                 first append. The state machine has no such state."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn doc(dir: &tempfile::TempDir, name: &str, contents: &str) -> NdjsonReader {
        let path = dir.path().join(name);
        tokio::fs::write(&path, contents).await.unwrap();
        NdjsonReader::open(&path).await.unwrap()
    }

    async fn rig(expected: &[(&str, u64)]) -> (tempfile::TempDir, Accumulators) {
        let dir = tempfile::tempdir().unwrap();
        let scratch = Scratch::prepare(dir.path().to_path_buf()).await.unwrap();
        let expected = expected
            .iter()
            .map(|(g, n)| (g.to_string(), *n))
            .collect();
        let acc = Accumulators::new(scratch, expected);
        (dir, acc)
    }

    #[tokio::test]
    async fn the_one_where_completion_counts_files_not_records() {
        let (dir, mut acc) = rig(&[("a", 2)]).await;

        // 📄 first file carries THREE records — still only one file
        let mut first = doc(&dir, "a_2020.json", "{\"x\":1}\n{\"x\":2}\n{\"x\":3}\n").await;
        assert_eq!(acc.append("a", &mut first).await.unwrap(), 3);
        assert!(!acc.is_complete("a").unwrap());

        let mut second = doc(&dir, "a_2021.json", "{\"x\":4}\n").await;
        acc.append("a", &mut second).await.unwrap();
        assert!(acc.is_complete("a").unwrap());
    }

    #[tokio::test]
    async fn the_one_where_a_count_of_one_completes_on_arrival() {
        let (dir, mut acc) = rig(&[("b", 1)]).await;
        let mut only = doc(&dir, "b_1999.json", "{\"x\":1}\n").await;
        acc.append("b", &mut only).await.unwrap();
        assert!(acc.is_complete("b").unwrap());
    }

    #[tokio::test]
    async fn the_one_where_the_staging_file_reads_back_in_append_order() {
        let (dir, mut acc) = rig(&[("a", 2)]).await;
        let mut first = doc(&dir, "a_2020.json", "{\"x\": 1}\n").await;
        let mut second = doc(&dir, "a_2021.json", "{\"x\": 2}\n").await;
        acc.append("a", &mut first).await.unwrap();
        acc.append("a", &mut second).await.unwrap();

        let merged = tokio::fs::read_to_string(acc.finalize("a").unwrap())
            .await
            .unwrap();
        // compact re-serialization: input spaces are gone, order is arrival order
        assert_eq!(merged, "{\"x\":1}\n{\"x\":2}\n");
    }

    #[tokio::test]
    async fn the_one_where_finalize_refuses_a_half_chewed_group() {
        let (dir, mut acc) = rig(&[("a", 2)]).await;
        let mut first = doc(&dir, "a_2020.json", "{\"x\":1}\n").await;
        acc.append("a", &mut first).await.unwrap();
        assert!(acc.finalize("a").is_err());
    }

    #[tokio::test]
    async fn the_one_where_strangers_get_bounced_at_every_door() {
        let (dir, mut acc) = rig(&[("a", 1)]).await;
        let mut stray = doc(&dir, "z_2020.json", "{\"x\":1}\n").await;

        // census never counted 'z' → append bails
        assert!(acc.append("z", &mut stray).await.is_err());
        // 'a' is in the census but has never appended → asking about it bails
        assert!(acc.is_complete("a").is_err());
        assert!(acc.finalize("a").is_err());
        assert!(acc.discard("a").await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_discard_leaves_no_trace() {
        let (dir, mut acc) = rig(&[("a", 1)]).await;
        let mut only = doc(&dir, "a_2020.json", "{\"x\":1}\n").await;
        acc.append("a", &mut only).await.unwrap();

        let staging = acc.finalize("a").unwrap().to_path_buf();
        assert!(staging.exists());
        acc.discard("a").await.unwrap();
        assert!(!staging.exists());
    }
}
