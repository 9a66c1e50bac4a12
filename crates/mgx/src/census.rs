//! 📊 census.rs — the headcount before the merge.
//!
//! 🎬 *[clipboard in hand, the census taker walks the bucket]*
//! "Group `a`? Two files. Group `b`? One file. Everyone else? Not my
//! department."
//!
//! Completion detection needs to know, per group, exactly how many files are
//! coming BEFORE the first one is processed. That knowledge only exists
//! after a full listing pass, which is why this pipeline walks the bucket
//! twice: once to count, once to merge. Two passes is the price of knowing
//! when a group is done. It is not an accident, and one-pass "optimizations"
//! here are how merged files go out missing their last year of data.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::classify::classify;
use crate::stores::{ObjectStore, StoreBackend};

/// 📊 Walks the full listing once and returns `GroupId → expected file count`.
///
/// Non-qualifying keys are skipped in silence — a `.txt` straggler in the
/// prefix is scenery, not an error. Every group in the result has count ≥ 1
/// by construction; a group nobody saw simply isn't in the map.
///
/// 💀 A listing failure here is fatal to the whole run: an incomplete census
/// means incomplete expected counts, and incomplete expected counts mean
/// groups that either commit early or wait forever. Neither is a pipeline.
pub(crate) async fn census(
    store: &StoreBackend,
    bucket: &str,
    prefix: &str,
) -> Result<HashMap<String, u64>> {
    info!("📊 counting files per group in s3://{bucket}/{prefix}...");

    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut continuation: Option<String> = None;
    let mut pages = 0u64;

    loop {
        let page = store
            .list_page(bucket, prefix, continuation)
            .await
            .context(
                "💀 The census listing died mid-walk. Without a complete headcount \
                 the completion math is fiction, so this run is over. Check \
                 credentials and the bucket name before blaming the network.",
            )?;
        pages += 1;

        for key in &page.keys {
            match classify(key) {
                Some(group) => *counts.entry(group).or_insert(0) += 1,
                // 🤷 not a yearly JSON shard — walk on by
                None => debug!("🤷 skipping non-qualifying key '{key}'"),
            }
        }

        match page.next {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    let total_files: u64 = counts.values().sum();
    info!(
        "📊 census complete: {} groups, {} files, {} listing pages",
        counts.len(),
        total_files,
        pages
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::in_mem_store::InMemoryStore;

    fn seeded_store(page_size: usize) -> StoreBackend {
        StoreBackend::InMemory(InMemoryStore::seeded(
            page_size,
            &[
                ("vault", "feed/a_2020.json", "{}"),
                ("vault", "feed/a_2021.json", "{}"),
                ("vault", "feed/b_1999.json", "{}"),
                ("vault", "feed/notes.txt", "scenery"),
                ("vault", "feed/noyear.json", "{}"),
            ],
        ))
    }

    #[tokio::test]
    async fn the_one_where_the_headcount_comes_out_right() {
        let store = seeded_store(100);
        let counts = census(&store, "vault", "feed/").await.unwrap();

        assert_eq!(counts.len(), 2);
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);
    }

    #[tokio::test]
    async fn the_one_where_pagination_does_not_lose_anyone() {
        // 📰 page size 1 forces a continuation token between every key
        let store = seeded_store(1);
        let counts = census(&store, "vault", "feed/").await.unwrap();

        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);
    }

    #[tokio::test]
    async fn the_one_where_bystanders_never_make_the_ledger() {
        let store = seeded_store(100);
        let counts = census(&store, "vault", "feed/").await.unwrap();

        // notes.txt and noyear.json: seen, classified, shown the door
        assert!(!counts.keys().any(|g| g.contains("notes")));
        assert!(!counts.keys().any(|g| g.contains("noyear")));
    }
}
