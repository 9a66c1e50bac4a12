//! # Previously, on Mergex...
//!
//! 🎬 The engine needed a bucket. A real bucket costs money and an IAM
//! ticket. So someone built a bucket out of a `BTreeMap`, taught it to
//! paginate, and gave it a self-destruct switch for upload testing.
//!
//! That someone was this module.
//!
//! `in_mem_store` provides an in-memory [`ObjectStore`] for tests and local
//! development. Keys live in a `BTreeMap`, so listing order is lexicographic
//! — the same order real S3 hands back, which matters exactly as much as
//! listing order ever matters here (not at all, completion is count-based).
//!
//! 🦆
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying
//! this to prod, your merged files have the lifespan of a mayfly.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::stores::{ListPage, ObjectStore};

/// 🔧 Configuration for the in-memory store. One knob. It's a fake bucket,
/// not a spaceship.
#[derive(Debug, Deserialize, Clone)]
pub struct InMemoryStoreConfig {
    /// 📰 How many keys per listing page — small values make pagination
    /// tests actually paginate instead of politely fitting in one page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    1000
}

/// 🪣 A bucket made of RAM and good intentions.
///
/// Objects are keyed by `bucket/key` in one shared `BTreeMap` behind an
/// `Arc<Mutex<...>>`, so a test can keep a clone of the store and inspect
/// what the engine uploaded. Communist data, but in a good way.
///
/// `fail_uploads` turns every `put_object` into a rejection letter while the
/// attempt counter keeps score — that's the entire retry-exhaustion test rig.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryStore {
    page_size: usize,
    objects: Arc<tokio::sync::Mutex<BTreeMap<String, Vec<u8>>>>,
    fail_uploads: bool,
    upload_attempts: Arc<AtomicU32>,
}

impl InMemoryStore {
    /// 🚀 An empty fake bucket, straight from config. No network. No auth.
    /// No heartbeat. Just vibes and heap memory.
    pub(crate) fn new(config: InMemoryStoreConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            ..Self::default()
        }
    }

    /// 🧪 A fake bucket pre-stocked with objects, for tests that want a
    /// corpus without writing a fixture loader.
    #[cfg(test)]
    pub(crate) fn seeded(page_size: usize, objects: &[(&str, &str, &str)]) -> Self {
        let mut map = BTreeMap::new();
        for (bucket, key, body) in objects {
            map.insert(format!("{bucket}/{key}"), body.as_bytes().to_vec());
        }
        Self {
            page_size: page_size.max(1),
            objects: Arc::new(tokio::sync::Mutex::new(map)),
            fail_uploads: false,
            upload_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// 🧪 Flip the self-destruct switch: every upload from here on fails,
    /// but the attempt counter keeps counting.
    #[cfg(test)]
    pub(crate) fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// 🧪 How many times `put_object` was called, success or not.
    #[cfg(test)]
    pub(crate) fn upload_attempts(&self) -> u32 {
        self.upload_attempts.load(Ordering::SeqCst)
    }

    /// 🧪 Peek at an object, the way a test peeks at everything.
    #[cfg(test)]
    pub(crate) async fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(&format!("{bucket}/{key}"))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    /// 📰 Paginates the BTreeMap like it's 2006-03-01. The continuation
    /// token is just a stringified offset — the engine treats tokens as
    /// opaque, and this one is about as opaque as a window.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let offset: usize = match continuation {
            Some(token) => token
                .parse()
                .map_err(|_| anyhow::anyhow!("💀 bogus continuation token '{token}'"))?,
            None => 0,
        };

        let full_prefix = format!("{bucket}/{prefix}");
        let bucket_prefix_len = bucket.len() + 1;
        let matching: Vec<String> = self
            .objects
            .lock()
            .await
            .keys()
            .filter(|stored| stored.starts_with(&full_prefix))
            .map(|stored| stored[bucket_prefix_len..].to_string())
            .collect();

        let keys: Vec<String> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let consumed = offset + keys.len();
        let next = (consumed < matching.len()).then(|| consumed.to_string());

        Ok(ListPage { keys, next })
    }

    /// 📥 "Download": copy bytes from the map into a real file, because the
    /// engine downstream genuinely reads scratch files off disk.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let body = match self.objects.lock().await.get(&format!("{bucket}/{key}")) {
            Some(body) => body.clone(),
            // 💀 NoSuchKey, RAM edition. Same contract as the real store.
            None => bail!("💀 NoSuchKey: '{key}' is not in fake bucket '{bucket}'"),
        };
        tokio::fs::write(dest, body).await?;
        Ok(())
    }

    /// 📤 "Upload": read the staged file and stash it in the map — unless
    /// the self-destruct switch is on, in which case: rejection, counted.
    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        self.upload_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            bail!("💀 upload rejected by decree of the test harness");
        }
        let body = tokio::fs::read(source).await?;
        self.objects
            .lock()
            .await
            .insert(format!("{bucket}/{key}"), body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn the_one_where_the_fake_bucket_paginates_for_real() {
        let store = InMemoryStore::seeded(
            2,
            &[
                ("vault", "p/a.json", "{}"),
                ("vault", "p/b.json", "{}"),
                ("vault", "p/c.json", "{}"),
                ("vault", "q/other.json", "{}"),
            ],
        );

        let first = store.list_page("vault", "p/", None).await.unwrap();
        assert_eq!(first.keys, vec!["p/a.json", "p/b.json"]);
        let second = store
            .list_page("vault", "p/", first.next)
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["p/c.json"]);
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn the_one_where_a_missing_key_is_an_error_not_a_shrug() {
        let store = InMemoryStore::seeded(10, &[]);
        let scratch = tempfile::tempdir().unwrap();
        let dest = scratch.path().join("nope.json");
        assert!(store.download("vault", "ghost.json", &dest).await.is_err());
    }
}
