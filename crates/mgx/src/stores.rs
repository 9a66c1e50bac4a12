//! 🔌 Stores — where the real I/O happens.
//!
//! 🪣 The engine upstairs (census, orchestrator, committer) never talks to
//! AWS directly. It talks to the [`ObjectStore`] trait, and the trait talks
//! to whatever backend got cast for the role. Real S3 in production, a
//! HashMap wearing a bucket costume in tests.
//!
//! 🎭 This module is the casting agency. Trait → concrete impls → enum
//! dispatcher → from_config resolver. Same playbook every time, because the
//! playbook works.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not
//! question the duck.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::StoreConfig;

pub(crate) mod in_mem_store;
pub(crate) mod s3_store;

pub use in_mem_store::InMemoryStoreConfig;
pub use s3_store::S3StoreConfig;

/// 📄 One page of a listing, as the store chose to paginate it.
///
/// `next` is the continuation token: `Some` means "there's more where that
/// came from", `None` means the well is dry. The engine consumes pages lazily
/// and never holds more than one in memory.
#[derive(Debug, Clone)]
pub(crate) struct ListPage {
    pub keys: Vec<String>,
    pub next: Option<String>,
}

/// 🪣 The three store verbs the engine is allowed to know about.
///
/// # Contract
/// - `list_page` walks the full listing page by page when fed its own
///   continuation tokens back. Order is whatever the store says it is.
/// - `download` lands the raw object bytes in `dest`, or errors if the key
///   does not exist. No partial-success diplomacy.
/// - `put_object` re-reads `source` from disk on every call, so a retry
///   uploads the same bytes as the first attempt. Overwrites are fine —
///   re-uploading the same key is how idempotence stays boring.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug {
    /// 📰 Fetch one page of keys under `prefix`, resuming from `continuation`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// 📥 Download `key` into the local file at `dest`. Missing key = error.
    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()>;

    /// 📤 Upload the file at `source` as `key`. Same key twice = overwrite.
    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()>;
}

/// 🎭 The many faces of a store — a polymorphic casting call for buckets.
///
/// Each variant wraps a concrete backend. The enum dispatches via
/// `impl ObjectStore for StoreBackend`, so the census and the orchestrator
/// never need to know whether the "bucket" is in Virginia or in a `BTreeMap`.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    S3(s3_store::S3Store),
    InMemory(in_mem_store::InMemoryStore),
}

impl StoreBackend {
    /// 🚀 Resolve a backend from config. S3 construction actually dials the
    /// credential chain; the in-memory one just allocates and shrugs.
    pub(crate) async fn from_config(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::S3(s3) => Ok(StoreBackend::S3(s3_store::S3Store::new(s3.clone()).await?)),
            StoreConfig::InMemory(mem) => Ok(StoreBackend::InMemory(
                in_mem_store::InMemoryStore::new(mem.clone()),
            )),
        }
    }
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        match self {
            StoreBackend::S3(s) => s.list_page(bucket, prefix, continuation).await,
            StoreBackend::InMemory(m) => m.list_page(bucket, prefix, continuation).await,
        }
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        match self {
            StoreBackend::S3(s) => s.download(bucket, key, dest).await,
            StoreBackend::InMemory(m) => m.download(bucket, key, dest).await,
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        match self {
            StoreBackend::S3(s) => s.put_object(bucket, key, source).await,
            StoreBackend::InMemory(m) => m.put_object(bucket, key, source).await,
        }
    }
}
