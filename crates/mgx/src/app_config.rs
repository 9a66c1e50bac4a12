//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the
//! fridge. In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::committer::UploadConfig;
use crate::stores::{InMemoryStoreConfig, S3StoreConfig};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
///
/// 🎯 Everything the merge run needs to know: where the shards live, where
/// the merged artifacts go, where the scratch workbench is, and how much
/// patience the uploader gets.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🪣 where the yearly shards are hiding
    pub source_bucket: String,
    /// 📂 the prefix under which they hide
    pub source_prefix: String,
    /// 🪣 where the merged artifacts land (may be the same bucket — the
    /// destination prefix is what keeps the two populations apart)
    pub destination_bucket: String,
    /// 📂 destination key = this prefix + GroupId + ".json"
    pub destination_prefix: String,
    /// 📁 the local workbench. Created at startup if absent.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// 🔁 retry knobs for the upload path — 5 attempts, 500ms doubling base
    /// unless told otherwise
    #[serde(default)]
    pub upload: UploadConfig,
    /// 🔌 which store backend gets cast — real S3 unless a test says otherwise
    #[serde(default)]
    pub store: StoreConfig,
}

/// 🎭 Which backend plays the bucket tonight.
///
/// Externally tagged on purpose: `[store.S3]` / `[store.InMemory]` in TOML,
/// so adding a backend never silently reshapes existing config files.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    S3(S3StoreConfig),
    InMemory(InMemoryStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::S3(S3StoreConfig::default())
    }
}

fn default_scratch_dir() -> PathBuf {
    // 📁 the system temp dir, plus our own room so cleanup can be surgical
    std::env::temp_dir().join("mgx")
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power
/// of hoping.
///
/// 🔧 Merges environment variables (MGX_*) with an optional TOML file.
///   - `config_file_name` is None  → env vars only. No file. No assumptions.
///   - `config_file_name` is Some  → env vars + TOML, merged. TOML wins on
///     conflicts.
///
/// 💀 Returns an error if the result doesn't add up to a valid AppConfig.
/// The error message says which layer to blame. You're welcome, 3am-you.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ env vars are the base layer — like a good sourdough starter.
    // ALL MGX_* vars accepted. No ID required. No velvet rope.
    let config = Figment::new().merge(Env::prefixed("MGX_"));

    // 🎯 conditionally layer in TOML only if a file was actually provided
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment \
             variables (MGX_*). The file exists in our hearts, but apparently \
             its contents and this struct are not on speaking terms.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (MGX_*). \
                 No file was provided — this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
