//! 📁 scratch.rs — landlord of the local scratch directory.
//!
//! Two kinds of tenant live here, both on short leases:
//! - per-document download files, evicted the moment their records are
//!   appended (even when the appending ends in tears)
//! - per-group staging files (`{group}_merged.json`), evicted right after
//!   their group commits — success or failure, no squatters
//!
//! 📜 Ancient proverb: "He who leaves scratch files behind, pages himself
//! about disk space at 3am."

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// 📁 A handle on the scratch directory. Cheap to clone, knows two naming
/// conventions, owns zero open file handles.
#[derive(Debug, Clone)]
pub(crate) struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    /// 🚀 Makes sure the scratch directory exists before anyone moves in.
    /// Idempotent — an already-existing directory is the happy path, not
    /// an incident.
    pub(crate) async fn prepare(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir).await.context(format!(
            "💀 Could not create scratch directory '{}'. We need somewhere to put \
             the documents while we merge them. The cloud is not a workbench.",
            dir.display()
        ))?;
        Ok(Self { dir })
    }

    /// 📄 Where a downloaded document goes. `safe_name` must already be
    /// sanitized — this module does paths, not hygiene.
    pub(crate) fn doc_path(&self, safe_name: &str) -> PathBuf {
        self.dir.join(safe_name)
    }

    /// 📦 Where a group's merged lines accumulate. Same naming the original
    /// vault tooling used, because operators grep for it.
    pub(crate) fn staging_path(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{group}_merged.json"))
    }

    /// 🗑️ Evict a file. A file that is already gone counts as evicted —
    /// cleanup paths run after errors and must not invent new ones.
    pub(crate) async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context(format!(
                "💀 Could not delete scratch file '{}'. It is still there. Staring.",
                path.display()
            )),
        }
    }
}
