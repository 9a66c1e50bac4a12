//! 📖 decode.rs — reads a downloaded document one JSON line at a time.
//!
//! The source documents are newline-delimited JSON. We read them the way the
//! disk likes to be read: a `BufReader`, a `read_line` loop, one record in
//! memory at a time. The whole document never visits the heap at once, which
//! is the entire reason the pipeline's memory bill stays flat no matter how
//! chonky a group gets.
//!
//! ⚠️ A malformed line is a decode error, and decode errors are fatal to the
//! run — a half-parsed document means a group's counts can't be trusted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt};

/// 📖 A lazy NDJSON reader over one scratch file.
///
/// Call [`next_record`](NdjsonReader::next_record) until it yields `None`.
/// Blank lines are skipped without comment. Broken lines are reported with
/// their line number, because "invalid JSON somewhere in 2GB" is not an
/// error message, it's a hostage note.
pub(crate) struct NdjsonReader {
    reader: io::BufReader<File>,
    path: PathBuf,
    line_no: u64,
    line: String,
}

impl std::fmt::Debug for NdjsonReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonReader")
            .field("path", &self.path)
            .field("line_no", &self.line_no)
            .finish()
    }
}

impl NdjsonReader {
    /// 🚀 Opens the scratch file for lazy reading.
    pub(crate) async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await.context(format!(
            "💀 Could not open downloaded document '{}'. We JUST put it there.",
            path.display()
        ))?;
        Ok(Self {
            reader: io::BufReader::new(file),
            path: path.to_path_buf(),
            line_no: 0,
            line: String::new(),
        })
    }

    /// 📦 The next decoded record, or `None` at end of file.
    ///
    /// One line in, one `serde_json::Value` out. The accumulator will
    /// re-serialize it compactly — decode-then-encode is what normalizes
    /// whatever whitespace crimes the producer committed.
    pub(crate) async fn next_record(&mut self) -> Result<Option<serde_json::Value>> {
        loop {
            self.line.clear();
            let bytes_read = self.reader.read_line(&mut self.line).await.context(format!(
                "💀 I/O error while reading '{}' around line {}",
                self.path.display(),
                self.line_no + 1
            ))?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            // 🧹 strip trailing newline droppings, same hygiene as everywhere else
            let trimmed = self.line.trim_end_matches('\n').trim_end_matches('\r');
            if trimmed.is_empty() {
                continue;
            }

            let record: serde_json::Value = serde_json::from_str(trimmed).context(format!(
                "💀 Line {} of '{}' is not JSON. The document lied about being \
                 newline-delimited JSON, and a lying document poisons its whole \
                 group's counts — so this run stops here.",
                self.line_no,
                self.path.display()
            ))?;
            return Ok(Some(record));
        }
    }
}
