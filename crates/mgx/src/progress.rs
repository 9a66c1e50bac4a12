//! 📊 progress.rs — "Are we there yet?" — every merge run, every time, forever.
//!
//! Two jobs, both cosmetic, both load-bearing for morale:
//! - a progress bar over the census file total while the merge pass chews
//! - the end-of-run summary table, because scrolling back through ten
//!   thousand log lines to learn "did it work?" is a hazing ritual, not UX
//!
//! ⚠️ Warning: watching the progress bar will not make it go faster.
//! Neither will refreshing it. We've tried. Science says no.

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::orchestrator::RunReport;

/// 📊 A bar sized to the census grand total — one tick per source file
/// merged. The denominator was bought and paid for by the census pass, so
/// unlike most progress bars, this one does not lie.
pub(crate) fn merge_bar(total_files: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_files);
    bar.set_style(
        ProgressStyle::with_template(
            "🪣 {bar:40.cyan/blue} {pos}/{len} files {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

/// 🍽️ The final table: what the run discovered, merged, shipped, and botched.
///
/// NOTHING preset — borders are for spreadsheets. The failed-group list is
/// squeezed into one cell because a run with many failed groups has bigger
/// problems than table aesthetics.
pub fn summary_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let mut row = |label: &str, value: String| {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    };
    row("📊 groups discovered", report.groups_discovered.to_string());
    row("📄 files merged", report.files_merged.to_string());
    row("✅ groups committed", report.groups_committed.to_string());
    row("💀 groups failed", report.groups_failed.len().to_string());
    if !report.groups_failed.is_empty() {
        row("   the fallen", report.groups_failed.join(", "));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_fallen_only_appear_when_there_are_fallen() {
        let clean = RunReport {
            groups_discovered: 2,
            files_merged: 3,
            groups_committed: 2,
            groups_failed: vec![],
        };
        assert!(!summary_table(&clean).to_string().contains("the fallen"));

        let bruised = RunReport {
            groups_failed: vec!["a".to_string()],
            ..clean
        };
        let rendered = summary_table(&bruised).to_string();
        assert!(rendered.contains("the fallen"));
        assert!(rendered.contains('a'));
    }
}
