use std::time::SystemTime;

use colored::Colorize;
use supports_color::Stream;

use treestat::ext::SystemTimeExt;
use treestat::tree::{DirTree, NodeId, ReadState, Summary};

use crate::application::RuntimeConfig;

const SIZE_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
const FILES_ROW_NAME: &str = "<files>";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReportRow {
    level: u32,
    name: String,
    summary: Summary,
    aborted: bool,
    is_files: bool,
}

/// Prints the totals of the root and its subdirectories, largest first.
pub struct ReportPrinter {
    depth: u32,
    now: i64,
}

impl ReportPrinter {
    pub fn new(config: &RuntimeConfig) -> Self {
        if !config.color || supports_color::on(Stream::Stdout).is_none() {
            colored::control::set_override(false);
        }
        Self {
            depth: config.depth,
            now: SystemTime::now().to_unix_seconds(),
        }
    }

    pub fn print(&self, tree: &mut DirTree, root: NodeId) {
        for row in self.collect_rows(tree, root) {
            println!("{}", self.format_row(&row));
        }
    }

    fn collect_rows(&self, tree: &mut DirTree, root: NodeId) -> Vec<ReportRow> {
        let mut rows = Vec::new();
        let name = tree.path(root);
        self.collect_dir(tree, root, 0, name, &mut rows);
        rows
    }

    fn collect_dir(
        &self,
        tree: &mut DirTree,
        dir: NodeId,
        level: u32,
        name: String,
        rows: &mut Vec<ReportRow>,
    ) {
        rows.push(ReportRow {
            level,
            name,
            summary: tree.summary(dir),
            aborted: tree.read_state(dir) == ReadState::Aborted,
            is_files: false,
        });
        if level >= self.depth {
            return;
        }

        let sub_dirs: Vec<NodeId> = tree
            .children(dir)
            .filter(|&child| tree.node(child).is_dir())
            .collect();
        let mut sized: Vec<(u64, NodeId)> = sub_dirs
            .into_iter()
            .map(|sub_dir| (tree.total_size(sub_dir), sub_dir))
            .collect();
        sized.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, sub_dir) in sized {
            let name = tree.node(sub_dir).name().to_string();
            self.collect_dir(tree, sub_dir, level + 1, name, rows);
        }

        let files = Self::files_summary(tree, dir);
        if files.items > 0 {
            rows.push(ReportRow {
                level: level + 1,
                name: FILES_ROW_NAME.to_string(),
                summary: files,
                aborted: false,
                is_files: true,
            });
        }
    }

    /// Totals of the non-directory entries directly inside `dir`.
    fn files_summary(tree: &mut DirTree, dir: NodeId) -> Summary {
        if let Some(dot_entry) = tree.dot_entry(dir) {
            return tree.summary(dot_entry);
        }

        // Finalized directories without subdirectories hold their files directly.
        let mut files = Summary {
            latest_mtime: i64::MIN,
            ..Summary::default()
        };
        for child in tree.children(dir) {
            let node = tree.node(child);
            if node.is_dir() {
                continue;
            }
            files.size += node.size();
            files.blocks += node.blocks();
            files.items += 1;
            files.files += u64::from(node.is_file());
            files.latest_mtime = files.latest_mtime.max(node.mtime());
        }
        files
    }

    fn format_row(&self, row: &ReportRow) -> String {
        let indent = "  ".repeat(row.level as usize);
        let name = if row.is_files {
            row.name.dimmed()
        } else if row.level == 0 {
            row.name.bold()
        } else {
            row.name.blue()
        };

        let mut line = format!(
            "{}  {:>8} items  {:>4}  {}{}",
            format!("{:>10}", human_size(row.summary.size)).green(),
            row.summary.items,
            human_age(self.now.saturating_sub(row.summary.latest_mtime)),
            indent,
            name
        );
        if row.aborted {
            line.push_str(&format!(" {}", "(aborted)".red()));
        }
        line
    }
}

fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", SIZE_UNITS[unit])
    }
}

/// Compact age of the newest change, e.g. `5m` or `3d`.
fn human_age(seconds: i64) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const YEAR: i64 = 365 * DAY;

    match seconds {
        s if s < MINUTE => "now".to_string(),
        s if s < HOUR => format!("{}m", s / MINUTE),
        s if s < DAY => format!("{}h", s / HOUR),
        s if s < YEAR => format!("{}d", s / DAY),
        s => format!("{}y", s / YEAR),
    }
}
