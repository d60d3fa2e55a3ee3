//! Activity data relay: moves files between a task's local working
//! directories and the data containers of the run.

use anyhow::Result;
use momentum_infra::archive;
use momentum_infra::run_info::FileInfo;
use std::path::Path;

pub mod handler;

/// Files below `dir` as recorded in RunInfo, with their total size.
pub fn collect_output_files(dir: &Path) -> Result<(Vec<FileInfo>, i64)> {
    let files = archive::list_files(dir)?
        .into_iter()
        .map(|f| FileInfo {
            name: archive::entry_name(&f.path),
            size: f.size as i64,
            ext: f
                .path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        })
        .collect::<Vec<_>>();
    let total = files.iter().map(|f| f.size).sum();
    Ok((files, total))
}
