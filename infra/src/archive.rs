//! Zip encoding of working directories.
//!
//! Entry names are paths relative to the archived directory, joined with
//! `/`. Both directions run on the blocking pool.

use anyhow::{Context, Result};
use bytes::Bytes;
use momentum_base::error::MomentumError;
use std::fs::File;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// relative to the walked directory
    pub path: PathBuf,
    pub size: u64,
}

/// Regular files below `dir`, sorted by relative path.
pub fn list_files(dir: &Path) -> Result<Vec<DirEntryInfo>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| MomentumError::RuntimeError(format!("strip prefix: {:?}", e)))?
            .to_path_buf();
        files.push(DirEntryInfo {
            path,
            size: entry.metadata()?.len(),
        });
    }
    Ok(files)
}

pub fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn zip_directory_blocking(dir: &Path) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for file in list_files(dir)? {
        writer.start_file(entry_name(&file.path), options)?;
        let buf = std::fs::read(dir.join(&file.path))?;
        writer.write_all(&buf)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn unzip_blocking(data: &[u8], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut extracted = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(MomentumError::DataRelayError(format!(
                "zip entry escapes target directory: {}",
                entry.name()
            ))
            .into());
        };
        let target = dir.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        extracted.push(relative);
    }
    Ok(extracted)
}

pub async fn zip_directory(dir: &Path) -> Result<Bytes> {
    let dir = dir.to_path_buf();
    let buf = tokio::task::spawn_blocking(move || zip_directory_blocking(&dir))
        .await
        .map_err(|e| MomentumError::RuntimeError(format!("zip task failed: {:?}", e)))??;
    Ok(Bytes::from(buf))
}

/// Returns the relative paths of the extracted files.
pub async fn unzip_to(data: Bytes, dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || unzip_blocking(&data, &dir))
        .await
        .map_err(|e| MomentumError::RuntimeError(format!("unzip task failed: {:?}", e)))?
}
