//! Input discovery and enumeration of the CSV batches inside each archive.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Container formats accepted in the input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Every `.csv` entry is one batch.
    Zip,
    /// The file itself is one batch.
    Csv,
    /// Gzip-compressed single batch.
    GzipCsv,
}

impl ArchiveKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".csv.gz") {
            Some(ArchiveKind::GzipCsv)
        } else if name.ends_with(".csv") {
            Some(ArchiveKind::Csv)
        } else {
            None
        }
    }
}

/// Lists the archives in `dir`, sorted by file name so runs are repeatable.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in
        fs::read_dir(dir).with_context(|| format!("cannot read input directory {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && ArchiveKind::from_path(&path).is_some() {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Whether a zip entry holds trip data (skips macOS resource forks).
pub fn is_batch_entry(name: &str) -> bool {
    name.ends_with(".csv") && !name.contains("__MACOSX")
}

/// Calls `visit` once per batch in the archive, in archive order, with the
/// batch's source identifier (`<file>:<entry>`) and a reader over its bytes.
///
/// An entry that cannot be opened is handed to `visit` as an error so the
/// caller can skip it and carry on.
///
/// # Errors
///
/// Returns an error only if the archive itself cannot be opened.
pub fn for_each_batch<F>(path: &Path, mut visit: F) -> Result<()>
where
    F: FnMut(&str, Result<&mut dyn Read>),
{
    let kind = ArchiveKind::from_path(path)
        .with_context(|| format!("unsupported input file {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;

    match kind {
        ArchiveKind::Csv => {
            let reader: &mut dyn Read = &mut BufReader::new(file);
            visit(&file_name, Ok(reader));
        }
        ArchiveKind::GzipCsv => {
            let reader: &mut dyn Read = &mut GzDecoder::new(BufReader::new(file));
            visit(&file_name, Ok(reader));
        }
        ArchiveKind::Zip => {
            let mut archive = ZipArchive::new(BufReader::new(file))
                .with_context(|| format!("{file_name} is not a readable zip archive"))?;

            for index in 0..archive.len() {
                let mut entry = match archive.by_index(index) {
                    Ok(entry) => entry,
                    Err(e) => {
                        let source = format!("{file_name}:#{index}");
                        visit(&source, Err(anyhow::Error::new(e).context("cannot open zip entry")));
                        continue;
                    }
                };
                if entry.is_dir() || !is_batch_entry(entry.name()) {
                    continue;
                }
                let source = format!("{file_name}:{}", entry.name());
                let reader: &mut dyn Read = &mut entry;
                visit(&source, Ok(reader));
            }
        }
    }

    Ok(())
}
