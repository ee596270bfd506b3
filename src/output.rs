//! Persistence and logging for the finalized document.
//!
//! The document is written to a sibling temporary file and renamed into
//! place, so an interrupted run never leaves a partial document behind.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::analyzers::types::Summary;

/// Logs the summary record as pretty-printed JSON.
pub fn print_json(summary: &Summary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Serializes `value` as JSON to `path`, returning the number of bytes written.
///
/// Creates the parent directory if needed. Compact unless `pretty` is set.
pub fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("cannot create output directory {}", parent.display()))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    debug!(path = %tmp.display(), pretty, "Writing document");

    {
        let file = File::create(tmp).with_context(|| format!("cannot create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, value)?;
        } else {
            serde_json::to_writer(&mut writer, value)?;
        }
        writer.flush()?;
    }

    fs::rename(tmp, path)
        .with_context(|| format!("cannot move {} into place", tmp.display()))?;
    let size = fs::metadata(path)?.len();
    info!(path = %path.display(), bytes = size, "Document written");
    Ok(size)
}
