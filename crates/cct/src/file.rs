//! Saving and loading tree files.
//!
//! Saves go through a temporary file in the target directory that is flushed,
//! optionally fsynced, and renamed over the destination, so a crash leaves
//! either the old file or the complete new one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use callpath_format::{CodecError, HeapAlloc};
use tracing::info;

use crate::config::{CodecConfig, ConfigError};
use crate::reader::{CallTreeBuilder, ReadSummary, TreeReader};
use crate::writer::{CallTreeSource, TreeParams, TreeWriter, WriteSummary};

/// Errors from the file helpers.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// Filesystem operation failed.
    #[error("{op} '{}': {source}", .path.display())]
    Io {
        /// What was being done
        op: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for file operations.
pub type FileResult<T> = std::result::Result<T, FileError>;

fn io_err<'a>(op: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> FileError + 'a {
    move |source| FileError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Temporary path used while saving `path`: `.<name>.tmp` in the same directory.
pub fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write a tree to `path` crash-safely.
///
/// On any failure before the rename the temporary file is removed and the
/// previous contents of `path` are left untouched.
pub fn save_tree_file<S>(
    path: &Path,
    source: &S,
    root: S::Node,
    params: TreeParams,
    config: &CodecConfig,
) -> FileResult<WriteSummary>
where
    S: CallTreeSource + ?Sized,
{
    let writer = TreeWriter::from_config(config)?;
    let tmp = temp_path(path);

    let summary = match write_temp(&tmp, &writer, source, root, params, config.sync_on_save) {
        Ok(summary) => summary,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };

    fs::rename(&tmp, path).map_err(io_err("rename", path))?;
    if config.sync_on_save {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(io_err("sync", parent))?;
        }
    }

    info!(
        target: "callpath::cct",
        path = %path.display(),
        num_nodes = summary.num_nodes,
        bytes = summary.bytes,
        "Tree file saved"
    );
    Ok(summary)
}

fn write_temp<S>(
    tmp: &Path,
    writer: &TreeWriter,
    source: &S,
    root: S::Node,
    params: TreeParams,
    sync: bool,
) -> FileResult<WriteSummary>
where
    S: CallTreeSource + ?Sized,
{
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)
        .map_err(io_err("create", tmp))?;
    let mut out = BufWriter::new(file);
    let summary = writer.write(&mut out, source, root, params)?;
    out.flush().map_err(io_err("flush", tmp))?;
    if sync {
        out.get_ref().sync_all().map_err(io_err("sync", tmp))?;
    }
    Ok(summary)
}

/// Read a tree file into `builder`.
pub fn load_tree_file<B>(
    path: &Path,
    builder: &mut B,
    num_metrics: usize,
    config: &CodecConfig,
) -> FileResult<ReadSummary<B::Handle>>
where
    B: CallTreeBuilder + ?Sized,
{
    let file = File::open(path).map_err(io_err("open", path))?;
    let mut input = BufReader::new(file);
    let summary =
        TreeReader::from_config(config).read(&mut input, builder, &mut HeapAlloc, num_metrics)?;
    info!(
        target: "callpath::cct",
        path = %path.display(),
        num_nodes = summary.header.num_nodes(),
        "Tree file loaded"
    );
    Ok(summary)
}
