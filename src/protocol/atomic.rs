//! Scoped output-file writes
//!
//! Content goes to a temporary file in the destination directory and is
//! renamed over the target only after it has been flushed and synced. On any
//! error the temporary file is dropped (and removed), so the destination either
//! keeps its previous content or receives the complete new content.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::ProtocolError;

/// Atomically replace `path` with `contents`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically write a protocol text file.
pub fn write_text(path: &Path, text: &str) -> Result<(), ProtocolError> {
    write_atomic(path, text.as_bytes()).map_err(|source| ProtocolError::Io {
        path: path.to_path_buf(),
        source,
    })
}
