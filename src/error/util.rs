//! Utility functions for error handling
//!
//! File helpers that attach the offending path to every failure.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Safely open a source file with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(Error::source_unreadable(
            path,
            format!("file not found (needed for {purpose})"),
        ));
    }

    if !path.is_file() {
        return Err(Error::source_unreadable(
            path,
            format!("path is not a file (expected a file for {purpose})"),
        ));
    }

    fs::File::open(path).map_err(|e| {
        let reason = match e.kind() {
            io::ErrorKind::PermissionDenied => {
                "permission denied - check file permissions".to_string()
            }
            _ => format!("failed to open file for {purpose}: {e}"),
        };
        Error::source_unreadable(path, reason)
    })
}

/// Replace `path` with `contents` by writing a sibling temporary file and
/// renaming it over the target, so readers never observe a half-written file.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    write_atomically_with(path, |file| {
        file.write_all(contents)?;
        Ok(())
    })
}

/// Like [`write_atomically`], with the contents streamed by `write` into
/// the temporary file. The target is untouched when `write` fails.
pub fn write_atomically_with<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut fs::File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let written = fs::File::create(tmp_path)
        .map_err(Error::from)
        .and_then(|mut file| {
            write(&mut file)?;
            file.sync_all()?;
            Ok(())
        });
    if let Err(e) = written {
        let _ = fs::remove_file(tmp_path);
        return Err(e);
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
