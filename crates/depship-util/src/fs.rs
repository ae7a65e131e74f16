use std::fs;
use std::io;
use std::path::Path;

/// Read a file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_to_string_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Remove a directory tree (if present) and recreate it empty.
///
/// # Errors
/// Returns an error if the existing tree cannot be removed or the directory
/// cannot be created.
pub fn reset_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path)
}

/// Copy a single file, creating missing parent directories of `dest`.
///
/// Permissions are carried over by `std::fs::copy`. Returns the number of
/// bytes copied.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the copy fails.
pub fn copy_file(src: &Path, dest: &Path) -> io::Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest)
}
