//! Capability-based filesystem helpers shared by the loaders, the report
//! writer and the command-line interface.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// Open an input file (geometry or query workload) for reading.
pub fn open_input(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Return whether `path` exists and is a regular file.
///
/// Missing parent directories surface as [`io::ErrorKind::NotFound`].
pub fn input_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_parent(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Create `path` and every missing ancestor as directories.
pub fn ensure_dir(path: &Utf8Path) -> io::Result<()> {
    if path.as_str().is_empty() || path == Utf8Path::new("/") {
        return Ok(());
    }
    let (base_dir, relative) = split_base(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Open `path` for appending, creating the file when it does not exist.
///
/// Existing content is never truncated.
pub fn open_append(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    let (dir, name) = open_parent(path)?;
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    dir.open_with(name.as_str(), &options)
}

/// Open the parent directory of `path` and return it with the file name.
fn open_parent(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("{path} does not name a file")))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Split a directory path into an ambient base directory and a relative
/// suffix that `cap-std` can resolve beneath it.
fn split_base(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();

    let (base, relative) = match std_path.components().next() {
        // Windows drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_path.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_path.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative =
        Utf8PathBuf::from_path_buf(relative).map_err(|_| io::Error::other("non-UTF-8 path"))?;
    Ok((dir, relative))
}
