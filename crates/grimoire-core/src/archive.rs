use std::io::{Cursor, Write as _};
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

use crate::version::Version;

/// Name of the marker file recording the version unpacked into a library.
pub const VERSION_MARKER: &str = "version.txt";

/// Folder inside a release archive whose contents make up the library.
pub const LIBRARY_FOLDER: &str = "Library";

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive entry {entry:?} resolves outside the library directory")]
    UnsafePath { entry: String },
}

impl ArchiveError {
    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Unpack the library folder of a release archive into `root`.
///
/// Release archives wrap everything in one top-level folder, so only regular
/// files shaped like `<top>/Library/<rest>` are extracted, to
/// `<root>/<rest>`. Everything else is skipped. An entry that would land
/// outside `root` aborts the extraction.
///
/// Returns the number of files written.
///
/// # Errors
/// Returns an error when the archive cannot be read, an entry escapes
/// `root`, or a file cannot be written.
pub fn extract_library_archive(bytes: &[u8], root: &Path) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ArchiveError::zip("failed to read zip archive", error))?;
    let root = lexically_clean(root);
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| ArchiveError::zip("failed to read zip entry", error))?;
        if entry.is_dir() || entry.unix_mode().is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
            continue;
        }

        let name = entry.name().to_string();
        let Some(relative) = library_relative_path(&name) else {
            debug!("Skipping archive entry outside the library folder: {name}");
            continue;
        };

        let dest = lexically_clean(&root.join(relative));
        if dest == root {
            debug!("Skipping archive entry that names the library folder itself: {name}");
            continue;
        }
        if !dest.starts_with(&root) {
            warn!("Refusing to extract archive entry outside the library: {name}");
            return Err(ArchiveError::UnsafePath { entry: name });
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                ArchiveError::io("failed to create library directory", parent, error)
            })?;
        }
        let mut file = std::fs::File::create(&dest)
            .map_err(|error| ArchiveError::io("failed to create library file", &dest, error))?;
        std::io::copy(&mut entry, &mut file)
            .map_err(|error| ArchiveError::io("failed to extract archive entry", &dest, error))?;
        extracted += 1;
    }

    debug!("Extracted {extracted} file(s) into {}", root.display());
    Ok(extracted)
}

fn library_relative_path(name: &str) -> Option<&str> {
    let mut parts = name.splitn(3, '/');
    let _top = parts.next()?;
    let folder = parts.next()?;
    let rest = parts.next()?;
    if !folder.eq_ignore_ascii_case(LIBRARY_FOLDER) || rest.is_empty() {
        return None;
    }
    Some(rest)
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexically_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Read the version recorded in `root`'s marker file.
///
/// Returns `Ok(None)` when the marker (or `root` itself) does not exist.
/// Only the first line of the marker is significant.
///
/// # Errors
/// Returns an error when the marker exists but cannot be read.
pub fn read_version_marker(root: &Path) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(root.join(VERSION_MARKER)) {
        Ok(contents) => Ok(Some(
            contents.lines().next().unwrap_or_default().trim().to_string(),
        )),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Atomically replace `root`'s marker file with `version`.
///
/// # Errors
/// Returns an error when the temporary file cannot be written or moved into
/// place.
pub fn write_version_marker(root: &Path, version: Version) -> Result<(), ArchiveError> {
    let marker = root.join(VERSION_MARKER);
    let mut tmp = tempfile::NamedTempFile::new_in(root)
        .map_err(|error| ArchiveError::io("failed to create temporary marker", root, error))?;
    writeln!(tmp, "{version}")
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|error| ArchiveError::io("failed to write version marker", tmp.path(), error))?;
    tmp.persist(&marker)
        .map_err(|error| ArchiveError::io("failed to replace version marker", &marker, error.error))?;
    Ok(())
}
