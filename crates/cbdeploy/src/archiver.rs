use std::{
    fs::{self, File, Metadata},
    io::{self, BufWriter, Seek, Write},
    path::{Component, Path, PathBuf, StripPrefixError},
};

use derive_more::{Display, Error, From};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;
use zip::{write::FileOptions, CompressionMethod, DateTime, ZipWriter};

/// Errors that may occur during the archive creation process.
#[derive(Debug, Display, From, Error)]
pub(crate) enum ArchiverError {
    /// [`zip`]-crate specific error.
    Zip(zip::result::ZipError),

    /// [`walkdir`]-crate specific error.
    WalkDir(walkdir::Error),

    /// IO error.
    Io(io::Error),

    /// Unable to strip source root prefix from path.
    StripPrefix(StripPrefixError),

    /// Source root cannot be inspected.
    #[display(fmt = "unable to read source {}: {}", "path.display()", source)]
    SourceUnavailable {
        /// Requested source root.
        path: PathBuf,

        /// Underlying IO error.
        source: io::Error,
    },

    /// Entry path can not be represented inside of an archive.
    #[display(fmt = "path {} contains non-unicode symbols", "_0.display()")]
    NonUnicodePath(#[error(ignore)] PathBuf),
}

/// Archive `source_root` into a new ZIP file at `destination`.
///
/// Returns the number of written entries. The destination file is created
/// only after the source root was successfully inspected, and is removed again
/// if the archive could not be completed.
#[instrument(skip_all, fields(source = %source_root.display(), destination = %destination.display()))]
pub(crate) fn archive(source_root: &Path, destination: &Path) -> Result<usize, ArchiverError> {
    fs::metadata(source_root).map_err(|source| ArchiverError::SourceUnavailable {
        path: source_root.to_owned(),
        source,
    })?;

    let result = write_archive(source_root, File::create(destination)?);

    match result {
        Ok(entries) => {
            debug!(entries, "archive finalized");
            Ok(entries)
        }
        Err(error) => {
            if let Err(cleanup) = fs::remove_file(destination) {
                warn!(%cleanup, "unable to remove incomplete archive");
            }

            Err(error)
        }
    }
}

/// Write a complete archive into `file` and flush it.
fn write_archive(source_root: &Path, file: File) -> Result<usize, ArchiverError> {
    let mut file = BufWriter::new(file);
    let entries = build_zip_archive(source_root, &mut file)?;
    file.flush()?;

    Ok(entries)
}

/// Write all entries under `source_root` into the provided writer.
///
/// When `source_root` is a directory, every entry name is prefixed with its base name,
/// so that the archive always expands into a single top-level directory.
/// Entry names use forward slashes independently of the host platform, and directory
/// entries end with a trailing slash.
///
/// Symbolic links are followed: a linked file is stored with the target's contents
/// under the link's name. Link cycles are reported as errors.
pub(crate) fn build_zip_archive<W: Write + Seek>(
    source_root: &Path,
    file: W,
) -> Result<usize, ArchiverError> {
    let mut writer = ZipWriter::new(file);

    let canonical_root = fs::canonicalize(source_root)?;
    let root_is_dir = canonical_root.is_dir();
    let base_dir = if root_is_dir {
        canonical_root
            .file_name()
            .map(|name| {
                name.to_str()
                    .map(ToOwned::to_owned)
                    .ok_or_else(|| ArchiverError::NonUnicodePath(canonical_root.clone()))
            })
            .transpose()?
    } else {
        None
    };

    let mut count = 0;
    let mut entries = WalkDir::new(source_root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = entries.next().transpose()? {
        let metadata = entry.metadata()?;

        let relative = if root_is_dir {
            relative_name(entry.path().strip_prefix(source_root)?)?
        } else {
            relative_name(Path::new(entry.file_name()))?
        };

        let Some(name) = entry_name(base_dir.as_deref(), &relative, metadata.is_dir()) else {
            continue;
        };

        let options = entry_options(&metadata);

        if metadata.is_dir() {
            writer.add_directory(name, options)?;
        } else if metadata.is_file() {
            writer.start_file(name, options.compression_method(CompressionMethod::Deflated))?;
            io::copy(&mut File::open(entry.path())?, &mut writer)?;
        } else {
            debug!(path = %entry.path().display(), "skipping special file");
            continue;
        }

        count += 1;
    }

    writer.finish()?;

    Ok(count)
}

/// Join path components with forward slashes.
fn relative_name(path: &Path) -> Result<String, ArchiverError> {
    let mut parts = Vec::new();

    for component in path.components() {
        if let Component::Normal(part) = component {
            parts.push(
                part.to_str()
                    .ok_or_else(|| ArchiverError::NonUnicodePath(path.to_owned()))?
                    .replace('\\', "/"),
            );
        }
    }

    Ok(parts.join("/"))
}

/// Compute the final entry name.
///
/// Returns [`None`] for the unnamed root of an archive without a base directory.
fn entry_name(base_dir: Option<&str>, relative: &str, is_dir: bool) -> Option<String> {
    let mut name = match (base_dir, relative.is_empty()) {
        (Some(base), true) => base.to_owned(),
        (Some(base), false) => format!("{base}/{relative}"),
        (None, true) => return None,
        (None, false) => relative.to_owned(),
    };

    if is_dir {
        name.push('/');
    }

    Some(name)
}

/// Entry options carrying filesystem metadata.
fn entry_options(metadata: &Metadata) -> FileOptions {
    let mut options = FileOptions::default().compression_method(CompressionMethod::Stored);

    if let Some(modified) = metadata
        .modified()
        .ok()
        .and_then(|time| DateTime::try_from(OffsetDateTime::from(time)).ok())
    {
        options = options.last_modified_time(modified);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
    }

    options
}

#[cfg(test)]
mod tests {
    use std::{
        fs::{self, File},
        io::{Cursor, Read},
        path::Path,
    };

    use tempfile::tempdir;
    use zip::{CompressionMethod, ZipArchive};

    use super::{archive, build_zip_archive, entry_name, relative_name, ArchiverError};

    fn create_tree(root: &Path) {
        fs::create_dir_all(root.join("baz/deep")).unwrap();
        fs::write(root.join("bar.txt"), b"hello").unwrap();
        fs::write(root.join("baz/qux.txt"), b"nested contents").unwrap();
        fs::write(root.join("baz/deep/empty.txt"), b"").unwrap();
    }

    fn read_archive(bytes: Vec<u8>) -> ZipArchive<Cursor<Vec<u8>>> {
        ZipArchive::new(Cursor::new(bytes)).expect("unable to read archive")
    }

    #[test]
    fn prefixes_with_root_directory_name() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        create_tree(&source);

        let mut buf = Cursor::new(Vec::new());
        let count = build_zip_archive(&source, &mut buf).expect("unable to archive");

        let mut archive = read_archive(buf.into_inner());
        let mut names: Vec<_> = archive.file_names().map(ToOwned::to_owned).collect();
        names.sort();

        assert_eq!(
            names,
            [
                "foo/",
                "foo/bar.txt",
                "foo/baz/",
                "foo/baz/deep/",
                "foo/baz/deep/empty.txt",
                "foo/baz/qux.txt",
            ]
        );
        assert_eq!(count, names.len());

        let dir_entry = archive.by_name("foo/baz/").unwrap();
        assert!(dir_entry.is_dir());
        assert_eq!(dir_entry.size(), 0);
    }

    #[test]
    fn expands_to_identical_content() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        create_tree(&source);

        let mut buf = Cursor::new(Vec::new());
        build_zip_archive(&source, &mut buf).unwrap();
        let mut archive = read_archive(buf.into_inner());

        for (name, expected) in [
            ("foo/bar.txt", "hello"),
            ("foo/baz/qux.txt", "nested contents"),
            ("foo/baz/deep/empty.txt", ""),
        ] {
            let mut entry = archive.by_name(name).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Deflated);

            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            assert_eq!(contents, expected);
        }
    }

    #[test]
    fn relative_source_root_keeps_directory_name() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        create_tree(&source);

        // `foo/.` has no file name of its own.
        let mut buf = Cursor::new(Vec::new());
        build_zip_archive(&source.join("."), &mut buf).unwrap();

        let archive = read_archive(buf.into_inner());
        assert!(archive.file_names().all(|name| name.starts_with("foo/")));
    }

    #[test]
    fn single_file_source_uses_file_name() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("only.txt");
        fs::write(&file, b"single").unwrap();

        let mut buf = Cursor::new(Vec::new());
        assert_eq!(build_zip_archive(&file, &mut buf).unwrap(), 1);

        let archive = read_archive(buf.into_inner());
        assert_eq!(archive.file_names().collect::<Vec<_>>(), ["only.txt"]);
    }

    #[test]
    fn writes_destination_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        create_tree(&source);
        let destination = dir.path().join("source.zip");

        assert_eq!(archive(&source, &destination).unwrap(), 6);

        let archive = ZipArchive::new(File::open(&destination).unwrap()).unwrap();
        assert_eq!(archive.len(), 6);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("source.zip");

        let error = archive(&dir.path().join("missing"), &destination).unwrap_err();

        assert!(matches!(error, ArchiverError::SourceUnavailable { .. }));
        assert!(!destination.exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_stores_target_contents() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("bar.txt"), b"hello").unwrap();
        fs::write(dir.path().join("shared.txt"), b"shared contents").unwrap();
        symlink("../shared.txt", source.join("link.txt")).unwrap();

        let mut buf = Cursor::new(Vec::new());
        assert_eq!(build_zip_archive(&source, &mut buf).unwrap(), 3);

        let mut archive = read_archive(buf.into_inner());
        let mut contents = String::new();
        archive
            .by_name("foo/link.txt")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "shared contents");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_expanded() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/logo.svg"), b"<svg/>").unwrap();
        symlink("../assets", source.join("assets")).unwrap();

        let mut buf = Cursor::new(Vec::new());
        build_zip_archive(&source, &mut buf).unwrap();

        let mut archive = read_archive(buf.into_inner());
        assert!(archive.by_name("foo/assets/").unwrap().is_dir());
        assert_eq!(archive.by_name("foo/assets/logo.svg").unwrap().size(), 6);
    }

    #[cfg(unix)]
    #[test]
    fn failed_archive_leaves_no_destination() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let source = dir.path().join("foo");
        create_tree(&source);
        symlink("..", source.join("baz/cycle")).unwrap();
        let destination = dir.path().join("source.zip");

        let error = archive(&source, &destination).unwrap_err();

        assert!(matches!(error, ArchiverError::WalkDir(_)));
        assert!(!destination.exists());
    }

    #[test]
    fn names_use_forward_slashes() {
        assert_eq!(
            relative_name(Path::new("baz/deep/empty.txt")).unwrap(),
            "baz/deep/empty.txt"
        );
        assert_eq!(relative_name(Path::new("./a/b")).unwrap(), "a/b");
        assert_eq!(relative_name(Path::new("")).unwrap(), "");
    }

    #[test]
    fn entry_names() {
        assert_eq!(entry_name(Some("foo"), "", true).as_deref(), Some("foo/"));
        assert_eq!(entry_name(Some("foo"), "bar.txt", false).as_deref(), Some("foo/bar.txt"));
        assert_eq!(entry_name(Some("foo"), "baz", true).as_deref(), Some("foo/baz/"));
        assert_eq!(entry_name(None, "only.txt", false).as_deref(), Some("only.txt"));
        assert_eq!(entry_name(None, "", true), None);
    }
}
