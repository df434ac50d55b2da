use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;

use crate::entry::{Classification, MediaCategory};
use crate::error::ScanError;

/// One item as reported by a [`Lister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// The on-disk basename, byte for byte
    pub name: OsString,
    pub is_dir: bool,
    /// POSIX permission bits, 0 where unavailable
    pub mode: u32,
}

impl RawEntry {
    pub fn file(name: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            mode: 0o644,
        }
    }

    pub fn dir(name: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            mode: 0o755,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// A classified item from a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listed {
    pub name: OsString,
    pub class: Classification,
}

impl Listed {
    pub fn is_dir(&self) -> bool {
        self.class.is_dir()
    }

    /// The name for display; invalid UTF-8 is replaced.
    pub fn display_name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }
}

/// Lists a single directory. Implementations must not follow into
/// subdirectories and must be safe to call from a blocking worker thread.
pub trait Lister: Send + Sync {
    fn list(&self, path: &Path) -> Result<Vec<RawEntry>, ScanError>;
}

/// Lists directories on the local filesystem in OS order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl Lister for FsLister {
    fn list(&self, path: &Path) -> Result<Vec<RawEntry>, ScanError> {
        let metadata = fs::metadata(path).map_err(|e| ScanError::from_io(path, &e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let read_dir = fs::read_dir(path).map_err(|e| ScanError::from_io(path, &e))?;

        let mut entries = Vec::new();
        for item in read_dir {
            // Entries that vanish between readdir and stat are skipped
            let Ok(item) = item else { continue };
            let Ok(file_type) = item.file_type() else {
                continue;
            };

            // A symlink carries its target's permissions when the target is
            // a regular file, and none otherwise
            let metadata = if file_type.is_symlink() {
                fs::metadata(item.path()).ok().filter(fs::Metadata::is_file)
            } else {
                item.metadata().ok()
            };
            let mode = metadata.map_or(0, |m| permission_bits(&m));

            entries.push(RawEntry {
                name: item.file_name(),
                is_dir: file_type.is_dir(),
                mode,
            });
        }

        Ok(entries)
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &fs::Metadata) -> u32 {
    0
}

/// Performs one listing of `path` and classifies the result.
///
/// Directories come first, then files. Within each group the lister's
/// original order is kept.
pub fn scan(lister: &dyn Lister, path: &Path) -> Result<Vec<Listed>, ScanError> {
    let mut raw = lister.list(path)?;
    raw.sort_by_key(|entry| !entry.is_dir);

    Ok(raw
        .into_iter()
        .map(|entry| Listed {
            class: classify(&entry),
            name: entry.name,
        })
        .collect())
}

pub fn classify(entry: &RawEntry) -> Classification {
    if entry.is_dir {
        return Classification::Directory;
    }
    if entry.mode & 0o111 != 0 {
        return Classification::Executable;
    }
    match media_category(&entry.name) {
        Some(category) => Classification::Media(category),
        None => Classification::Generic,
    }
}

const AUDIO_EXTENSIONS: &[&str] = &["flac", "opus", "mp3", "ogg", "oga", "m4a", "wav"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "flv", "mkv", "webm"];
const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpe", "jpeg", "png", "gif", "tif", "tiff", "webp", "dng", "xcf", "psd",
];

fn media_category(name: &OsStr) -> Option<MediaCategory> {
    let ext = Path::new(name).extension()?.to_string_lossy().to_lowercase();

    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaCategory::Audio)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaCategory::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaCategory::Image)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct FixedLister(Vec<RawEntry>);

    impl Lister for FixedLister {
        fn list(&self, _path: &Path) -> Result<Vec<RawEntry>, ScanError> {
            Ok(self.0.clone())
        }
    }

    fn names(listing: &[Listed]) -> Vec<&str> {
        listing.iter().map(|l| l.name.to_str().unwrap()).collect()
    }

    #[test]
    fn test_directories_first_in_listing_order() {
        let lister = FixedLister(vec![
            RawEntry::file("zeta.md"),
            RawEntry::dir("src"),
            RawEntry::file("alpha.md"),
            RawEntry::dir("docs"),
            RawEntry::file("mid.md"),
        ]);

        let listing = scan(&lister, Path::new("/project")).unwrap();

        // Not alphabetical: ties keep the lister's order
        assert_eq!(
            names(&listing),
            vec!["src", "docs", "zeta.md", "alpha.md", "mid.md"]
        );
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify(&RawEntry::dir("a.png")), Classification::Directory);
        assert_eq!(
            classify(&RawEntry::file("run.png").with_mode(0o755)),
            Classification::Executable
        );
        assert_eq!(
            classify(&RawEntry::file("run.sh").with_mode(0o700)),
            Classification::Executable
        );
        assert_eq!(
            classify(&RawEntry::file("song.FLAC")),
            Classification::Media(MediaCategory::Audio)
        );
        assert_eq!(
            classify(&RawEntry::file("clip.webm")),
            Classification::Media(MediaCategory::Video)
        );
        assert_eq!(
            classify(&RawEntry::file("photo.jpeg")),
            Classification::Media(MediaCategory::Image)
        );
        assert_eq!(classify(&RawEntry::file("notes.md")), Classification::Generic);
        assert_eq!(classify(&RawEntry::file("Makefile")), Classification::Generic);
        assert_eq!(classify(&RawEntry::file(".png")), Classification::Generic);
    }

    #[test]
    fn test_fs_lister_reads_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("a.txt"), b"hello").unwrap();
        fs::create_dir(root.join("b")).unwrap();
        fs::write(root.join("b/c.txt"), b"nested").unwrap();

        let listing = scan(&FsLister, root).unwrap();

        // Only the direct children, directory first
        assert_eq!(names(&listing), vec!["b", "a.txt"]);
        assert_eq!(listing[0].class, Classification::Directory);
        assert!(!listing[1].is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_lister_reports_executables() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("build.sh");
        fs::write(&script, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let listing = scan(&FsLister, temp_dir.path()).unwrap();
        assert_eq!(listing[0].class, Classification::Executable);
    }

    #[test]
    fn test_fs_lister_errors() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("file.txt"), b"x").unwrap();

        let err = scan(&FsLister, &root.join("missing")).unwrap_err();
        assert!(matches!(err, ScanError::NotFound { .. }));

        let err = scan(&FsLister, &root.join("file.txt")).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_lister_classifies_symlinks_by_target() {
        use std::os::unix::fs::{symlink, PermissionsExt};

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("photo.png"), b"png").unwrap();
        fs::set_permissions(root.join("photo.png"), fs::Permissions::from_mode(0o644)).unwrap();
        fs::create_dir(root.join("pictures")).unwrap();
        symlink(root.join("photo.png"), root.join("link.png")).unwrap();
        symlink(root.join("pictures"), root.join("pictures_link")).unwrap();
        symlink(root.join("missing"), root.join("dangling.md")).unwrap();

        let listing = scan(&FsLister, root).unwrap();
        let class_of = |name: &str| {
            listing
                .iter()
                .find(|l| l.name.as_os_str() == OsStr::new(name))
                .map(|l| l.class)
                .unwrap()
        };

        assert_eq!(class_of("link.png"), Classification::Media(MediaCategory::Image));
        assert_eq!(class_of("dangling.md"), Classification::Generic);
        // Not followed: a link to a directory is listed as a file
        assert_eq!(class_of("pictures_link"), Classification::Generic);
    }

    #[cfg(unix)]
    #[test]
    fn test_fs_lister_keeps_non_utf8_names() {
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let first = OsStr::from_bytes(b"d\xff");
        let second = OsStr::from_bytes(b"d\xfe");
        // Some filesystems reject names that are not UTF-8
        if fs::create_dir(root.join(first)).is_err() {
            return;
        }
        fs::create_dir(root.join(second)).unwrap();

        let listing = scan(&FsLister, root).unwrap();
        let mut names: Vec<&OsStr> = listing.iter().map(|l| l.name.as_os_str()).collect();
        names.sort();
        assert_eq!(names, vec![second, first]);
        assert_eq!(listing[0].display_name(), "d\u{FFFD}");
    }
}
