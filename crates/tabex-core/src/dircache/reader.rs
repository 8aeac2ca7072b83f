/// Directory listing used by the size computation.
///
/// Files and subdirectories are listed in two separate steps so that a
/// failure in one still lets the other contribute.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An immediate child directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDirectory {
    pub path: PathBuf,
    /// `true` for symbolic links, junctions, and other reparse points.
    /// Their content is never counted.
    pub is_link: bool,
}

pub trait DirectoryReader: Send + Sync {
    /// Sizes in bytes of the regular files directly inside `dir`.
    fn list_file_sizes(&self, dir: &Path) -> io::Result<Vec<u64>>;

    /// Directories directly inside `dir`, including links to directories.
    fn list_subdirectories(&self, dir: &Path) -> io::Result<Vec<ChildDirectory>>;
}

/// [`DirectoryReader`] over `std::fs`.
///
/// Entries that vanish or cannot be stat'ed between listing and inspection
/// are skipped. Links to files are not counted.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDirectoryReader;

impl DirectoryReader for FsDirectoryReader {
    fn list_file_sizes(&self, dir: &Path) -> io::Result<Vec<u64>> {
        let mut sizes = Vec::new();
        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() || is_reparse_point(&entry) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                sizes.push(meta.len());
            }
        }
        Ok(sizes)
    }

    fn list_subdirectories(&self, dir: &Path) -> io::Result<Vec<ChildDirectory>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let Ok(entry) = entry else { continue };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();

            if file_type.is_dir() {
                let is_link = is_reparse_point(&entry);
                dirs.push(ChildDirectory { path, is_link });
            } else if file_type.is_symlink() {
                // Only links that resolve to a directory are listed.
                if fs::metadata(&path).map(|m| m.is_dir()).unwrap_or(false) {
                    dirs.push(ChildDirectory {
                        path,
                        is_link: true,
                    });
                }
            }
        }
        Ok(dirs)
    }
}

#[cfg(windows)]
fn is_reparse_point(entry: &fs::DirEntry) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_REPARSE_POINT;

    entry
        .metadata()
        .map(|meta| meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT.0 != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn is_reparse_point(_entry: &fs::DirEntry) -> bool {
    false
}
