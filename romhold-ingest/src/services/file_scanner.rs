//! Input path expansion
//!
//! Turns the paths a user named on the command line into a flat, sorted
//! list of files. Files named directly are always kept; directories are
//! walked (one level, or fully with `recursive`) skipping hidden entries and
//! common system clutter. Symlinks to files are kept; symlinked
//! directories are not entered.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Path expansion errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Cannot access file metadata
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Expanded inputs with the problems met on the way
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Files in path order, de-duplicated
    pub files: Vec<PathBuf>,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Entries that could not be read during traversal
    pub errors: Vec<String>,
}

/// Expands input paths into ROM file candidates
pub struct FileScanner {
    ignore_names: Vec<String>,
    recursive: bool,
}

impl FileScanner {
    /// Create a scanner with default ignore names
    ///
    /// Ignores system files like .DS_Store, Thumbs.db, desktop.ini.
    pub fn new(recursive: bool) -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "desktop.ini".to_string(),
            ],
            recursive,
        }
    }

    /// Expand every input path
    ///
    /// A missing input path fails the whole scan; unreadable entries below a
    /// directory are collected in `errors` and skipped.
    pub fn scan(&self, inputs: &[PathBuf]) -> Result<ScanResult, ScanError> {
        let mut result = ScanResult::default();
        let mut seen = HashSet::new();

        for input in inputs {
            if !input.exists() {
                return Err(ScanError::PathNotFound(input.clone()));
            }

            if input.is_dir() {
                self.walk(input, &mut result, &mut seen);
            } else {
                let size = file_size(input)?;
                if seen.insert(input.clone()) {
                    result.total_size += size;
                    result.files.push(input.clone());
                }
            }
        }

        tracing::debug!(
            inputs = inputs.len(),
            files = result.files.len(),
            total_size = result.total_size,
            errors = result.errors.len(),
            "Expanded input paths"
        );

        Ok(result)
    }

    fn walk(&self, root: &Path, result: &mut ScanResult, seen: &mut HashSet<PathBuf>) {
        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut dir_files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_process_entry(e));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => match entry.metadata() {
                    Ok(metadata) => dir_files.push((entry.into_path(), metadata.len())),
                    Err(e) => result.errors.push(e.to_string()),
                },
                Ok(entry) if entry.path_is_symlink() => {
                    // Links to files are taken; linked directories are never descended
                    let target = std::fs::metadata(entry.path());
                    match target {
                        Ok(target) if target.is_file() => dir_files.push((entry.into_path(), target.len())),
                        Ok(_) => {
                            tracing::debug!(path = %entry.path().display(), "Skipping directory symlink");
                        }
                        Err(e) => {
                            tracing::warn!(path = %entry.path().display(), error = %e, "Broken symlink");
                            result.errors.push(format!("{}: {}", entry.path().display(), e));
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Error accessing entry");
                    result.errors.push(e.to_string());
                }
            }
        }

        dir_files.sort();
        for (path, size) in dir_files {
            if seen.insert(path.clone()) {
                result.total_size += size;
                result.files.push(path);
            }
        }
    }

    fn should_process_entry(&self, entry: &DirEntry) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        if file_name.starts_with('.') {
            return false;
        }
        !self.ignore_names.iter().any(|name| file_name == name.as_str())
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(false)
    }
}

fn file_size(path: &Path) -> Result<u64, ScanError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| ScanError::FileAccessError(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.nes"), vec![0u8; 16]).unwrap();
        fs::write(dir.path().join("a.sfc"), vec![0u8; 32]).unwrap();
        fs::write(dir.path().join(".hidden.gb"), b"x").unwrap();
        fs::write(dir.path().join("Thumbs.db"), b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("c.z64"), vec![0u8; 8]).unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("d.nes"), b"x").unwrap();
        dir
    }

    #[test]
    fn test_scan_nonexistent_path() {
        let scanner = FileScanner::default();
        let result = scanner.scan(&[PathBuf::from("/nonexistent/path")]);
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_flat_scan_skips_hidden_and_subdirs() {
        let dir = fixture();
        let result = FileScanner::new(false).scan(&[dir.path().to_path_buf()]).unwrap();

        let names: Vec<String> = result
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.sfc", "b.nes"]);
        assert_eq!(result.total_size, 48);
    }

    #[test]
    fn test_recursive_scan() {
        let dir = fixture();
        let result = FileScanner::new(true).scan(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(result.files.len(), 3);
        assert!(result.files.iter().any(|p| p.ends_with("sub/c.z64")));
        assert!(!result.files.iter().any(|p| p.to_string_lossy().contains(".git")));
    }

    #[test]
    fn test_named_files_kept_and_deduplicated() {
        let dir = fixture();
        let hidden = dir.path().join(".hidden.gb");
        let result = FileScanner::default()
            .scan(&[hidden.clone(), dir.path().to_path_buf(), hidden.clone()])
            .unwrap();
        assert_eq!(result.files[0], hidden);
        assert_eq!(result.files.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_scanned() {
        use std::os::unix::fs::symlink;

        let library = TempDir::new().unwrap();
        fs::write(library.path().join("zelda.nes"), vec![0u8; 24]).unwrap();
        fs::create_dir(library.path().join("more")).unwrap();
        fs::write(library.path().join("more").join("hidden-away.gb"), vec![0u8; 4]).unwrap();

        let dir = TempDir::new().unwrap();
        symlink(library.path().join("zelda.nes"), dir.path().join("zelda.nes")).unwrap();
        symlink(library.path().join("more"), dir.path().join("more")).unwrap();
        symlink(library.path().join("gone.nes"), dir.path().join("gone.nes")).unwrap();

        let result = FileScanner::new(true).scan(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(result.files, vec![dir.path().join("zelda.nes")]);
        assert_eq!(result.total_size, 24);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("gone.nes"));
    }
}
