//! Directory walker built on jwalk.
//!
//! # Overview
//!
//! [`Walker`] enumerates every regular file under a root exactly once, in a
//! single traversal. Directory reads are parallelized by jwalk; children are
//! sorted per directory so the order is stable between runs.
//!
//! Nothing here decides whether a file is an image. Empty files, text files
//! and anything else are yielded and left to the identity extractor.
//!
//! # Example
//!
//! ```no_run
//! use imgdupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let config = WalkerConfig {
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let walker = Walker::new(Path::new("/home/user/Pictures"), config);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for file discovery.
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag; iteration stops once it reads `true`.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// The root being walked.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Verify that the root exists and is a directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::NotFound`] or [`ScanError::NotADirectory`].
    pub fn check_root(&self) -> Result<(), ScanError> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ScanError::NotADirectory(self.root.clone())),
            Err(e) => Err(io_error(&self.root, e)),
        }
    }

    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: Option<&Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };

        // Matching works on root-relative, forward-slash paths
        let relative_path = path.strip_prefix(&self.root).unwrap_or(path);
        let path_str = relative_path.to_string_lossy();
        let normalized_path = if cfg!(windows) {
            path_str.replace('\\', "/")
        } else {
            path_str.into_owned()
        };

        gi.matched_path_or_any_parents(normalized_path, is_dir)
            .is_ignore()
    }

    /// Walk the directory tree, yielding every regular file once.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _read_dir_state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    if path == self.root || entry.file_type().is_dir() {
                        return None;
                    }

                    if self.should_ignore(&path, false, gitignore.as_ref()) {
                        log::trace!("Ignoring file: {}", path.display());
                        return None;
                    }

                    let is_symlink = entry.path_is_symlink();
                    if is_symlink && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = match std::fs::metadata(&path) {
                        Ok(m) => m,
                        Err(e) => return Some(Err(io_error(&path, e))),
                    };

                    // Sockets, fifos, devices
                    if !metadata.is_file() {
                        return None;
                    }

                    Some(Ok(FileEntry {
                        path,
                        size: metadata.len(),
                        is_symlink,
                    }))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Cannot read {}: {}", path.display(), e);
                    Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }))
                }
            }
        })
    }
}

/// Map a metadata failure onto [`ScanError`], logging it.
fn io_error(path: &Path, error: std::io::Error) -> ScanError {
    let path = path.to_path_buf();
    match error.kind() {
        std::io::ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path)
        }
        std::io::ErrorKind::NotFound => {
            // Removed between listing and stat
            log::debug!("Vanished during walk: {}", path.display());
            ScanError::NotFound(path)
        }
        _ => {
            log::warn!("Cannot stat {}: {}", path.display(), error);
            ScanError::Io {
                path,
                source: error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.png"), b"not really a png").unwrap();
        fs::write(dir.path().join("b.jpg"), b"not really a jpeg").unwrap();
        fs::create_dir(dir.path().join("album")).unwrap();
        fs::write(dir.path().join("album").join("c.bmp"), b"BM....").unwrap();
        dir
    }

    fn names(walker: &Walker) -> Vec<String> {
        let mut names: Vec<String> = walker
            .walk()
            .filter_map(Result::ok)
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walker_finds_all_files_once() {
        let dir = create_test_dir();
        let walker = Walker::new(dir.path(), WalkerConfig::default());
        assert_eq!(names(&walker), vec!["a.png", "b.jpg", "c.bmp"]);
    }

    #[test]
    fn test_walker_yields_empty_files() {
        let dir = create_test_dir();
        fs::write(dir.path().join("empty.png"), b"").unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        let empty: Vec<_> = walker
            .walk()
            .filter_map(Result::ok)
            .filter(|f| f.size == 0)
            .collect();
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_walker_skip_hidden_files() {
        let dir = create_test_dir();
        fs::write(dir.path().join(".hidden.png"), b"hidden").unwrap();

        let config = WalkerConfig {
            skip_hidden: true,
            ..Default::default()
        };
        let walker = Walker::new(dir.path(), config);
        assert!(!names(&walker).iter().any(|n| n.starts_with('.')));
    }

    #[test]
    fn test_walker_ignore_patterns() {
        let dir = create_test_dir();
        fs::write(dir.path().join("scratch.tmp"), b"tmp").unwrap();

        let config = WalkerConfig::new(false, false, vec!["*.tmp".to_string(), "album/".to_string()]);
        let walker = Walker::new(dir.path(), config);
        assert_eq!(names(&walker), vec!["a.png", "b.jpg"]);
    }

    #[test]
    #[cfg(unix)]
    fn test_walker_symlinks_skipped_by_default() {
        let dir = create_test_dir();
        std::os::unix::fs::symlink(dir.path().join("a.png"), dir.path().join("link.png")).unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        assert!(!names(&walker).contains(&"link.png".to_string()));

        let config = WalkerConfig::new(true, false, Vec::new());
        let walker = Walker::new(dir.path(), config);
        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
        let link = files
            .iter()
            .find(|f| f.path.file_name().unwrap() == "link.png")
            .unwrap();
        assert!(link.is_symlink);
    }

    #[test]
    fn test_walker_shutdown_flag() {
        let dir = create_test_dir();
        for i in 0..10 {
            fs::write(dir.path().join(format!("file{i}.png")), b"x").unwrap();
        }

        let shutdown = Arc::new(AtomicBool::new(true));
        let walker =
            Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(shutdown);
        assert_eq!(walker.walk().count(), 0);
    }

    #[test]
    fn test_check_root() {
        let dir = create_test_dir();
        assert!(Walker::new(dir.path(), WalkerConfig::default())
            .check_root()
            .is_ok());

        let missing = Walker::new(Path::new("/nonexistent/path/12345"), WalkerConfig::default());
        assert!(matches!(missing.check_root(), Err(ScanError::NotFound(_))));

        let file = Walker::new(&dir.path().join("a.png"), WalkerConfig::default());
        assert!(matches!(file.check_root(), Err(ScanError::NotADirectory(_))));
    }

    #[test]
    fn test_walker_handles_nonexistent_path() {
        let walker = Walker::new(
            Path::new("/nonexistent/path/12345"),
            WalkerConfig::default(),
        );
        let results: Vec<_> = walker.walk().collect();
        assert!(results.iter().all(Result::is_err));
    }
}
