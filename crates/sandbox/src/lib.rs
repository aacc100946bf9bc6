//! Filesystem sandbox — path validation for every file-touching tool.
//!
//! Ensures tools only access paths inside the workspace root, blocks paths
//! matching forbidden glob patterns (credentials, keys, dotenv files), and
//! caps the size of files handed to the model.
//!
//! The sandbox is pure and threadsafe after construction; it performs no
//! I/O beyond canonicalization and stat.

use glob::Pattern;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use agentichat_core::{Error, ErrorKind, Result};

/// Patterns blocked when the configuration does not provide its own list.
pub const DEFAULT_BLOCKED_PATTERNS: &[&str] = &[
    "**/.env",
    "**/*.key",
    "**/*.pem",
    "**/id_rsa",
    "**/credentials.json",
    "**/.ssh/*",
];

/// Default per-file byte cap.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_000_000;

/// Directory names skipped by default when listing or globbing: vendored
/// dependencies, VCS internals, caches. Tools expose `include_ignored` to
/// bypass this.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    "target",
];

/// Validates and resolves filesystem paths against a workspace root.
#[derive(Debug)]
pub struct Sandbox {
    root: PathBuf,
    blocked: Vec<Pattern>,
    max_file_size: u64,
}

impl Sandbox {
    /// Build a sandbox over `root`. The root must exist; it is canonicalized
    /// once so every later containment check compares canonical forms.
    /// Invalid glob patterns are skipped with a warning rather than taking
    /// the whole configuration down.
    pub fn new(
        root: impl AsRef<Path>,
        blocked_patterns: &[String],
        max_file_size: u64,
    ) -> Result<Self> {
        let root = root.as_ref().canonicalize().map_err(|e| {
            Error::new(
                ErrorKind::FileNotFound,
                format!("workspace root '{}': {e}", root.as_ref().display()),
            )
        })?;

        let blocked = blocked_patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "Skipping invalid blocked-path pattern");
                    None
                }
            })
            .collect();

        Ok(Self {
            root,
            blocked,
            max_file_size,
        })
    }

    /// Build a sandbox with the default blocked patterns and size cap.
    pub fn with_defaults(root: impl AsRef<Path>) -> Result<Self> {
        let patterns: Vec<String> = DEFAULT_BLOCKED_PATTERNS
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self::new(root, &patterns, DEFAULT_MAX_FILE_SIZE)
    }

    /// The canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configured per-file byte cap.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Resolve `path` to a canonical absolute path inside the workspace.
    ///
    /// Relative inputs are joined to the root. Symlinks are dereferenced
    /// before the containment check: the target is canonicalized (for paths
    /// that do not exist yet, the nearest existing ancestor is canonicalized
    /// and the remaining components re-appended after lexical `..`
    /// normalization). Containment compares canonical paths byte-for-byte;
    /// on case-insensitive filesystems `canonicalize` already returns the
    /// volume's canonical casing for existing components, so no additional
    /// case folding is applied.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let joined = {
            let p = Path::new(path);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        };

        let resolved = canonicalize_lenient(&joined)?;

        if !resolved.starts_with(&self.root) {
            return Err(Error::new(
                ErrorKind::PathOutsideSandbox,
                format!(
                    "'{path}' resolves outside the workspace ({})",
                    self.root.display()
                ),
            ));
        }

        let relative = resolved.strip_prefix(&self.root).unwrap_or(&resolved);
        for pattern in &self.blocked {
            if pattern.matches_path(relative) || pattern.matches_path(&resolved) {
                return Err(Error::new(
                    ErrorKind::PathBlocked,
                    format!("'{path}' matches blocked pattern '{}'", pattern.as_str()),
                ));
            }
        }

        Ok(resolved)
    }

    /// Fail with `FILE_TOO_LARGE` when an existing file exceeds the cap.
    /// Missing files pass (the check guards reads and appends, not creates).
    pub fn check_size(&self, path: &Path) -> Result<()> {
        let Ok(meta) = std::fs::metadata(path) else {
            return Ok(());
        };
        if meta.is_file() && meta.len() > self.max_file_size {
            return Err(Error::new(
                ErrorKind::FileTooLarge,
                format!(
                    "'{}' is {} bytes (limit {})",
                    path.display(),
                    meta.len(),
                    self.max_file_size
                ),
            ));
        }
        Ok(())
    }

    /// Whether `path` sits under a noise directory (`.venv`,
    /// `node_modules`, `.git`, ...) that listings and glob searches skip
    /// unless asked to include it.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .map(|name| DEFAULT_IGNORED_DIRS.contains(&name))
                .unwrap_or(false),
            _ => false,
        })
    }

    /// Whether `path` resolves to a readable in-sandbox file.
    pub fn is_readable(&self, path: &str) -> bool {
        self.resolve(path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Whether `path` resolves inside the sandbox and could be written
    /// (existing file, or a missing file whose parent directory exists).
    pub fn is_writable(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(p) if p.exists() => p.is_file(),
            Ok(p) => p.parent().map(|d| d.is_dir()).unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Canonicalize a path that may not exist yet: canonicalize the deepest
/// existing ancestor, then re-append the remaining components after lexical
/// normalization (so `missing/../x` cannot sneak past the ancestor).
fn canonicalize_lenient(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => {
                return Err(Error::new(
                    ErrorKind::PathOutsideSandbox,
                    format!("cannot resolve '{}'", path.display()),
                ));
            }
        }
    }

    let mut canonical = existing.canonicalize().map_err(|e| {
        Error::new(
            ErrorKind::PathOutsideSandbox,
            format!("cannot canonicalize '{}': {e}", existing.display()),
        )
    })?;

    for name in remainder.iter().rev() {
        match Path::new(name).components().next() {
            Some(Component::ParentDir) => {
                if !canonical.pop() {
                    return Err(Error::new(
                        ErrorKind::PathOutsideSandbox,
                        format!("'{}' escapes the filesystem root", path.display()),
                    ));
                }
            }
            Some(Component::CurDir) | None => {}
            _ => canonical.push(name),
        }
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sandbox(dir: &Path) -> Sandbox {
        Sandbox::with_defaults(dir).unwrap()
    }

    #[test]
    fn relative_path_joins_to_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "hi").unwrap();

        let sb = sandbox(dir.path());
        let resolved = sb.resolve("hello.txt").unwrap();
        assert!(resolved.ends_with("hello.txt"));
        assert!(resolved.starts_with(sb.root()));
    }

    #[test]
    fn traversal_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());

        let err = sb.resolve("../../../etc/passwd").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideSandbox);
    }

    #[test]
    fn absolute_path_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());

        let err = sb.resolve("/etc/passwd").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideSandbox);
    }

    #[test]
    fn nonexistent_file_in_root_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());

        let resolved = sb.resolve("new/nested/file.txt").unwrap();
        assert!(resolved.starts_with(sb.root()));
    }

    #[test]
    fn traversal_through_missing_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());

        let err = sb.resolve("missing/../../outside.txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideSandbox);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_rejected() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "s").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();

        let sb = sandbox(dir.path());
        let err = sb.resolve("link.txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathOutsideSandbox);
    }

    #[test]
    fn blocked_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "SECRET=1").unwrap();

        let sb = sandbox(dir.path());
        let err = sb.resolve(".env").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathBlocked);
    }

    #[test]
    fn blocked_pattern_in_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join("config/server.key"), "k").unwrap();

        let sb = sandbox(dir.path());
        let err = sb.resolve("config/server.key").unwrap_err();
        assert_eq!(err.kind, ErrorKind::PathBlocked);
    }

    #[test]
    fn custom_patterns_replace_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "x").unwrap();
        fs::write(dir.path().join("note.md"), "x").unwrap();

        let sb = Sandbox::new(dir.path(), &["**/*.md".to_string()], 1024).unwrap();
        assert!(sb.resolve(".env").is_ok());
        assert_eq!(sb.resolve("note.md").unwrap_err().kind, ErrorKind::PathBlocked);
    }

    #[test]
    fn invalid_pattern_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let sb = Sandbox::new(dir.path(), &["[".to_string()], 1024).unwrap();
        assert!(sb.resolve("anything.txt").is_ok());
    }

    #[test]
    fn size_check_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.bin");
        fs::write(&big, vec![0u8; 512]).unwrap();

        let sb = Sandbox::new(dir.path(), &[], 256).unwrap();
        let err = sb.check_size(&big).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileTooLarge);

        let small = dir.path().join("small.bin");
        fs::write(&small, vec![0u8; 16]).unwrap();
        assert!(sb.check_size(&small).is_ok());
    }

    #[test]
    fn size_check_passes_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());
        assert!(sb.check_size(&dir.path().join("nope.txt")).is_ok());
    }

    #[test]
    fn readable_and_writable_probes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();

        let sb = sandbox(dir.path());
        assert!(sb.is_readable("file.txt"));
        assert!(!sb.is_readable("missing.txt"));
        assert!(sb.is_writable("file.txt"));
        assert!(sb.is_writable("missing.txt"));
        assert!(!sb.is_writable("missing-dir/missing.txt"));
        assert!(!sb.is_writable("../outside.txt"));
    }

    #[test]
    fn noise_directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let sb = sandbox(dir.path());

        assert!(sb.should_ignore(&dir.path().join("node_modules/left-pad/index.js")));
        assert!(sb.should_ignore(&dir.path().join(".venv/lib/python3.12/site.py")));
        assert!(sb.should_ignore(&dir.path().join("sub/.git/HEAD")));
        assert!(!sb.should_ignore(&dir.path().join("src/main.rs")));
        assert!(!sb.should_ignore(&dir.path().join("targeted/file.txt")));
    }

    #[test]
    fn containment_compares_canonical_forms() {
        // Canonicalization settles casing and symlinks before the prefix
        // check; a path spelled through the root itself stays inside.
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/f.txt"), "x").unwrap();

        let sb = sandbox(dir.path());
        let via_dot = sb.resolve("./sub/./f.txt").unwrap();
        let direct = sb.resolve("sub/f.txt").unwrap();
        assert_eq!(via_dot, direct);
    }
}
