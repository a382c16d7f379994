//! File-system collaborator.
//!
//! The engine addresses files by their absolute path as seen in the tree
//! (`/etc/hosts`).  A [`FileSystem`] maps those paths onto real storage;
//! [`LocalFs`] prefixes them with a root directory so tests and the CLI can
//! operate on a scratch copy of `/etc`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::glob::{glob_match, has_wildcard};

/// Byte-level file access used by load and save.
pub trait FileSystem: Send {
    fn read(&self, path: &str) -> io::Result<String>;

    /// Replace the content of `path` atomically.
    ///
    /// The new file takes the permissions of `like` when that file exists,
    /// otherwise those of the file it replaces.
    fn write(&self, path: &str, contents: &str, like: Option<&str>) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    fn remove(&self, path: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;

    /// Every existing file matching `pattern`, sorted.
    fn glob(&self, pattern: &str) -> io::Result<Vec<String>>;
}

/// Local disk, rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a tree-visible absolute path onto the real file system.
    pub fn real_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &str) -> io::Result<String> {
        std::fs::read_to_string(self.real_path(path))
    }

    fn write(&self, path: &str, contents: &str, like: Option<&str>) -> io::Result<()> {
        let real = self.real_path(path);
        let dir = real.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.as_file().sync_all()?;
        let meta = like
            .and_then(|l| std::fs::metadata(self.real_path(l)).ok())
            .or_else(|| std::fs::metadata(&real).ok());
        if let Some(meta) = meta {
            std::fs::set_permissions(tmp.path(), meta.permissions())?;
        }
        tmp.persist(&real).map_err(|e| e.error)?;
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        std::fs::rename(self.real_path(from), self.real_path(to))
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.real_path(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.real_path(path).is_file()
    }

    fn glob(&self, pattern: &str) -> io::Result<Vec<String>> {
        if !has_wildcard(pattern) {
            return Ok(if self.exists(pattern) { vec![pattern.to_owned()] } else { Vec::new() });
        }
        // walk one component at a time, expanding wildcards with read_dir
        let mut found = vec![String::new()];
        for comp in pattern.trim_start_matches('/').split('/') {
            let mut next = Vec::new();
            for prefix in &found {
                if !has_wildcard(comp) {
                    next.push(format!("{prefix}/{comp}"));
                    continue;
                }
                let dir = self.real_path(prefix);
                let Ok(entries) = std::fs::read_dir(&dir) else { continue };
                for entry in entries {
                    let entry = entry?;
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if glob_match(comp, name) {
                        next.push(format!("{prefix}/{name}"));
                    }
                }
            }
            found = next;
        }
        found.retain(|p| self.exists(p));
        found.sort();
        Ok(found)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, LocalFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        std::fs::create_dir_all(dir.path().join("etc/default/sub")).unwrap();
        std::fs::write(dir.path().join("etc/hosts"), "127.0.0.1 localhost\n").unwrap();
        std::fs::write(dir.path().join("etc/default/grub"), "A=1\n").unwrap();
        std::fs::write(dir.path().join("etc/default/locale"), "LANG=C\n").unwrap();
        (dir, fs)
    }

    #[test]
    fn read_is_rooted() {
        let (_dir, fs) = scratch();
        assert_eq!(fs.read("/etc/hosts").unwrap(), "127.0.0.1 localhost\n");
        assert!(fs.exists("/etc/hosts"));
        assert!(!fs.exists("/etc/default"));
    }

    #[test]
    fn glob_expands_one_level() {
        let (_dir, fs) = scratch();
        assert_eq!(fs.glob("/etc/default/*").unwrap(), ["/etc/default/grub", "/etc/default/locale"]);
        assert_eq!(fs.glob("/etc/hosts").unwrap(), ["/etc/hosts"]);
        assert!(fs.glob("/etc/missing").unwrap().is_empty());
        assert!(fs.glob("/nope/*").unwrap().is_empty());
    }

    #[test]
    fn write_replaces_content() {
        let (dir, fs) = scratch();
        fs.write("/etc/hosts", "10.0.0.1 gw\n", None).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("etc/hosts")).unwrap(), "10.0.0.1 gw\n");
        fs.rename("/etc/hosts", "/etc/hosts.old").unwrap();
        assert!(fs.exists("/etc/hosts.old"));
        fs.remove("/etc/hosts.old").unwrap();
        assert!(!fs.exists("/etc/hosts.old"));
    }

    #[cfg(unix)]
    #[test]
    fn write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (dir, fs) = scratch();
        let hosts = dir.path().join("etc/hosts");
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        std::fs::set_permissions(&hosts, std::fs::Permissions::from_mode(0o644)).unwrap();

        fs.write("/etc/hosts", "10.0.0.1 gw\n", None).unwrap();
        assert_eq!(mode(&hosts), 0o644);

        fs.write("/etc/hosts.new", "10.0.0.2 gw\n", Some("/etc/hosts")).unwrap();
        assert_eq!(mode(&dir.path().join("etc/hosts.new")), 0o644);
    }
}
