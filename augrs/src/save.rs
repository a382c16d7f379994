//! Save pass: commit changed file subtrees back to disk.
//!
//! Every file recorded under `/augeas/files` is visited, along with any
//! subtree created under `/files` at a path a transform includes.  Clean
//! subtrees are skipped.  A dirty one is serialised with its lens and written according
//! to the mode at `/augeas/save`.  A failure is recorded as
//! `/augeas/files<file>/error` and the pass continues with the next file;
//! the overall result is `false` if any file failed.

use tracing::{debug, info, warn};

use crate::config::SaveMode;
use crate::engine::{file_labels, meta_labels, Augeas};
use crate::error::Result;
use crate::lens::LensError;
use crate::tree::NodeId;

/// Suffix of the copy kept by [`SaveMode::Backup`].
pub const BACKUP_SUFFIX: &str = ".augsave";
/// Suffix of the file written by [`SaveMode::NewFile`].
pub const NEW_FILE_SUFFIX: &str = ".augnew";

/// A file known to the tree: its path on disk and the lens it was read with.
#[derive(Debug, Clone)]
struct FileRecord {
    file: String,
    lens: String,
    record: NodeId,
}

/// What happened to one file.
enum Outcome {
    Unchanged,
    Saved,
    Removed,
    Failed,
}

impl Augeas {
    /// Write every changed file.
    ///
    /// Returns `Ok(false)` when at least one file failed; the details are in
    /// the error subtree.  Calling it again without changes writes nothing
    /// for files that were saved.
    pub fn save(&mut self) -> Result<bool> {
        let mode = self.save_mode();
        let events = self.tree.ensure_path(["augeas", "events"]);
        for old in self.tree.children_labeled(events, "saved").collect::<Vec<_>>() {
            self.tree.remove(old);
        }

        self.claim_new_files();
        let mut ok = true;
        let mut saved = 0;
        for rec in self.file_records() {
            match self.save_file(&rec, mode) {
                Outcome::Unchanged => {}
                Outcome::Saved | Outcome::Removed => {
                    saved += 1;
                    let events = self.tree.ensure_path(["augeas", "events"]);
                    self.tree.append_child(events, "saved", Some(format!("/files{}", rec.file)));
                }
                Outcome::Failed => ok = false,
            }
        }
        info!(mode = %mode, saved, ok, "save complete");
        Ok(ok)
    }

    /// Every `/augeas/files` entry that has a `path` child.
    fn file_records(&self) -> Vec<FileRecord> {
        let t = &self.tree;
        let Some(meta) = self.lookup(["augeas", "files"]) else { return Vec::new() };
        let mut out = Vec::new();
        for n in t.descendants(meta) {
            let Some(path) = t.child(n, "path").and_then(|p| t.value(p)) else { continue };
            let Some(file) = path.strip_prefix("/files") else { continue };
            let lens = t.child(n, "lens").and_then(|l| t.value(l)).unwrap_or_default();
            out.push(FileRecord { file: file.to_owned(), lens: lens.to_owned(), record: n });
        }
        out
    }

    /// Record every dirty subtree under `/files` that has no file record
    /// yet but sits at a path some transform includes.  Such a subtree is a
    /// file created in the tree; the regular pass then writes it.
    fn claim_new_files(&mut self) {
        let transforms = self.transforms();
        if transforms.is_empty() {
            return;
        }
        let Some(files) = self.lookup(["files"]) else { return };
        let t = &self.tree;
        let mut stack: Vec<(NodeId, String)> =
            t.children(files).iter().map(|&c| (c, format!("/{}", t.label(c)))).collect();
        let mut claimed = Vec::new();
        while let Some((node, file)) = stack.pop() {
            if !t.is_dirty(node) || self.has_record(&file) {
                continue;
            }
            if let Some(tr) = transforms.iter().find(|tr| tr.includes(&file)) {
                claimed.push((file, tr.lens.clone()));
                continue;
            }
            stack.extend(t.children(node).iter().map(|&c| (c, format!("{file}/{}", t.label(c)))));
        }
        for (file, lens) in claimed {
            debug!(file = %file, lens = %lens, "new file");
            self.record_file(&file, &lens);
        }
    }

    fn has_record(&self, file: &str) -> bool {
        self.lookup(meta_labels(file)).is_some_and(|rec| self.tree.child(rec, "path").is_some())
    }

    fn save_file(&mut self, rec: &FileRecord, mode: SaveMode) -> Outcome {
        let file = rec.file.as_str();
        let Some(node) = self.lookup(file_labels(file)) else {
            if self.never_loaded(rec) {
                return Outcome::Unchanged;
            }
            return self.remove_file(rec, mode);
        };
        if !self.tree.is_dirty(node) {
            return Outcome::Unchanged;
        }

        let lens = match self.lens(&rec.lens) {
            Ok(l) => l,
            Err(e) => return self.fail(file, "put_failed", LensError::new(e.to_string())),
        };
        let original = self.fs.read(file).ok();
        let fragments = self.tree.to_fragments(node);
        let text = match lens.put(&fragments, original.as_deref()) {
            Ok(t) => t,
            Err(e) => return self.fail(file, "put_failed", e),
        };

        if original.as_deref() == Some(text.as_str()) {
            debug!(file, "content unchanged, not writing");
            self.commit(file, node);
            return Outcome::Unchanged;
        }

        let written = match mode {
            SaveMode::Noop => {
                debug!(file, "noop save");
                return Outcome::Saved;
            }
            SaveMode::Overwrite => self.fs.write(file, &text, None).map_err(|e| ("write_failed", e)),
            SaveMode::NewFile => {
                let target = format!("{file}{NEW_FILE_SUFFIX}");
                self.fs.write(&target, &text, Some(file)).map_err(|e| ("write_failed", e))
            }
            SaveMode::Backup => self.write_with_backup(file, &text, original.is_some()),
        };
        match written {
            Ok(()) => {
                self.commit(file, node);
                debug!(file, mode = %mode, "saved");
                Outcome::Saved
            }
            Err((kind, e)) => self.fail(file, kind, LensError::new(e.to_string())),
        }
    }

    /// Move the original aside, then write with its permissions.  Puts the
    /// original back if the write fails.
    fn write_with_backup(
        &self,
        file: &str,
        text: &str,
        exists: bool,
    ) -> std::result::Result<(), (&'static str, std::io::Error)> {
        let backup = format!("{file}{BACKUP_SUFFIX}");
        if exists {
            self.fs.rename(file, &backup).map_err(|e| ("rename_failed", e))?;
        }
        if let Err(e) = self.fs.write(file, text, exists.then_some(backup.as_str())) {
            if exists {
                if let Err(undo) = self.fs.rename(&backup, file) {
                    warn!(file, error = %undo, "could not restore original after failed write");
                }
            }
            return Err(("write_failed", e));
        }
        Ok(())
    }

    /// A file whose read or parse failed has no subtree to save or delete.
    fn never_loaded(&self, rec: &FileRecord) -> bool {
        let t = &self.tree;
        t.child(rec.record, "error")
            .and_then(|e| t.value(e))
            .is_some_and(|kind| kind == "read_failed" || kind == "parse_failed")
    }

    /// The file's subtree was removed from `/files`.
    ///
    /// Overwrite mode deletes the file and backup mode moves it to
    /// `<file>.augsave`.  Newfile and noop modes leave it in place and only
    /// report the removal.
    fn remove_file(&mut self, rec: &FileRecord, mode: SaveMode) -> Outcome {
        let file = rec.file.as_str();
        if !self.fs.exists(file) {
            self.tree.remove(rec.record);
            return Outcome::Unchanged;
        }
        let removed = match mode {
            SaveMode::Noop | SaveMode::NewFile => {
                debug!(file, mode = %mode, "removal not applied");
                return Outcome::Removed;
            }
            SaveMode::Overwrite => self.fs.remove(file).map_err(|e| ("remove_failed", e)),
            SaveMode::Backup => {
                let backup = format!("{file}{BACKUP_SUFFIX}");
                self.fs.rename(file, &backup).map_err(|e| ("rename_failed", e))
            }
        };
        match removed {
            Ok(()) => {
                debug!(file, mode = %mode, "removed");
                self.tree.remove(rec.record);
                Outcome::Removed
            }
            Err((kind, e)) => self.fail(file, kind, LensError::new(e.to_string())),
        }
    }

    fn commit(&mut self, file: &str, node: NodeId) {
        self.clear_file_error(file);
        self.tree.clear_dirty(node);
    }

    fn fail(&mut self, file: &str, kind: &str, err: LensError) -> Outcome {
        warn!(file, kind, error = %err, "save failed");
        self.set_file_error(file, kind, &err);
        Outcome::Failed
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Flags, TreeOptions};

    fn hosts_root(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/hosts"), content).unwrap();
        dir
    }

    fn open(dir: &tempfile::TempDir, flags: Flags) -> Augeas {
        let opts = TreeOptions::new()
            .root(dir.path())
            .flags(flags | Flags::NO_MODULE_AUTOLOAD)
            .lens("Hosts")
            .incl("/etc/hosts");
        Augeas::open(opts).unwrap()
    }

    fn read(dir: &tempfile::TempDir, rel: &str) -> String {
        std::fs::read_to_string(dir.path().join(rel)).unwrap()
    }

    #[test]
    fn clean_tree_writes_nothing() {
        let dir = hosts_root("127.0.0.1  localhost\n");
        let mut aug = open(&dir, Flags::NONE);
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1  localhost\n");
        assert_eq!(aug.nmatch("/augeas/events/saved").unwrap(), 0);
    }

    #[test]
    fn overwrite_then_idempotent() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::NONE);
        aug.set("/files/etc/hosts/1/ipaddr", "127.0.0.2").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.2\tlocalhost\n");
        assert_eq!(aug.get("/augeas/events/saved").unwrap().as_deref(), Some("/files/etc/hosts"));
        assert!(aug.save().unwrap());
        assert_eq!(aug.nmatch("/augeas/events/saved").unwrap(), 0);
    }

    #[test]
    fn backup_keeps_original() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::SAVE_BACKUP);
        aug.set("/files/etc/hosts/1/canonical", "home").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts.augsave"), "127.0.0.1 localhost\n");
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1\thome\n");
    }

    #[test]
    fn new_file_leaves_original() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::SAVE_NEW_FILE);
        aug.set("/files/etc/hosts/1/canonical", "home").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1 localhost\n");
        assert_eq!(read(&dir, "etc/hosts.augnew"), "127.0.0.1\thome\n");
    }

    #[test]
    fn noop_writes_nothing_but_reports() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::NONE);
        aug.set("/augeas/save", "noop").unwrap();
        aug.set("/files/etc/hosts/1/canonical", "home").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1 localhost\n");
        assert_eq!(aug.nmatch("/augeas/events/saved").unwrap(), 1);
    }

    #[test]
    fn put_failure_is_recorded_not_raised() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::NONE);
        aug.rm("/files/etc/hosts/1/canonical").unwrap();
        assert!(!aug.save().unwrap());
        assert_eq!(
            aug.get("/augeas/files/etc/hosts/error").unwrap().as_deref(),
            Some("put_failed")
        );
        assert_eq!(aug.get("/augeas/files/etc/hosts/error/line").unwrap().as_deref(), Some("1"));
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1 localhost\n");

        let before = aug.matches("/augeas/files/etc/hosts/error/*").unwrap();
        assert!(!aug.save().unwrap());
        assert_eq!(aug.matches("/augeas/files/etc/hosts/error/*").unwrap(), before);

        aug.set("/files/etc/hosts/1/canonical", "back").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(aug.nmatch("/augeas/files/etc/hosts/error").unwrap(), 0);
    }

    #[test]
    fn unparsable_file_is_left_alone() {
        let dir = hosts_root("127.0.0.1\n");
        let mut aug = open(&dir, Flags::NONE);
        assert_eq!(aug.get("/augeas/files/etc/hosts/error").unwrap().as_deref(), Some("parse_failed"));
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1\n");
    }

    #[test]
    fn removed_subtree_deletes_file() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::NONE);
        aug.rm("/files/etc/hosts").unwrap();
        assert!(aug.save().unwrap());
        assert!(!dir.path().join("etc/hosts").exists());
        assert_eq!(aug.nmatch("/augeas/files/etc/hosts").unwrap(), 0);
    }

    #[test]
    fn removed_subtree_in_backup_mode_keeps_augsave() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::SAVE_BACKUP);
        aug.rm("/files/etc/hosts").unwrap();
        assert!(aug.save().unwrap());
        assert!(!dir.path().join("etc/hosts").exists());
        assert_eq!(read(&dir, "etc/hosts.augsave"), "127.0.0.1 localhost\n");
        assert_eq!(aug.get("/augeas/events/saved").unwrap().as_deref(), Some("/files/etc/hosts"));
    }

    #[test]
    fn removed_subtree_in_new_file_mode_leaves_original() {
        let dir = hosts_root("127.0.0.1 localhost\n");
        let mut aug = open(&dir, Flags::SAVE_NEW_FILE);
        aug.rm("/files/etc/hosts").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "127.0.0.1 localhost\n");
        assert!(!dir.path().join("etc/hosts.augnew").exists());
        assert!(!dir.path().join("etc/hosts.augsave").exists());
        assert_eq!(aug.nmatch("/augeas/events/saved").unwrap(), 1);
    }

    #[test]
    fn new_file_under_incl_is_written() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        let mut aug = open(&dir, Flags::NONE);
        assert_eq!(aug.nmatch("/augeas/files/etc/hosts").unwrap(), 0);

        aug.set("/files/etc/hosts/1/ipaddr", "10.0.0.1").unwrap();
        aug.set("/files/etc/hosts/1/canonical", "gw").unwrap();
        aug.set("/files/etc/other/x", "1").unwrap();
        assert!(aug.save().unwrap());
        assert_eq!(read(&dir, "etc/hosts"), "10.0.0.1\tgw\n");
        assert!(!dir.path().join("etc/other").exists());
        assert_eq!(aug.get("/augeas/files/etc/hosts/lens").unwrap().as_deref(), Some("Hosts"));
        assert_eq!(aug.matches("/augeas/events/saved").unwrap().len(), 1);

        assert!(aug.save().unwrap());
        assert_eq!(aug.nmatch("/augeas/events/saved").unwrap(), 0);
    }

    #[test]
    fn new_file_that_cannot_be_put_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        let mut aug = open(&dir, Flags::NONE);
        aug.set("/files/etc/hosts/1/ipaddr", "10.0.0.1").unwrap();
        assert!(!aug.save().unwrap());
        assert_eq!(aug.get("/augeas/files/etc/hosts/error").unwrap().as_deref(), Some("put_failed"));
        assert!(!dir.path().join("etc/hosts").exists());
    }

    #[cfg(unix)]
    #[test]
    fn backup_and_new_file_keep_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let mode = |dir: &tempfile::TempDir, rel: &str| {
            std::fs::metadata(dir.path().join(rel)).unwrap().permissions().mode() & 0o777
        };
        for (flags, written) in [(Flags::SAVE_BACKUP, "etc/hosts"), (Flags::SAVE_NEW_FILE, "etc/hosts.augnew")] {
            let dir = hosts_root("127.0.0.1 localhost\n");
            let perms = std::fs::Permissions::from_mode(0o644);
            std::fs::set_permissions(dir.path().join("etc/hosts"), perms).unwrap();
            let mut aug = open(&dir, flags);
            aug.set("/files/etc/hosts/1/canonical", "home").unwrap();
            assert!(aug.save().unwrap());
            assert_eq!(mode(&dir, written), 0o644, "{written}");
        }
    }
}
