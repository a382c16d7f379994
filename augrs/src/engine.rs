//! The synchronous tree engine.
//!
//! [`Augeas`] owns one [`Tree`], its [`VarTable`], a [`LensLoader`] and a
//! [`FileSystem`], and implements every tree operation.  It is not
//! thread-aware; [`crate::executor::Handle`] serialises access to it from
//! any number of callers.
//!
//! Layout of the tree:
//!
//! ```text
//! /augeas/root               file-system root
//! /augeas/context            base for relative paths (default /files)
//! /augeas/save               overwrite | backup | newfile | noop
//! /augeas/version
//! /augeas/loadpath/path      lens search directories
//! /augeas/load/<Module>/     lens, incl*, excl*
//! /augeas/files<file>/       path, lens, error
//! /augeas/events/saved*      files written by the last save
//! /files<file>/...           parsed file content
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Flags, SaveMode, TreeOptions};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, LocalFs};
use crate::glob::glob_match;
use crate::lens::{module_name, BuiltinLenses, Lens, LensError, LensLoader, Transform};
use crate::path::{self, parse::Step, Scope};
use crate::script::{self, ScriptOutcome};
use crate::tree::{NodeId, Tree};
use crate::var::VarTable;

/// Default value of `/augeas/context`.
pub const DEFAULT_CONTEXT: &str = "/files";

/// Prefix under which per-file metadata lives.
pub const FILES_META: &str = "/augeas/files";

/// One tree plus its collaborators.
pub struct Augeas {
    pub(crate) tree: Tree,
    pub(crate) vars: VarTable,
    pub(crate) loader: Box<dyn LensLoader>,
    pub(crate) fs: Box<dyn FileSystem>,
    search_path: Vec<PathBuf>,
    lenses: HashMap<String, Arc<dyn Lens>>,
}

impl std::fmt::Debug for Augeas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Augeas")
            .field("nodes", &self.tree.len())
            .field("vars", &self.vars.len())
            .field("search_path", &self.search_path)
            .finish_non_exhaustive()
    }
}

impl Augeas {
    /// Create a tree over the local file system with the built-in lenses.
    pub fn open(options: TreeOptions) -> Result<Self> {
        let fs = LocalFs::new(options.root.clone());
        Self::with_collaborators(options, Box::new(BuiltinLenses), Box::new(fs))
    }

    /// Create a tree with caller-supplied collaborators.
    ///
    /// Builds the `/augeas` tree, registers transforms, runs the initial load
    /// (unless [`Flags::NO_LOAD`]) and then `options.script`.
    pub fn with_collaborators(
        options: TreeOptions,
        loader: Box<dyn LensLoader>,
        fs: Box<dyn FileSystem>,
    ) -> Result<Self> {
        let mut aug = Augeas {
            tree: Tree::new(),
            vars: VarTable::new(),
            loader,
            fs,
            search_path: options.search_path(),
            lenses: HashMap::new(),
        };
        aug.init_admin(&options);
        if !options.flags.contains(Flags::NO_LOAD) {
            aug.load()?;
        }
        if !options.script.is_empty() {
            aug.srun(&options.script).into_result()?;
        }
        info!(root = %options.root.display(), flags = options.flags.bits(), "tree created");
        Ok(aug)
    }

    fn init_admin(&mut self, options: &TreeOptions) {
        let root = self.tree.ensure_path(["augeas", "root"]);
        let mut root_str = options.root.display().to_string();
        if !root_str.ends_with('/') {
            root_str.push('/');
        }
        self.tree.set_value(root, Some(root_str));
        let ctx = self.tree.ensure_path(["augeas", "context"]);
        self.tree.set_value(ctx, Some(DEFAULT_CONTEXT.to_owned()));
        let save = self.tree.ensure_path(["augeas", "save"]);
        self.tree.set_value(save, Some(options.save_mode().to_string()));
        let version = self.tree.ensure_path(["augeas", "version"]);
        self.tree.set_value(version, Some(env!("CARGO_PKG_VERSION").to_owned()));
        let lp = self.tree.ensure_path(["augeas", "loadpath"]);
        for dir in &self.search_path {
            self.tree.append_child(lp, "path", Some(dir.display().to_string()));
        }
        self.tree.ensure_path(["augeas", "load"]);
        self.tree.ensure_path(["augeas", "files"]);
        self.tree.ensure_path(["files"]);

        if !options.flags.contains(Flags::NO_MODULE_AUTOLOAD) {
            for t in self.loader.autoload() {
                self.register_transform(&t);
            }
        }
        if let Some(lens) = &options.lens {
            let t = Transform {
                module: module_name(lens).to_owned(),
                lens: lens.clone(),
                incl: options.incl.clone(),
                excl: Vec::new(),
            };
            self.register_transform(&t);
        }
        self.tree.clear_dirty(self.tree.root());
    }

    /// Write `t` to `/augeas/load/<module>`, replacing anything there.
    fn register_transform(&mut self, t: &Transform) {
        let node = self.tree.ensure_path(["augeas", "load", t.module.as_str()]);
        self.tree.clear_children(node);
        self.tree.append_child(node, "lens", Some(t.lens.clone()));
        for i in &t.incl {
            self.tree.append_child(node, "incl", Some(i.clone()));
        }
        for e in &t.excl {
            self.tree.append_child(node, "excl", Some(e.clone()));
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn vars(&self) -> &VarTable {
        &self.vars
    }

    /// Current value of `/augeas/context`.
    pub(crate) fn context(&self) -> String {
        let t = &self.tree;
        t.child(t.root(), "augeas")
            .and_then(|a| t.child(a, "context"))
            .and_then(|c| t.value(c))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_CONTEXT)
            .to_owned()
    }

    /// Mode recorded at `/augeas/save`.  An unreadable value falls back to
    /// overwriting.
    pub(crate) fn save_mode(&self) -> SaveMode {
        let t = &self.tree;
        let word = t
            .child(t.root(), "augeas")
            .and_then(|a| t.child(a, "save"))
            .and_then(|s| t.value(s));
        match word.map(str::parse::<SaveMode>) {
            Some(Ok(mode)) => mode,
            Some(Err(e)) => {
                warn!(error = %e, "ignoring /augeas/save");
                SaveMode::Overwrite
            }
            None => SaveMode::Overwrite,
        }
    }

    /// Walk labels from the root without creating anything.
    pub(crate) fn lookup<'s>(&self, labels: impl IntoIterator<Item = &'s str>) -> Option<NodeId> {
        let mut cur = self.tree.root();
        for l in labels {
            cur = self.tree.child(cur, l)?;
        }
        Some(cur)
    }

    // ── Read operations ───────────────────────────────────────────────────────

    /// Value of the single node matching `path`.
    ///
    /// Fails with [`Error::AmbiguousMatch`] unless exactly one node matches;
    /// use [`Error::is_no_match`] to tell "nothing" from "too many".
    pub fn get(&self, path: &str) -> Result<Option<String>> {
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        let node = path::select_one(&self.tree, scope, path)?;
        Ok(self.tree.value(node).map(str::to_owned))
    }

    /// Canonical paths of every node matching `path`, in document order.
    pub fn matches(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.select(path)?.into_iter().map(|n| self.tree.path_of(n)).collect())
    }

    pub fn nmatch(&self, path: &str) -> Result<usize> {
        Ok(self.select(path)?.len())
    }

    pub(crate) fn select(&self, path: &str) -> Result<Vec<NodeId>> {
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        path::select(&self.tree, scope, path)
    }

    /// Every node at and below the matches of `path`, depth first.
    pub fn print(&self, path: &str) -> Result<Vec<(String, Option<String>)>> {
        let mut out = Vec::new();
        for top in self.select(path)? {
            for n in self.tree.descendants(top) {
                out.push((self.tree.path_of(n), self.tree.value(n).map(str::to_owned)));
            }
        }
        Ok(out)
    }

    // ── Mutations ─────────────────────────────────────────────────────────────

    fn resolve_for_write(&mut self, path: &str) -> Result<path::Resolved> {
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        path::select_for_write(&mut self.tree, scope, path)
    }

    /// Set the value of the node `path` resolves to, creating it if absent.
    pub fn set(&mut self, path: &str, value: &str) -> Result<()> {
        let r = self.resolve_for_write(path)?;
        debug!(path, created = r.created, "set");
        self.tree.set_value(r.node, Some(value.to_owned()));
        Ok(())
    }

    /// Make the value of `path` absent, creating the node if needed.
    pub fn clear(&mut self, path: &str) -> Result<()> {
        let r = self.resolve_for_write(path)?;
        self.tree.set_value(r.node, None);
        Ok(())
    }

    /// Create `path` if it matches nothing.  Never changes a value.
    pub fn touch(&mut self, path: &str) -> Result<()> {
        if self.select(path)?.is_empty() {
            self.resolve_for_write(path)?;
        }
        Ok(())
    }

    /// Set `sub` (or the node itself when `sub` is `None`) beneath every
    /// node matching `base`.  Returns the number of base nodes touched.
    pub fn setm(&mut self, base: &str, sub: Option<&str>, value: Option<&str>) -> Result<usize> {
        let bases = self.select(base)?;
        for &b in &bases {
            let target = match sub {
                None => b,
                Some(sub) => {
                    // relative `sub` is resolved against this base node
                    let ctx = self.tree.path_of(b);
                    let scope = Scope { vars: &self.vars, context: &ctx };
                    path::select_for_write(&mut self.tree, scope, sub)?.node
                }
            };
            self.tree.set_value(target, value.map(str::to_owned));
        }
        debug!(base, sub, count = bases.len(), "setm");
        Ok(bases.len())
    }

    /// Remove every node matching `path` with its subtree.  Returns the
    /// total number of nodes removed, descendants included.
    pub fn rm(&mut self, path: &str) -> Result<usize> {
        let matched = self.select(path)?;
        let mut removed = 0;
        for &n in &matched {
            // skip nodes already gone with an ancestor that also matched
            if self.tree.contains(n) {
                removed += self.tree.remove(n);
            }
        }
        debug!(path, matched = matched.len(), removed, "rm");
        Ok(removed)
    }

    /// Move the single node matching `src` to `dst`.
    ///
    /// `dst` is resolved for writing: an existing node is replaced, a missing
    /// one is created.  The moved node takes `dst`'s label and position.
    pub fn mv(&mut self, src: &str, dst: &str) -> Result<()> {
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        let s = path::select_one(&self.tree, scope, src)?;
        let plan = path::plan_write(&self.tree, scope, dst)?;
        if self.tree.is_ancestor(s, plan.anchor) {
            return Err(Error::MoveIntoDescendant { src: src.to_owned(), dst: dst.to_owned() });
        }
        let d = path::apply_plan(&mut self.tree, plan).node;
        self.tree.transplant(s, d);
        debug!(src, dst, "mv");
        Ok(())
    }

    /// Create a node labelled `label` as a sibling of the single node
    /// matching `path`.
    pub fn insert(&mut self, path: &str, label: &str, before: bool) -> Result<()> {
        if label.is_empty() || label.contains('/') {
            return Err(Error::cannot_create(path, format!("invalid label `{label}`")));
        }
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        let anchor = path::select_one(&self.tree, scope, path)?;
        self.tree
            .insert_sibling(anchor, label, before)
            .ok_or_else(|| Error::cannot_create(path, "the root has no siblings"))?;
        Ok(())
    }

    // ── Variables ─────────────────────────────────────────────────────────────

    /// Bind `name` to the path macro `path`, or remove the binding when
    /// `path` is `None`.
    pub fn defvar(&mut self, name: &str, path: Option<&str>) -> Result<()> {
        check_var_name(name)?;
        match path {
            Some(p) => {
                let ctx = self.context();
                path::compile(p, Scope { vars: &self.vars, context: &ctx })?;
                self.vars.define_path(name, p.trim());
            }
            None => {
                self.vars.unset(name);
            }
        }
        Ok(())
    }

    /// Bind `name` to the nodes matching `path`, creating one node with
    /// `value` (or an empty value) when nothing matches.  Returns `true` if
    /// a node was created.
    pub fn defnode(&mut self, name: &str, path: &str, value: Option<&str>) -> Result<bool> {
        check_var_name(name)?;
        let ctx = self.context();
        let scope = Scope { vars: &self.vars, context: &ctx };
        let write_only = path::compile(path, scope)?.steps.iter().any(Step::has_append);
        if !write_only {
            let existing = path::select(&self.tree, scope, path)?;
            if !existing.is_empty() {
                self.vars.define_nodes(name, existing);
                return Ok(false);
            }
        }
        let r = path::select_for_write(&mut self.tree, scope, path)?;
        self.tree.set_value(r.node, Some(value.unwrap_or_default().to_owned()));
        self.vars.define_nodes(name, vec![r.node]);
        debug!(name, path, "defnode created");
        Ok(true)
    }

    // ── Scripts ───────────────────────────────────────────────────────────────

    /// Run `commands` in order, stopping at the first failure.
    pub fn srun<S: AsRef<str>>(&mut self, commands: &[S]) -> ScriptOutcome {
        script::run(self, commands)
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    /// Look up (and cache) a lens by name.
    pub(crate) fn lens(&mut self, name: &str) -> Result<Arc<dyn Lens>> {
        let key = module_name(name).to_ascii_lowercase();
        if let Some(l) = self.lenses.get(&key) {
            return Ok(Arc::clone(l));
        }
        let lens = self.loader.load(name, &self.search_path)?;
        self.lenses.insert(key, Arc::clone(&lens));
        Ok(lens)
    }

    /// Transforms currently registered under `/augeas/load`.
    pub(crate) fn transforms(&self) -> Vec<Transform> {
        let t = &self.tree;
        let Some(load) = self.lookup(["augeas", "load"]) else { return Vec::new() };
        let values = |n: NodeId, label: &str| -> Vec<String> {
            t.children_labeled(n, label).filter_map(|c| t.value(c)).map(str::to_owned).collect()
        };
        t.children(load)
            .iter()
            .filter_map(|&m| {
                let lens = t.child(m, "lens").and_then(|l| t.value(l))?;
                Some(Transform {
                    module: t.label(m).to_owned(),
                    lens: lens.to_owned(),
                    incl: values(m, "incl"),
                    excl: values(m, "excl"),
                })
            })
            .collect()
    }

    /// Discard `/files` and reparse every file selected by `/augeas/load`.
    ///
    /// Per-file failures are recorded under `/augeas/files<file>/error` and
    /// do not make this call fail.
    pub fn load(&mut self) -> Result<()> {
        let files = self.tree.ensure_path(["files"]);
        self.tree.clear_children(files);
        let meta = self.tree.ensure_path(["augeas", "files"]);
        self.tree.clear_children(meta);

        let mut loaded = 0;
        for t in self.transforms() {
            let module = self.tree.ensure_path(["augeas", "load", t.module.as_str()]);
            for e in self.tree.children_labeled(module, "error").collect::<Vec<_>>() {
                self.tree.remove(e);
            }
            let lens = match self.lens(&t.lens) {
                Ok(l) => l,
                Err(e) => {
                    warn!(module = %t.module, error = %e, "lens unavailable");
                    self.tree.append_child(module, "error", Some(e.to_string()));
                    continue;
                }
            };
            for file in self.expand_transform(&t) {
                if self.lookup(meta_labels(&file)).is_some() {
                    debug!(file, module = %t.module, "already claimed by another lens");
                    continue;
                }
                if self.load_file(&file, &t.lens, lens.as_ref()) {
                    loaded += 1;
                }
            }
        }
        let root = self.tree.root();
        self.tree.clear_dirty(root);
        info!(loaded, "load complete");
        Ok(())
    }

    /// Files matched by `t.incl` and not by `t.excl`, sorted.
    fn expand_transform(&self, t: &Transform) -> Vec<String> {
        let mut files = Vec::new();
        for pat in &t.incl {
            match self.fs.glob(pat) {
                Ok(found) => files.extend(found),
                Err(e) => warn!(pattern = %pat, error = %e, "glob failed"),
            }
        }
        files.retain(|f| !t.excludes(f));
        files.sort();
        files.dedup();
        files
    }

    /// Create `/augeas/files<file>` with its `path` and `lens` children.
    pub(crate) fn record_file(&mut self, file: &str, lens_name: &str) {
        let rec = self.tree.ensure_path(meta_labels(file));
        self.tree.append_child(rec, "path", Some(format!("/files{file}")));
        self.tree.append_child(rec, "lens", Some(lens_name.to_owned()));
    }

    /// Parse one file into `/files<file>`.  Returns `false` on failure.
    fn load_file(&mut self, file: &str, lens_name: &str, lens: &dyn Lens) -> bool {
        self.record_file(file, lens_name);

        let text = match self.fs.read(file) {
            Ok(t) => t,
            Err(e) => {
                warn!(file, error = %e, "read failed");
                self.set_file_error(file, "read_failed", &LensError::new(e.to_string()));
                return false;
            }
        };
        match lens.get(&text) {
            Ok(frags) => {
                let node = self.tree.ensure_path(file_labels(file));
                self.tree.attach(node, frags);
                debug!(file, lens = lens_name, "loaded");
                true
            }
            Err(e) => {
                warn!(file, error = %e, "parse failed");
                self.set_file_error(file, "parse_failed", &e);
                false
            }
        }
    }

    // ── File error subtree ────────────────────────────────────────────────────

    /// Record `err` as `/augeas/files<file>/error = kind`.
    ///
    /// An identical existing error is left untouched.
    pub(crate) fn set_file_error(&mut self, file: &str, kind: &str, err: &LensError) {
        let rec = self.tree.ensure_path(meta_labels(file));
        let fields = [
            ("message", Some(err.message.clone())),
            ("line", err.line.map(|l| l.to_string())),
            ("char", err.char.map(|c| c.to_string())),
        ];
        if let Some(existing) = self.tree.child(rec, "error") {
            let same = self.tree.value(existing) == Some(kind)
                && fields.iter().all(|(label, value)| {
                    self.tree.child(existing, label).and_then(|n| self.tree.value(n))
                        == value.as_deref()
                });
            if same {
                return;
            }
            self.tree.remove(existing);
        }
        let node = self.tree.append_child(rec, "error", Some(kind.to_owned()));
        for (label, value) in fields {
            if let Some(v) = value {
                self.tree.append_child(node, label, Some(v));
            }
        }
    }

    pub(crate) fn clear_file_error(&mut self, file: &str) {
        if let Some(rec) = self.lookup(meta_labels(file)) {
            for e in self.tree.children_labeled(rec, "error").collect::<Vec<_>>() {
                self.tree.remove(e);
            }
        }
    }
}

/// Labels of `/files<file>`.
pub(crate) fn file_labels(file: &str) -> impl Iterator<Item = &str> {
    std::iter::once("files").chain(file.split('/').filter(|s| !s.is_empty()))
}

/// Labels of `/augeas/files<file>`.
pub(crate) fn meta_labels(file: &str) -> impl Iterator<Item = &str> {
    ["augeas", "files"].into_iter().chain(file.split('/').filter(|s| !s.is_empty()))
}

impl Transform {
    /// `true` if `file` matches an `incl` pattern and no `excl` pattern.
    pub(crate) fn includes(&self, file: &str) -> bool {
        self.incl.iter().any(|p| glob_match(p, file)) && !self.excludes(file)
    }

    /// `excl` patterns without a `/` are matched against the file name only.
    fn excludes(&self, file: &str) -> bool {
        self.excl.iter().any(|pattern| {
            if pattern.contains('/') {
                glob_match(pattern, file)
            } else {
                let name = file.rsplit('/').next().unwrap_or(file);
                glob_match(pattern, name)
            }
        })
    }
}

fn check_var_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(path::parse::is_var_char) {
        return Err(Error::syntax(
            name,
            0,
            "variable names may only contain letters, digits, `_` and `-`",
        ));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> Augeas {
        let opts = TreeOptions::new().flags(Flags::NO_LOAD | Flags::NO_MODULE_AUTOLOAD);
        Augeas::open(opts).unwrap()
    }

    #[test]
    fn admin_tree_is_populated() {
        let aug = bare();
        assert_eq!(aug.get("/augeas/context").unwrap().as_deref(), Some("/files"));
        assert_eq!(aug.get("/augeas/save").unwrap().as_deref(), Some("overwrite"));
        assert_eq!(aug.get("/augeas/root").unwrap().as_deref(), Some("/"));
        assert_eq!(aug.nmatch("/augeas/load/*").unwrap(), 0);
        assert_eq!(aug.nmatch("/augeas/loadpath/path").unwrap(), 1);
    }

    #[test]
    fn autoload_registers_builtin_transforms() {
        let aug = Augeas::open(TreeOptions::new().root("/nonexistent-root").flags(Flags::NO_LOAD))
            .unwrap();
        assert_eq!(aug.get("/augeas/load/Hosts/lens").unwrap().as_deref(), Some("Hosts.lns"));
        assert_eq!(aug.get("/augeas/load/Hosts/incl").unwrap().as_deref(), Some("/etc/hosts"));
    }

    #[test]
    fn explicit_lens_replaces_autoloaded_transform() {
        let opts = TreeOptions::new().flags(Flags::NO_LOAD).lens("Hosts.lns").incl("/tmp/hosts");
        let aug = Augeas::open(opts).unwrap();
        assert_eq!(aug.matches("/augeas/load/Hosts/incl").unwrap().len(), 1);
        assert_eq!(aug.get("/augeas/load/Hosts/incl").unwrap().as_deref(), Some("/tmp/hosts"));
    }

    #[test]
    fn set_get_round_trip() {
        let mut aug = bare();
        aug.set("/files/etc/hosts/1/ipaddr", "127.0.0.1").unwrap();
        assert_eq!(aug.get("/files/etc/hosts/1/ipaddr").unwrap().as_deref(), Some("127.0.0.1"));
        assert_eq!(aug.get("etc/hosts/1/ipaddr").unwrap().as_deref(), Some("127.0.0.1"));
    }

    #[test]
    fn get_distinguishes_none_from_many() {
        let mut aug = bare();
        aug.set("/files/a/x[last()+1]", "1").unwrap();
        aug.set("/files/a/x[last()+1]", "2").unwrap();
        assert!(aug.get("/files/a/y").unwrap_err().is_no_match());
        assert!(aug.get("/files/a/x").unwrap_err().is_multiple_match());
        assert!(aug.set("/files/a/x", "3").unwrap_err().is_multiple_match());
    }

    #[test]
    fn rm_counts_subtrees() {
        let mut aug = bare();
        aug.set("/files/a/b/c", "1").unwrap();
        aug.set("/files/a/d", "2").unwrap();
        assert_eq!(aug.rm("/files/nothing").unwrap(), 0);
        assert_eq!(aug.rm("/files/a/*").unwrap(), 3);
        assert_eq!(aug.nmatch("/files/a/*").unwrap(), 0);
    }

    #[test]
    fn mv_onto_ancestor_keeps_moved_content() {
        let mut aug = bare();
        aug.set("/files/a/b", "inner").unwrap();
        aug.set("/files/a/b/c", "1").unwrap();
        aug.set("/files/a/d", "2").unwrap();
        aug.mv("/files/a/b", "/files/a").unwrap();
        assert_eq!(aug.get("/files/a").unwrap().as_deref(), Some("inner"));
        assert_eq!(aug.matches("/files/a/*").unwrap(), ["/files/a/c"]);
    }

    #[test]
    fn mv_replaces_destination() {
        let mut aug = bare();
        aug.set("/files/src", "v").unwrap();
        aug.set("/files/src/kid", "k").unwrap();
        aug.set("/files/dst/old", "o").unwrap();
        aug.mv("/files/src", "/files/dst").unwrap();
        assert_eq!(aug.nmatch("/files/src").unwrap(), 0);
        assert_eq!(aug.get("/files/dst").unwrap().as_deref(), Some("v"));
        assert_eq!(aug.get("/files/dst/kid").unwrap().as_deref(), Some("k"));
        assert_eq!(aug.nmatch("/files/dst/old").unwrap(), 0);
    }

    #[test]
    fn mv_into_descendant_is_refused() {
        let mut aug = bare();
        aug.set("/files/a/b", "1").unwrap();
        let before = aug.tree().len();
        assert!(matches!(
            aug.mv("/files/a", "/files/a/b/c"),
            Err(Error::MoveIntoDescendant { .. })
        ));
        assert_eq!(aug.tree().len(), before);
    }

    #[test]
    fn insert_before_and_after() {
        let mut aug = bare();
        aug.set("/files/l/b", "b").unwrap();
        aug.insert("/files/l/b", "a", true).unwrap();
        aug.insert("/files/l/b", "c", false).unwrap();
        let labels: Vec<_> = aug.matches("/files/l/*").unwrap();
        assert_eq!(labels, ["/files/l/a", "/files/l/b", "/files/l/c"]);
    }

    #[test]
    fn setm_sets_under_each_base() {
        let mut aug = bare();
        aug.set("/files/h/1/ip", "a").unwrap();
        aug.set("/files/h/2/ip", "b").unwrap();
        assert_eq!(aug.setm("/files/h/*", Some("comment"), Some("x")).unwrap(), 2);
        assert_eq!(aug.get("/files/h/2/comment").unwrap().as_deref(), Some("x"));
        assert_eq!(aug.setm("/files/h/*/ip", None, Some("z")).unwrap(), 2);
        assert_eq!(aug.get("/files/h/1/ip").unwrap().as_deref(), Some("z"));
    }

    #[test]
    fn defnode_creates_once() {
        let mut aug = bare();
        assert!(aug.defnode("n", "/files/x/y", Some("d")).unwrap());
        assert!(!aug.defnode("n", "/files/x/y", Some("d")).unwrap());
        assert_eq!(aug.nmatch("/files/x/y").unwrap(), 1);
        assert_eq!(aug.get("$n").unwrap().as_deref(), Some("d"));
    }

    #[test]
    fn defnode_without_value_is_empty() {
        let mut aug = bare();
        aug.defnode("n", "/files/x", None).unwrap();
        assert_eq!(aug.get("/files/x").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn defvar_is_a_macro_and_can_be_removed() {
        let mut aug = bare();
        aug.defvar("h", Some("/files/h")).unwrap();
        aug.set("$h/a", "1").unwrap();
        assert_eq!(aug.get("/files/h/a").unwrap().as_deref(), Some("1"));
        aug.defvar("h", None).unwrap();
        assert!(matches!(aug.get("$h/a"), Err(Error::UnboundVariable(_))));
    }

    #[test]
    fn touch_and_clear() {
        let mut aug = bare();
        aug.set("/files/t", "keep").unwrap();
        aug.touch("/files/t").unwrap();
        assert_eq!(aug.get("/files/t").unwrap().as_deref(), Some("keep"));
        aug.touch("/files/u").unwrap();
        assert_eq!(aug.get("/files/u").unwrap(), None);
        aug.clear("/files/t").unwrap();
        assert_eq!(aug.get("/files/t").unwrap(), None);
    }

    #[test]
    fn print_is_depth_first() {
        let mut aug = bare();
        aug.set("/files/p/a", "1").unwrap();
        aug.set("/files/p/b", "2").unwrap();
        let out = aug.print("/files/p").unwrap();
        let paths: Vec<_> = out.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["/files/p", "/files/p/a", "/files/p/b"]);
        assert_eq!(out[2].1.as_deref(), Some("2"));
    }

    #[test]
    fn context_change_moves_relative_paths() {
        let mut aug = bare();
        aug.set("/files/etc/x", "1").unwrap();
        aug.set("/augeas/context", "/files/etc").unwrap();
        assert_eq!(aug.get("x").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn excl_without_slash_matches_file_name() {
        let t = Transform {
            module: "Shellvars".into(),
            lens: "Shellvars.lns".into(),
            incl: vec!["/etc/default/*".into()],
            excl: vec!["*~".into(), "/etc/default/l*".into()],
        };
        assert!(t.excludes("/etc/default/grub~"));
        assert!(!t.excludes("/etc/default/grub"));
        assert!(t.excludes("/etc/default/locale"));
        assert!(t.includes("/etc/default/grub"));
        assert!(!t.includes("/etc/default/grub~"));
        assert!(!t.includes("/etc/hosts"));
    }
}
