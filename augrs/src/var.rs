//! Variable binding table.
//!
//! Backs `defvar` and `defnode`.  A binding is either a *path macro* (the
//! text is substituted into every expression that references `$name`, so it
//! is re-evaluated each time) or a fixed *node set* captured when the binding
//! was made.  Node-set bindings keep pointing at the same nodes across later
//! structural changes; nodes removed from the tree simply drop out.

use std::collections::HashMap;

use crate::tree::NodeId;

/// What a variable name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `defvar name path`: substituted textually before parsing.
    Path(String),
    /// `defnode name path`: the exact nodes matched or created.
    Nodes(Vec<NodeId>),
}

/// Name → [`Binding`] store, one per tree.
#[derive(Debug, Default)]
pub struct VarTable {
    vars: HashMap<String, Binding>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a path macro, replacing any previous binding.
    pub fn define_path(&mut self, name: impl Into<String>, path: impl Into<String>) {
        self.vars.insert(name.into(), Binding::Path(path.into()));
    }

    /// Bind `name` to a fixed set of nodes, replacing any previous binding.
    pub fn define_nodes(&mut self, name: impl Into<String>, nodes: Vec<NodeId>) {
        self.vars.insert(name.into(), Binding::Nodes(nodes));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.vars.get(name)
    }

    /// Remove a binding.  Returns `true` if it existed.
    pub fn unset(&mut self, name: &str) -> bool {
        self.vars.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    #[test]
    fn define_and_get_path() {
        let mut vars = VarTable::new();
        vars.define_path("hosts", "/files/etc/hosts");
        assert_eq!(vars.get("hosts"), Some(&Binding::Path("/files/etc/hosts".into())));
    }

    #[test]
    fn redefine_replaces_kind() {
        let mut t = Tree::new();
        let n = t.ensure_path(["a"]);
        let mut vars = VarTable::new();
        vars.define_path("x", "/a");
        vars.define_nodes("x", vec![n]);
        assert_eq!(vars.get("x"), Some(&Binding::Nodes(vec![n])));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn unset() {
        let mut vars = VarTable::new();
        vars.define_path("gone", "/x");
        assert!(vars.unset("gone"));
        assert!(vars.get("gone").is_none());
        assert!(!vars.unset("gone"));
    }

    #[test]
    fn missing_returns_none() {
        let vars = VarTable::new();
        assert!(vars.get("nope").is_none());
        assert!(vars.is_empty());
    }
}
