//! In-memory node tree.
//!
//! [`Tree`] is an arena: every node lives in a slot addressed by a
//! [`NodeId`].  Freed slots are reused, but each reuse bumps the slot's
//! generation and the id carries the generation it was issued with, so an id
//! held by a variable binding can never alias a node created later.  Every
//! accessor treats a dead id as "no such node" rather than panicking.
//!
//! Each node carries a *dirty* bit.  Any structural or value change marks
//! the node and all of its ancestors dirty; the save pass consults the bit to
//! decide which file subtrees need to be written.

use std::borrow::Cow;

// ── NodeId ────────────────────────────────────────────────────────────────────

/// Stable handle to a node inside one [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

// ── Fragment ──────────────────────────────────────────────────────────────────

/// A detached, owned subtree.
///
/// Lenses produce fragments when parsing a file and consume them when
/// serialising one; the tree converts between fragments and arena nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub label: String,
    pub value: Option<String>,
    pub children: Vec<Fragment>,
}

impl Fragment {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), value: None, children: Vec::new() }
    }

    /// Builder: set the value.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder: append a child.
    pub fn with_child(mut self, child: Fragment) -> Self {
        self.children.push(child);
        self
    }

    /// First child labelled `label`.
    pub fn child(&self, label: &str) -> Option<&Fragment> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Value of the first child labelled `label`.
    pub fn child_value(&self, label: &str) -> Option<&str> {
        self.child(label)?.value.as_deref()
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Node {
    label: String,
    value: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    dirty: bool,
}

impl Node {
    fn new(label: String, value: Option<String>, parent: Option<NodeId>) -> Self {
        Self { label, value, parent, children: Vec::new(), dirty: false }
    }
}

// ── Tree ──────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owner of every node reachable from the root.
#[derive(Debug)]
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// A tree holding only the unlabelled root.
    pub fn new() -> Self {
        let root = Slot { generation: 0, node: Some(Node::new(String::new(), None, None)) };
        Self { slots: vec![root], free: Vec::new(), live: 1, root: NodeId { slot: 0, generation: 0 } }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// `true` while `id` refers to a node that has not been removed.
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Number of slots allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn label(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.label.as_str())
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.value.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Children of `parent` whose label is exactly `label`, in order.
    pub fn children_labeled<'a>(
        &'a self,
        parent: NodeId,
        label: &'a str,
    ) -> impl Iterator<Item = NodeId> + 'a {
        self.children(parent).iter().copied().filter(move |&c| self.label(c) == label)
    }

    /// First child of `parent` labelled `label`.
    pub fn child(&self, parent: NodeId, label: &str) -> Option<NodeId> {
        self.children_labeled(parent, label).next()
    }

    /// `true` if `ancestor` is `node` itself or lies on its parent chain.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.parent(id);
        }
        false
    }

    /// `id` and all its descendants in document (pre-)order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !self.contains(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    /// 1-based index of `id` among the siblings that share its label, and
    /// the size of that sibling group.
    pub fn position(&self, id: NodeId) -> (usize, usize) {
        let Some(parent) = self.parent(id) else { return (1, 1) };
        let label = self.label(id);
        let mut index = 0;
        let mut count = 0;
        for c in self.children_labeled(parent, label) {
            count += 1;
            if c == id {
                index = count;
            }
        }
        (index, count)
    }

    /// Canonical path expression addressing exactly `id`.
    ///
    /// A `[N]` suffix is added only where the label is shared by more than
    /// one sibling, e.g. `/files/etc/hosts/1/alias[2]`.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut steps = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            let (index, count) = self.position(cur);
            let label = escape_label(self.label(cur));
            if count > 1 {
                steps.push(format!("{label}[{index}]"));
            } else {
                steps.push(label.into_owned());
            }
            cur = parent;
        }
        if steps.is_empty() {
            return "/".to_owned();
        }
        steps.reverse();
        let mut path = String::new();
        for s in steps {
            path.push('/');
            path.push_str(&s);
        }
        path
    }

    // ── Mutation ──────────────────────────────────────────────────────────────

    fn alloc(&mut self, label: String, value: Option<String>, parent: NodeId) -> NodeId {
        let mut node = Node::new(label, value, Some(parent));
        node.dirty = true;
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.node = Some(node);
            return NodeId { slot, generation: s.generation };
        }
        let slot = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot { generation: 0, node: Some(node) });
        NodeId { slot, generation: 0 }
    }

    /// Empty the slot of a live node and retire its generation.
    fn release(&mut self, id: NodeId) {
        let Some(s) = self.slots.get_mut(id.slot as usize) else { return };
        if s.generation != id.generation || s.node.take().is_none() {
            return;
        }
        self.live -= 1;
        // a slot whose generation would wrap is never handed out again
        if let Some(next) = s.generation.checked_add(1) {
            s.generation = next;
            self.free.push(id.slot);
        }
    }

    /// Append a new child at the end of `parent`'s children.
    pub fn append_child(
        &mut self,
        parent: NodeId,
        label: impl Into<String>,
        value: Option<String>,
    ) -> NodeId {
        let id = self.alloc(label.into(), value, parent);
        if let Some(p) = self.node_mut(parent) {
            p.children.push(id);
        }
        self.mark_dirty(parent);
        id
    }

    /// Create a child labelled `label` directly after the last existing
    /// child with the same label, or at the end when there is none.
    pub fn append_after_label(&mut self, parent: NodeId, label: &str) -> NodeId {
        let last = self
            .children(parent)
            .iter()
            .rposition(|&c| self.label(c) == label);
        let id = self.alloc(label.to_owned(), None, parent);
        if let Some(p) = self.node_mut(parent) {
            match last {
                Some(i) => p.children.insert(i + 1, id),
                None => p.children.push(id),
            }
        }
        self.mark_dirty(parent);
        id
    }

    /// Create a sibling of `anchor`, placed before or after it.
    ///
    /// Returns `None` if `anchor` is the root or no longer exists.
    pub fn insert_sibling(&mut self, anchor: NodeId, label: &str, before: bool) -> Option<NodeId> {
        let parent = self.parent(anchor)?;
        let at = self.children(parent).iter().position(|&c| c == anchor)?;
        let id = self.alloc(label.to_owned(), None, parent);
        let p = self.node_mut(parent)?;
        p.children.insert(if before { at } else { at + 1 }, id);
        self.mark_dirty(parent);
        Some(id)
    }

    /// Return the first child labelled `label`, creating it if missing.
    pub fn ensure_child(&mut self, parent: NodeId, label: &str) -> NodeId {
        match self.child(parent, label) {
            Some(c) => c,
            None => self.append_child(parent, label, None),
        }
    }

    /// Walk `labels` from the root, creating any missing node.
    pub fn ensure_path<'s>(&mut self, labels: impl IntoIterator<Item = &'s str>) -> NodeId {
        let mut cur = self.root;
        for l in labels {
            cur = self.ensure_child(cur, l);
        }
        cur
    }

    /// Replace the value of `id`.  Marks it dirty only if the value changed.
    pub fn set_value(&mut self, id: NodeId, value: Option<String>) {
        let Some(n) = self.node_mut(id) else { return };
        if n.value == value {
            return;
        }
        n.value = value;
        self.mark_dirty(id);
    }

    /// Remove `id` and its subtree.  Returns the number of nodes removed.
    ///
    /// The root cannot be removed; asking to remove it returns 0.
    pub fn remove(&mut self, id: NodeId) -> usize {
        let Some(parent) = self.parent(id) else { return 0 };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != id);
        }
        self.mark_dirty(parent);
        let doomed = self.descendants(id);
        for &n in &doomed {
            self.release(n);
        }
        doomed.len()
    }

    /// Remove every child of `id`.  Returns the number of nodes removed.
    pub fn clear_children(&mut self, id: NodeId) -> usize {
        let kids = self.children(id).to_vec();
        kids.into_iter().map(|c| self.remove(c)).sum()
    }

    /// Give `dst` the value and children of `src`, then detach `src`.
    ///
    /// `dst` keeps its own label and position; its previous children are
    /// dropped.  `dst` may be an ancestor of `src` but must not lie inside
    /// it.
    pub fn transplant(&mut self, src: NodeId, dst: NodeId) {
        let value = self.value(src).map(str::to_owned);
        let moved = match self.node_mut(src) {
            Some(s) => std::mem::take(&mut s.children),
            None => return,
        };
        self.remove(src);
        self.clear_children(dst);
        for &c in &moved {
            if let Some(n) = self.node_mut(c) {
                n.parent = Some(dst);
            }
        }
        if let Some(d) = self.node_mut(dst) {
            d.children = moved;
            d.value = value;
        }
        self.mark_dirty(dst);
    }

    // ── Dirty tracking ────────────────────────────────────────────────────────

    /// Mark `id` and all of its ancestors dirty.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut cur = Some(id);
        while let Some(c) = cur {
            match self.node_mut(c) {
                Some(n) => {
                    n.dirty = true;
                    cur = n.parent;
                }
                None => break,
            }
        }
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.dirty)
    }

    /// Clear the dirty bit on `id` and its whole subtree.
    pub fn clear_dirty(&mut self, id: NodeId) {
        for n in self.descendants(id) {
            if let Some(node) = self.node_mut(n) {
                node.dirty = false;
            }
        }
    }

    // ── Fragments ─────────────────────────────────────────────────────────────

    /// Copy the children of `id` out as fragments.
    pub fn to_fragments(&self, id: NodeId) -> Vec<Fragment> {
        self.children(id).iter().map(|&c| self.to_fragment(c)).collect()
    }

    pub fn to_fragment(&self, id: NodeId) -> Fragment {
        Fragment {
            label: self.label(id).to_owned(),
            value: self.value(id).map(str::to_owned),
            children: self.to_fragments(id),
        }
    }

    /// Append `fragments` as children of `parent`.
    pub fn attach(&mut self, parent: NodeId, fragments: Vec<Fragment>) {
        for f in fragments {
            let id = self.append_child(parent, f.label, f.value);
            self.attach(id, f.children);
        }
    }
}

// ── Label escaping ────────────────────────────────────────────────────────────

/// Characters that terminate or alter a step in a path expression.
pub(crate) fn is_special(c: char) -> bool {
    matches!(c, '/' | '[' | ']' | '\\' | '=' | '!' | '$' | '\'' | '"' | '(' | ')' | '~')
        || c.is_whitespace()
}

/// Escape `label` so that it parses back as a single literal step.
pub fn escape_label(label: &str) -> Cow<'_, str> {
    let needs = label == "*"
        || label == "."
        || label == ".."
        || label.chars().any(is_special);
    if !needs {
        return Cow::Borrowed(label);
    }
    let mut out = String::with_capacity(label.len() + 2);
    for (i, c) in label.chars().enumerate() {
        if is_special(c) || (i == 0 && (c == '*' || c == '.')) {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts_tree() -> (Tree, NodeId) {
        let mut t = Tree::new();
        let hosts = t.ensure_path(["files", "etc", "hosts"]);
        let e1 = t.append_child(hosts, "1", None);
        t.append_child(e1, "ipaddr", Some("127.0.0.1".into()));
        t.append_child(e1, "canonical", Some("localhost".into()));
        t.append_child(e1, "alias", Some("a".into()));
        t.append_child(e1, "alias", Some("b".into()));
        (t, e1)
    }

    #[test]
    fn path_of_adds_index_only_for_shared_labels() {
        let (t, e1) = hosts_tree();
        let kids = t.children(e1).to_vec();
        assert_eq!(t.path_of(kids[0]), "/files/etc/hosts/1/ipaddr");
        assert_eq!(t.path_of(kids[3]), "/files/etc/hosts/1/alias[2]");
        assert_eq!(t.path_of(t.root()), "/");
    }

    #[test]
    fn append_after_label_keeps_group_together() {
        let (mut t, e1) = hosts_tree();
        t.append_child(e1, "comment", None);
        let new = t.append_after_label(e1, "alias");
        let labels: Vec<_> = t.children(e1).iter().map(|&c| t.label(c)).collect();
        assert_eq!(labels, ["ipaddr", "canonical", "alias", "alias", "alias", "comment"]);
        assert_eq!(t.position(new), (3, 3));
    }

    #[test]
    fn remove_counts_subtree_and_kills_ids() {
        let (mut t, e1) = hosts_tree();
        let first = t.children(e1)[0];
        assert_eq!(t.remove(e1), 5);
        assert!(!t.contains(e1));
        assert!(!t.contains(first));
        assert_eq!(t.label(first), "");
        assert_eq!(t.value(first), None);
    }

    #[test]
    fn freed_slots_are_reused_without_aliasing() {
        let (mut t, e1) = hosts_tree();
        let hosts = t.parent(e1).unwrap();
        let live = t.len();
        t.remove(e1);
        for _ in 0..1000 {
            let e = t.append_child(hosts, "2", None);
            t.append_child(e, "ipaddr", Some("10.0.0.1".into()));
            assert!(!t.contains(e1));
            t.remove(e);
        }
        assert_eq!(t.len(), live - 5);
        assert!(t.capacity() <= live);
        let fresh = t.append_child(hosts, "1", None);
        assert!(!t.contains(e1));
        assert_ne!(fresh, e1);
        assert!(t.contains(fresh));
    }

    #[test]
    fn root_is_not_removable() {
        let mut t = Tree::new();
        assert_eq!(t.remove(t.root()), 0);
        assert!(t.contains(t.root()));
    }

    #[test]
    fn set_value_marks_ancestors_dirty() {
        let (mut t, e1) = hosts_tree();
        t.clear_dirty(t.root());
        let ip = t.children(e1)[0];
        t.set_value(ip, Some("127.0.0.1".into()));
        assert!(!t.is_dirty(ip), "unchanged value must not dirty the tree");
        t.set_value(ip, Some("10.0.0.1".into()));
        assert!(t.is_dirty(ip));
        assert!(t.is_dirty(e1));
        assert!(t.is_dirty(t.root()));
    }

    #[test]
    fn transplant_moves_value_and_children() {
        let (mut t, e1) = hosts_tree();
        let hosts = t.parent(e1).unwrap();
        let e2 = t.append_child(hosts, "2", Some("old".into()));
        t.append_child(e2, "junk", None);
        t.transplant(e1, e2);
        assert!(!t.contains(e1));
        assert_eq!(t.label(e2), "2");
        assert_eq!(t.children(e2).len(), 4);
        assert_eq!(t.value(e2), None);
        assert_eq!(t.parent(t.children(e2)[0]), Some(e2));
    }

    #[test]
    fn fragments_round_trip_through_attach() {
        let (t, e1) = hosts_tree();
        let frag = t.to_fragment(e1);
        let mut other = Tree::new();
        let root = other.root();
        other.attach(root, vec![frag.clone()]);
        let copied = other.children(root)[0];
        assert_eq!(other.to_fragment(copied), frag);
        assert_eq!(frag.child_value("canonical"), Some("localhost"));
    }

    #[test]
    fn escape_label_special_cases() {
        assert_eq!(escape_label("ipaddr"), "ipaddr");
        assert_eq!(escape_label("a b"), "a\\ b");
        assert_eq!(escape_label("*"), "\\*");
        assert_eq!(escape_label("x/y"), "x\\/y");
        assert_eq!(escape_label("#comment"), "#comment");
    }
}
