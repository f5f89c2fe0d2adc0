//! The named, doubly-linked policy chain.
//!
//! Nodes live in an arena and link to each other by [`NodeId`]. A removed
//! node leaves an empty slot behind, so ids handed out earlier never point at
//! a different node. The chain keeps its own head and tail, so none of the
//! primitives need the caller to fix them up.
//!
//! The primitives do not check name uniqueness. Callers run [`PolicyChain::lookup`]
//! or [`PolicyChain::contains_name`] first and decide how to report a
//! conflict.

use crate::errors::NameConflictError;
use crate::policy::{Policy, PolicyEntry};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Stable handle to a node in one [`PolicyChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone)]
struct PolicyNode {
    name: String,
    key: String,
    policy: Arc<dyn Policy>,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// Execution position within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// No policy has run yet.
    #[default]
    BeforeStart,
    /// The node is executing or has executed.
    At(NodeId),
    /// Every policy has been entered; the transport is next or running.
    Exhausted,
}

/// Result of the single-scan lookup used by the mutation API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookup {
    /// Node matching the base name, if any.
    pub base: Option<NodeId>,
    /// Whether the new name is already taken anywhere in the chain.
    pub name_exists: bool,
    /// Whether the cursor sits at or before the base node.
    pub cursor_before_base: bool,
}

/// A named, ordered sequence of policies.
#[derive(Default)]
pub struct PolicyChain {
    nodes: Vec<Option<PolicyNode>>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl PolicyChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain from entries, rejecting duplicate names.
    pub fn from_entries<I>(entries: I) -> Result<Self, NameConflictError>
    where
        I: IntoIterator<Item = PolicyEntry>,
    {
        let mut chain = Self::new();
        for entry in entries {
            if chain.contains_name(&entry.name) {
                return Err(NameConflictError::new(entry.name));
            }
            chain.push_back(entry);
        }
        Ok(chain)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the chain holds no policies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// First node.
    #[must_use]
    pub fn head(&self) -> Option<NodeId> {
        self.head
    }

    /// Last node.
    #[must_use]
    pub fn tail(&self) -> Option<NodeId> {
        self.tail
    }

    /// Successor of `id`.
    #[must_use]
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.next
    }

    /// Predecessor of `id`.
    #[must_use]
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.prev
    }

    /// Returns true if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Name of the node.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Policy of the node.
    #[must_use]
    pub fn policy(&self, id: NodeId) -> Option<Arc<dyn Policy>> {
        self.node(id).map(|n| Arc::clone(&n.policy))
    }

    /// The node as an owned entry.
    #[must_use]
    pub fn entry(&self, id: NodeId) -> Option<PolicyEntry> {
        self.node(id)
            .map(|n| PolicyEntry::new(n.name.clone(), Arc::clone(&n.policy)))
    }

    /// Node ids from head to tail.
    pub fn ids(&self) -> Ids<'_> {
        Ids {
            chain: self,
            current: self.head,
        }
    }

    /// Entries from head to tail.
    #[must_use]
    pub fn entries(&self) -> Vec<PolicyEntry> {
        self.ids().filter_map(|id| self.entry(id)).collect()
    }

    /// Names from head to tail.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.ids()
            .filter_map(|id| self.name(id).map(str::to_string))
            .collect()
    }

    /// Lower-cased names of every live node.
    #[must_use]
    pub fn name_keys(&self) -> HashSet<String> {
        self.ids()
            .filter_map(|id| self.node(id).map(|n| n.key.clone()))
            .collect()
    }

    /// Finds a node by name, ignoring case.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeId> {
        let key = name_key(name);
        self.ids()
            .find(|id| self.node(*id).is_some_and(|n| n.key == key))
    }

    /// Returns true if a node with this name exists, ignoring case.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Scans the chain once for the base node, a clash with `name`, and
    /// the cursor's position relative to the base.
    ///
    /// `cursor_before_base` is true when the cursor has not started, or sits
    /// on the base node or on any node before it. It is false once the
    /// chain is exhausted or when the base is missing.
    #[must_use]
    pub fn lookup(&self, base_name: &str, name: &str, cursor: Cursor) -> Lookup {
        let base_key = name_key(base_name);
        let key = name_key(name);

        let mut result = Lookup {
            base: None,
            name_exists: false,
            cursor_before_base: false,
        };
        let mut cursor_seen = cursor == Cursor::BeforeStart;

        for id in self.ids() {
            if result.base.is_some() && result.name_exists {
                break;
            }
            let Some(node) = self.node(id) else { continue };
            if cursor == Cursor::At(id) {
                cursor_seen = true;
            }
            if result.base.is_none() && node.key == base_key {
                result.base = Some(id);
                result.cursor_before_base = cursor_seen;
            }
            if node.key == key {
                result.name_exists = true;
            }
        }

        result
    }

    /// Appends a node at the tail.
    pub fn push_back(&mut self, entry: PolicyEntry) -> NodeId {
        match self.tail {
            Some(tail) => self.insert_after(tail, entry),
            None => self.link_only(entry),
        }
    }

    /// Prepends a node at the head.
    pub fn push_front(&mut self, entry: PolicyEntry) -> NodeId {
        match self.head {
            Some(head) => self.insert_before(head, entry),
            None => self.link_only(entry),
        }
    }

    /// Splices a new node directly after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, entry: PolicyEntry) -> NodeId {
        let after = self.next(anchor);
        let id = self.alloc(entry, Some(anchor), after);
        self.set_next(anchor, Some(id));
        match after {
            Some(after) => self.set_prev(after, Some(id)),
            None => self.tail = Some(id),
        }
        id
    }

    /// Splices a new node directly before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, entry: PolicyEntry) -> NodeId {
        let before = self.prev(anchor);
        let id = self.alloc(entry, before, Some(anchor));
        self.set_prev(anchor, Some(id));
        match before {
            Some(before) => self.set_next(before, Some(id)),
            None => self.head = Some(id),
        }
        id
    }

    /// Puts a new node in `old`'s position and returns the new id with the
    /// replaced entry.
    pub fn replace(&mut self, old: NodeId, entry: PolicyEntry) -> Option<(NodeId, PolicyEntry)> {
        let prev = self.prev(old);
        let removed = self.remove(old)?;
        let id = match prev {
            Some(prev) => self.insert_after(prev, entry),
            None => self.push_front(entry),
        };
        Some((id, removed))
    }

    /// Copies the chain without compacting it, so every [`NodeId`] of this
    /// chain stays valid in the copy.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            head: self.head,
            tail: self.tail,
            len: self.len,
        }
    }

    /// Unlinks a node and returns its entry.
    pub fn remove(&mut self, id: NodeId) -> Option<PolicyEntry> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        match node.prev {
            Some(prev) => self.set_next(prev, node.next),
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.set_prev(next, node.prev),
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(PolicyEntry::new(node.name, node.policy))
    }

    fn link_only(&mut self, entry: PolicyEntry) -> NodeId {
        let id = self.alloc(entry, None, None);
        self.head = Some(id);
        self.tail = Some(id);
        id
    }

    fn alloc(&mut self, entry: PolicyEntry, prev: Option<NodeId>, next: Option<NodeId>) -> NodeId {
        debug_assert!(
            !self.contains_name(&entry.name),
            "duplicate policy name '{}'",
            entry.name
        );
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(PolicyNode {
            key: name_key(&entry.name),
            name: entry.name,
            policy: entry.policy,
            prev,
            next,
        }));
        self.len += 1;
        id
    }

    fn node(&self, id: NodeId) -> Option<&PolicyNode> {
        self.nodes.get(id.0)?.as_ref()
    }

    fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.next = next;
        }
    }

    fn set_prev(&mut self, id: NodeId, prev: Option<NodeId>) {
        if let Some(Some(node)) = self.nodes.get_mut(id.0) {
            node.prev = prev;
        }
    }
}

impl Clone for PolicyChain {
    /// Copies the live nodes into a fresh, compacted arena.
    fn clone(&self) -> Self {
        let mut chain = Self::new();
        for entry in self.entries() {
            chain.push_back(entry);
        }
        chain
    }
}

impl fmt::Debug for PolicyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Iterator over node ids from head to tail.
pub struct Ids<'a> {
    chain: &'a PolicyChain,
    current: Option<NodeId>,
}

impl Iterator for Ids<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.chain.next(id);
        Some(id)
    }
}
