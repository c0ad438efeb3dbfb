//! The render tree: one node per placed chunk.
//!
//! Nodes live in a slab addressed by [`NodeId`]. Every attached node sits in
//! exactly one ordered child list: the document's top level, a container
//! node's content region, or the orphan holding area.
//!
//! ```text
//! Document ─┬─ h1 (headline) ─┬─ t1 (text)
//!           │                 └─ s1 (source)
//!           └─ h2 (headline)
//! Orphans  ─── t9 (waiting for its new container)
//! ```
//!
//! The tree only executes moves. Deciding where a chunk belongs is the
//! engine's job.

use std::collections::HashMap;

use indexmap::IndexMap;
use leisure_types::{ChunkId, ChunkKind};
use serde_json::Value;

use crate::binding::Binding;
use crate::markup::Markup;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An ordered child list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Container {
    Document,
    Node(NodeId),
    Orphans,
}

/// Where a node should sit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Front(Container),
    After(NodeId),
}

#[derive(Clone, Debug)]
pub struct RenderNode {
    chunk: ChunkId,
    kind: ChunkKind,
    container: Option<Container>,
    children: Vec<NodeId>,
    /// Output of the render function; `None` when it rendered nothing.
    pub markup: Option<Markup>,
    pub bindings: Vec<Binding>,
    /// Current text of each binding, parallel to `bindings`.
    pub shown: Vec<String>,
    /// Set when a properties drawer among the children hides this node.
    pub hidden: bool,
    /// Transient UI state owned by the node; survives re-renders.
    pub state: IndexMap<String, Value>,
    /// A local binding write from this node is in flight.
    pub updating: bool,
}

impl RenderNode {
    fn new(chunk: ChunkId, kind: ChunkKind) -> Self {
        Self {
            chunk,
            kind,
            container: None,
            children: Vec::new(),
            markup: None,
            bindings: Vec::new(),
            shown: Vec::new(),
            hidden: false,
            state: IndexMap::new(),
            updating: false,
        }
    }

    pub fn chunk(&self) -> &ChunkId {
        &self.chunk
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn container(&self) -> Option<Container> {
        self.container
    }

    /// The content region, in order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Addressable attributes identifying the node.
    pub fn attributes(&self) -> [(&'static str, &str); 2] {
        [("data-chunk-id", self.chunk.as_str()), ("data-chunk-type", self.kind.as_str())]
    }
}

/// Mutation counters, reset by [`RenderTree::take_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub created: usize,
    pub moved: usize,
    pub removed: usize,
    pub rendered: usize,
}

impl TreeStats {
    pub fn is_quiet(&self) -> bool {
        self.created == 0 && self.moved == 0 && self.removed == 0
    }
}

#[derive(Debug, Default)]
pub struct RenderTree {
    nodes: Vec<Option<RenderNode>>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
    orphans: Vec<NodeId>,
    by_chunk: HashMap<ChunkId, NodeId>,
    stats: TreeStats,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_chunk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chunk.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&RenderNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn lookup(&self, chunk: &ChunkId) -> Option<NodeId> {
        self.by_chunk.get(chunk).copied()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn orphans(&self) -> &[NodeId] {
        &self.orphans
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> TreeStats {
        std::mem::take(&mut self.stats)
    }

    pub(crate) fn note_rendered(&mut self) {
        self.stats.rendered += 1;
    }

    /// Create a detached node for `chunk`.
    pub fn create(&mut self, chunk: ChunkId, kind: ChunkKind) -> NodeId {
        let node = RenderNode::new(chunk.clone(), kind);
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.by_chunk.insert(chunk, id);
        self.stats.created += 1;
        id
    }

    fn list(&self, container: Container) -> Option<&Vec<NodeId>> {
        match container {
            Container::Document => Some(&self.roots),
            Container::Orphans => Some(&self.orphans),
            Container::Node(n) => self.node(n).map(|node| &node.children),
        }
    }

    fn list_mut(&mut self, container: Container) -> Option<&mut Vec<NodeId>> {
        match container {
            Container::Document => Some(&mut self.roots),
            Container::Orphans => Some(&mut self.orphans),
            Container::Node(n) => self.node_mut(n).map(|node| &mut node.children),
        }
    }

    /// Where `id` currently sits, if attached.
    pub fn position_of(&self, id: NodeId) -> Option<Position> {
        let container = self.node(id)?.container?;
        let list = self.list(container)?;
        let at = list.iter().position(|n| *n == id)?;
        Some(match at {
            0 => Position::Front(container),
            i => Position::After(list[i - 1]),
        })
    }

    pub fn is_at(&self, id: NodeId, pos: Position) -> bool {
        self.position_of(id) == Some(pos)
    }

    /// Whether `ancestor` contains `id` in its content region, at any depth.
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cursor = self.node(id).and_then(|n| n.container);
        while let Some(Container::Node(parent)) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.node(parent).and_then(|n| n.container);
        }
        false
    }

    /// Move `id` to `pos`. Returns `false` when it already sits there or the
    /// move would put a node inside itself.
    pub fn place(&mut self, id: NodeId, pos: Position) -> bool {
        if self.is_at(id, pos) {
            return false;
        }
        let target = match pos {
            Position::Front(c) => c,
            Position::After(sibling) => match self.node(sibling).and_then(|n| n.container) {
                Some(c) => c,
                None => return false,
            },
        };
        if let Container::Node(n) = target {
            if n == id || self.contains(id, n) {
                return false;
            }
        }

        if self.detach(id) {
            self.stats.moved += 1;
        }
        let Some(list) = self.list_mut(target) else {
            return false;
        };
        let at = match pos {
            Position::Front(_) => 0,
            Position::After(sibling) => list
                .iter()
                .position(|n| *n == sibling)
                .map_or(list.len(), |i| i + 1),
        };
        list.insert(at, id);
        if let Some(node) = self.node_mut(id) {
            node.container = Some(target);
        }
        true
    }

    /// Take `id` out of its child list. Returns whether it was attached.
    pub fn detach(&mut self, id: NodeId) -> bool {
        let Some(container) = self.node_mut(id).and_then(|n| n.container.take()) else {
            return false;
        };
        if let Some(list) = self.list_mut(container) {
            list.retain(|n| *n != id);
        }
        true
    }

    /// Move the content region of `id` into the orphan area.
    pub fn orphan_children(&mut self, id: NodeId) -> usize {
        let children = match self.node_mut(id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return 0,
        };
        let count = children.len();
        for child in &children {
            if let Some(node) = self.node_mut(*child) {
                node.container = Some(Container::Orphans);
            }
        }
        self.orphans.extend(children);
        count
    }

    /// Remove `id` and its whole content region. Returns the chunk ids whose
    /// nodes were destroyed.
    pub fn remove(&mut self, id: NodeId) -> Vec<ChunkId> {
        self.detach(id);
        let mut gone = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) else {
                continue;
            };
            self.free.push(next.0);
            if self.by_chunk.get(&node.chunk) == Some(&next) {
                self.by_chunk.remove(&node.chunk);
            }
            self.stats.removed += 1;
            stack.extend(node.children);
            gone.push(node.chunk);
        }
        gone
    }

    /// Destroy every node still in the orphan area.
    pub fn clear_orphans(&mut self) -> Vec<ChunkId> {
        let orphans = std::mem::take(&mut self.orphans);
        let mut gone = Vec::new();
        for id in orphans {
            if let Some(node) = self.node_mut(id) {
                node.container = None;
            }
            gone.extend(self.remove(id));
        }
        gone
    }

    /// Change the kind a node represents. The old content region goes to the
    /// orphan area.
    pub fn retype(&mut self, id: NodeId, kind: ChunkKind) -> usize {
        let orphaned = self.orphan_children(id);
        if let Some(node) = self.node_mut(id) {
            node.kind = kind;
            node.markup = None;
            node.bindings.clear();
            node.shown.clear();
            node.hidden = false;
        }
        orphaned
    }

    /// Attached nodes in document order, orphans excluded.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.by_chunk.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.node(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &RenderNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
    }

    /// Serialize the attached tree.
    pub fn to_html(&self) -> String {
        self.roots.iter().map(|id| self.node_markup(*id).to_html()).collect()
    }

    /// The node as markup: a wrapper carrying its identifying attributes,
    /// its own rendering, then its content region.
    pub fn node_markup(&self, id: NodeId) -> Markup {
        let Some(node) = self.node(id) else {
            return Markup::text("");
        };
        let mut wrapper = Markup::element("div");
        for (k, v) in node.attributes() {
            wrapper = wrapper.attr(k, v);
        }
        if node.hidden {
            wrapper = wrapper.attr("hidden", "hidden");
        }
        if let Some(markup) = &node.markup {
            wrapper = wrapper.child(markup.clone());
        }
        wrapper.children(node.children.iter().map(|c| self.node_markup(*c)))
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
