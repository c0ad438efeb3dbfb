//! The reconciliation engine.
//!
//! Owns the chunk model, the indices, and the render tree, and is the only
//! thing that writes them. One call to [`Engine::apply`] is one cycle:
//!
//! ```text
//! serial += 1
//!   │
//!   ├─ remove    drop nodes, model entries, index entries
//!   ├─ ingest    added + changed records → model, mark touched
//!   ├─ relink    linked patches; stamp serial if not touched yet
//!   ├─ reorder   sort touched by the advisory order
//!   ├─ derive    re-derive touched chunks, update indices
//!   ├─ place     compute positions from prev/parent, move only if needed
//!   ├─ render    markup + bindings for touched nodes
//!   ├─ refresh   visibility, bound values, live views
//!   └─ orphans   destroy whatever was not reclaimed
//! ```
//!
//! A cycle always runs to completion. Derivation corruption is reported after
//! the cycle has finished with everything else.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use leisure_types::{ChunkDiff, ChunkId, ChunkKind, Links, Serial, WireChunk};
use serde_json::Value;
use tracing::{debug, debug_span, error, trace, warn};

use crate::binding::{
    self, Binding, BindingWrite, Globals, PathRoot, ValueSource, display_string, scan,
};
use crate::chunk::{Chunk, IndexFacets};
use crate::error::{BindingError, BindingResult, ChunkError, ChunkResult};
use crate::index::ChunkIndex;
use crate::markup::Markup;
use crate::model::{ChunkModel, Derived};
use crate::render::{Container, NodeId, Position, RenderTree, TreeStats};
use crate::template::{ChunkRenderer, RenderContext, Templates};
use crate::view::{LiveView, ViewId};

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub serial: Serial,
    /// Touched chunks in processing order.
    pub touched: Vec<ChunkId>,
    pub removed: Vec<ChunkId>,
    /// Names and globals whose values may have changed.
    pub refreshed: Vec<PathRoot>,
    /// Chunks not re-rendered because a local write on their node is in flight.
    pub deferred: Vec<ChunkId>,
    pub stats: TreeStats,
}

pub struct Engine<R = Templates> {
    model: ChunkModel,
    index: ChunkIndex,
    tree: RenderTree,
    globals: Globals,
    renderer: R,
    views: IndexMap<ViewId, LiveView>,
    next_view: usize,
    serial: Serial,
}

impl Engine<Templates> {
    pub fn new() -> Self {
        Self::with_renderer(Templates::new())
    }
}

impl Default for Engine<Templates> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ChunkRenderer> Engine<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            model: ChunkModel::new(),
            index: ChunkIndex::new(),
            tree: RenderTree::new(),
            globals: Globals::new(),
            renderer,
            views: IndexMap::new(),
            next_view: 0,
            serial: Serial::ZERO,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn model(&self) -> &ChunkModel {
        &self.model
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    pub fn tree(&self) -> &RenderTree {
        &self.tree
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Templates changed here take effect for chunks rendered afterwards.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn chunk(&self, id: &ChunkId) -> Option<&Chunk> {
        self.model.get(id)
    }

    pub fn node_for(&self, id: &ChunkId) -> Option<NodeId> {
        self.tree.lookup(id)
    }

    /// The chunk currently registered under `name`.
    pub fn named(&self, name: &str) -> Option<&Chunk> {
        self.context().named_chunk(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.named(name).and_then(Chunk::value)
    }

    pub fn tagged_all<S: AsRef<str>>(&self, tags: &[S]) -> BTreeSet<ChunkId> {
        self.index.all_of(tags)
    }

    pub fn tagged_any<S: AsRef<str>>(&self, tags: &[S]) -> BTreeSet<ChunkId> {
        self.index.any_of(tags)
    }

    pub fn executor(&self, key: &str) -> Option<&Chunk> {
        self.index.executor(key).and_then(|id| self.model.get(id))
    }

    /// Chunk texts concatenated in render-tree order.
    pub fn document_text(&self) -> String {
        self.tree
            .preorder()
            .into_iter()
            .filter_map(|n| self.tree.node(n))
            .filter_map(|node| self.model.get(node.chunk()))
            .map(Chunk::text)
            .collect()
    }

    pub fn to_html(&self) -> String {
        self.tree.to_html()
    }

    fn context(&self) -> RenderContext<'_> {
        RenderContext {
            model: &self.model,
            index: &self.index,
            globals: &self.globals,
        }
    }

    // ========================================================================
    // Cycles
    // ========================================================================

    /// Replace everything with a fresh snapshot.
    pub fn load(&mut self, chunks: Vec<WireChunk>) -> ChunkResult<CycleReport> {
        self.model.clear();
        self.index.clear();
        self.tree.clear();
        self.apply(&ChunkDiff::from_snapshot(chunks))
    }

    /// Apply the chunk returned by a set round-trip.
    pub fn apply_chunk(&mut self, chunk: WireChunk) -> ChunkResult<CycleReport> {
        self.apply(&ChunkDiff {
            changed: vec![chunk],
            ..Default::default()
        })
    }

    /// Run one reconciliation cycle.
    pub fn apply(&mut self, diff: &ChunkDiff) -> ChunkResult<CycleReport> {
        self.serial = self.serial.next();
        let serial = self.serial;
        let span = debug_span!("reconcile", %serial);
        let _enter = span.enter();

        let mut changed: BTreeSet<PathRoot> = BTreeSet::new();
        let mut recheck: HashSet<NodeId> = HashSet::new();
        let mut report = CycleReport {
            serial,
            ..Default::default()
        };

        // Removal before ingest so reused ids start fresh.
        for id in &diff.removed {
            self.remove_chunk(id, &mut changed, &mut recheck);
            report.removed.push(id.clone());
        }

        let mut touched: IndexSet<ChunkId> = IndexSet::new();
        let mut before: HashMap<ChunkId, IndexFacets> = HashMap::new();
        for raw in diff.added.iter().chain(&diff.changed) {
            if let Some(existing) = self.model.get(&raw.id) {
                before.entry(raw.id.clone()).or_insert_with(|| existing.facets());
            }
            self.note_parent(&raw.id, &mut recheck);
            self.model.ingest(raw.clone());
            touched.insert(raw.id.clone());
        }

        for (id, patch) in &diff.linked {
            if let Some(existing) = self.model.get(id) {
                before.entry(id.clone()).or_insert_with(|| existing.facets());
            }
            self.note_parent(id, &mut recheck);
            if !self.model.relink(id, patch) {
                debug!(chunk = %id, "linked patch for unknown chunk");
                continue;
            }
            if touched.contains(id) {
                continue;
            }
            // A value patch changes derived fields; everything else is links.
            if !patch.contains_key("value") {
                self.model.stamp(id, serial);
            }
            touched.insert(id.clone());
        }

        let mut order: Vec<ChunkId> = touched.into_iter().collect();
        if let Some(explicit) = &diff.order {
            let rank: HashMap<&ChunkId, usize> =
                explicit.iter().enumerate().map(|(i, id)| (id, i)).collect();
            order.sort_by_key(|id| rank.get(id).copied().unwrap_or(usize::MAX));
        }

        let mut corrupt: Option<ChunkError> = None;
        for id in &order {
            match self.model.derive(id, serial) {
                Ok(Derived::Fresh) => {
                    let old = before.remove(id).unwrap_or_default();
                    let new = self.model.get(id).map(Chunk::facets).unwrap_or_default();
                    self.reindex(id, &old, &new, &mut changed);
                }
                Ok(Derived::Skipped) => trace!(chunk = %id, "already derived"),
                Err(err) => {
                    error!(%err, "chunk text does not match its type");
                    // No derived fields, so nothing may stay indexed for it.
                    let old = before.remove(id).unwrap_or_default();
                    self.reindex(id, &old, &IndexFacets::default(), &mut changed);
                    corrupt.get_or_insert(err);
                }
            }
        }

        let touched_set: HashSet<ChunkId> = order.iter().cloned().collect();
        let mut placed: HashSet<ChunkId> = HashSet::new();
        for id in &order {
            self.place_with_deps(id, &touched_set, &mut placed);
        }

        let mut rendered: HashSet<NodeId> = HashSet::new();
        for id in &order {
            let Some(node) = self.tree.lookup(id) else {
                continue;
            };
            if self.tree.node(node).is_some_and(|n| n.updating) {
                debug!(chunk = %id, "local write in flight; not re-rendering");
                report.deferred.push(id.clone());
                continue;
            }
            self.render_node(node);
            rendered.insert(node);
            recheck.insert(node);
            if let Some(parent) = self
                .model
                .get(id)
                .and_then(|c| c.links().parent.as_ref())
                .and_then(|p| self.tree.lookup(p))
            {
                recheck.insert(parent);
            }
        }

        for node in recheck {
            self.refresh_visibility(node);
        }

        self.refresh_bound(&changed, &rendered);

        let dropped = self.tree.clear_orphans();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "cleared unclaimed orphans");
        }

        report.touched = order;
        report.refreshed = changed.into_iter().collect();
        report.stats = self.tree.take_stats();
        debug!(
            touched = report.touched.len(),
            removed = report.removed.len(),
            created = report.stats.created,
            moved = report.stats.moved,
            "cycle complete"
        );

        match corrupt {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    fn remove_chunk(
        &mut self,
        id: &ChunkId,
        changed: &mut BTreeSet<PathRoot>,
        recheck: &mut HashSet<NodeId>,
    ) {
        if let Some(node) = self.tree.lookup(id) {
            if let Some(Container::Node(parent)) = self.tree.node(node).and_then(|n| n.container()) {
                recheck.insert(parent);
            }
            self.tree.orphan_children(node);
            self.tree.remove(node);
        }
        let Some(chunk) = self.model.remove(id) else {
            debug!(chunk = %id, "removed chunk was not in the model");
            return;
        };
        let facets = chunk.facets();
        self.index.forget(id);
        if let Some(name) = &facets.name {
            self.rebind_name(name, id);
            changed.insert(PathRoot::Named(name.clone()));
        }
        trace!(chunk = %id, kind = %chunk.kind(), "removed");
    }

    /// Queue the node's current parent for a visibility check; the chunk may
    /// be about to leave it.
    fn note_parent(&self, id: &ChunkId, recheck: &mut HashSet<NodeId>) {
        if let Some(Container::Node(parent)) = self
            .tree
            .lookup(id)
            .and_then(|node| self.tree.node(node))
            .and_then(|n| n.container())
        {
            recheck.insert(parent);
        }
    }

    fn reindex(
        &mut self,
        id: &ChunkId,
        old: &IndexFacets,
        new: &IndexFacets,
        changed: &mut BTreeSet<PathRoot>,
    ) {
        for tag in old.tags.iter().filter(|t| !new.tags.contains(t)) {
            self.index.untag(tag, id);
        }
        for tag in &new.tags {
            self.index.tag(tag, id);
        }

        if old.name != new.name {
            if let Some(name) = &old.name {
                if self.index.unregister_name(name, id) {
                    self.rebind_name(name, id);
                }
                changed.insert(PathRoot::Named(name.clone()));
            }
        }
        if let Some(name) = &new.name {
            if let Some(previous) = self.index.register_name(name, id) {
                debug!(%name, chunk = %id, superseded = %previous, "name rebound");
            }
            changed.insert(PathRoot::Named(name.clone()));
        }

        if old.executor != new.executor {
            if let Some(key) = &old.executor {
                self.index.unregister_executor(key, id);
            }
        }
        if let Some(key) = &new.executor {
            self.index.register_executor(key, id);
        }
    }

    /// Point `name` at the newest other chunk that carries it, if any.
    fn rebind_name(&mut self, name: &str, gone: &ChunkId) {
        let successor = self
            .model
            .iter()
            .filter(|c| c.id() != gone && c.name() == Some(name))
            .max_by_key(|c| c.serial())
            .map(|c| c.id().clone());
        if let Some(successor) = successor {
            debug!(%name, chunk = %successor, "name falls back");
            self.index.register_name(name, &successor);
        }
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Place `start`, placing any unplaced touched `parent`/`prev` first.
    fn place_with_deps(
        &mut self,
        start: &ChunkId,
        touched: &HashSet<ChunkId>,
        placed: &mut HashSet<ChunkId>,
    ) {
        let mut stack = vec![start.clone()];
        let mut visiting: HashSet<ChunkId> = HashSet::new();
        while let Some(top) = stack.last().cloned() {
            if placed.contains(&top) {
                stack.pop();
                continue;
            }
            visiting.insert(top.clone());
            let dep = self.model.get(&top).and_then(|c| {
                let links = c.links();
                [links.parent.as_ref(), links.prev.as_ref()]
                    .into_iter()
                    .flatten()
                    .find(|d| touched.contains(*d) && !placed.contains(*d) && !visiting.contains(*d))
                    .cloned()
            });
            match dep {
                Some(dep) => stack.push(dep),
                None => {
                    stack.pop();
                    self.place_chunk(&top);
                    placed.insert(top);
                }
            }
        }
    }

    fn place_chunk(&mut self, id: &ChunkId) -> Option<NodeId> {
        let chunk = self.model.get(id)?;
        let kind = chunk.kind();
        let links = chunk.links().clone();

        let node = match self.tree.lookup(id) {
            Some(node) => {
                if self.tree.node(node).map(|n| n.kind()) != Some(kind) {
                    let orphaned = self.tree.retype(node, kind);
                    debug!(chunk = %id, %kind, orphaned, "node changed type");
                }
                node
            }
            None => self.tree.create(id.clone(), kind),
        };
        let position = self.target_position(id, node, &links);
        if self.tree.place(node, position) {
            trace!(chunk = %id, ?position, "placed");
        }
        Some(node)
    }

    fn target_position(&self, id: &ChunkId, node: NodeId, links: &Links) -> Position {
        let container = match &links.parent {
            None => Container::Document,
            Some(parent) => match self.tree.lookup(parent) {
                Some(p) if p != node && self.tree.node(p).is_some_and(|n| n.kind().is_container()) => {
                    Container::Node(p)
                }
                _ => {
                    warn!(chunk = %id, %parent, "dangling parent; placing at document start");
                    return Position::Front(Container::Document);
                }
            },
        };

        let mut prev = links.prev.clone();
        let mut hops = 0;
        while let Some(p) = prev {
            if links.parent.as_ref() == Some(&p) {
                return Position::Front(container);
            }
            if let Some(sibling) = self.tree.lookup(&p) {
                let sits_with_us = self
                    .tree
                    .node(sibling)
                    .is_some_and(|n| n.container() == Some(container));
                if sibling != node && sits_with_us {
                    return Position::After(sibling);
                }
            }
            match self.model.get(&p) {
                Some(_) if hops >= self.model.len() => break,
                Some(c) => {
                    prev = c.links().prev.clone();
                    hops += 1;
                }
                None => {
                    warn!(chunk = %id, prev = %p, "dangling prev; placing at document start");
                    return Position::Front(Container::Document);
                }
            }
        }
        Position::Front(container)
    }

    // ========================================================================
    // Rendering and bindings
    // ========================================================================

    fn render_node(&mut self, node: NodeId) {
        let Some(chunk_id) = self.tree.node(node).map(|n| n.chunk().clone()) else {
            return;
        };
        let ctx = RenderContext {
            model: &self.model,
            index: &self.index,
            globals: &self.globals,
        };
        let Some(chunk) = self.model.get(&chunk_id) else {
            return;
        };
        let markup = self.renderer.render(chunk, &ctx);
        let bindings = markup.as_ref().map(scan).unwrap_or_default();
        let shown = bindings.iter().map(|b| evaluate(b, &ctx)).collect();
        if let Some(n) = self.tree.node_mut(node) {
            n.markup = markup;
            n.bindings = bindings;
            n.shown = shown;
        }
        self.tree.note_rendered();
    }

    /// Hide a container whose properties drawer asks for it.
    fn refresh_visibility(&mut self, node: NodeId) {
        let Some(n) = self.tree.node(node) else {
            return;
        };
        if !n.kind().is_container() {
            return;
        }
        let hidden = n.children().iter().any(|child| {
            self.tree
                .node(*child)
                .and_then(|c| self.model.get(c.chunk()))
                .and_then(Chunk::drawer)
                .is_some_and(|d| d.hides_parent())
        });
        if let Some(n) = self.tree.node_mut(node) {
            n.hidden = hidden;
        }
    }

    /// Re-evaluate bindings and re-render views that read any of `changed`.
    fn refresh_bound(&mut self, changed: &BTreeSet<PathRoot>, skip: &HashSet<NodeId>) {
        if changed.is_empty() {
            return;
        }
        let ctx = RenderContext {
            model: &self.model,
            index: &self.index,
            globals: &self.globals,
        };

        let stale: Vec<NodeId> = self
            .tree
            .iter()
            .filter(|(id, node)| {
                !skip.contains(id)
                    && !node.updating
                    && node.bindings.iter().any(|b| changed.contains(b.path.root()))
            })
            .map(|(id, _)| id)
            .collect();
        for id in stale {
            let shown: Vec<String> = match self.tree.node(id) {
                Some(node) => node.bindings.iter().map(|b| evaluate(b, &ctx)).collect(),
                None => continue,
            };
            if let Some(node) = self.tree.node_mut(id) {
                node.shown = shown;
            }
        }

        for view in self.views.values_mut() {
            let root = PathRoot::Named(view.name.clone());
            let reads_changed =
                changed.contains(&root) || view.bindings.iter().any(|b| changed.contains(b.path.root()));
            if reads_changed {
                render_view(view, &ctx);
            }
        }
    }

    /// Re-render views and bound values for the given names.
    pub fn refresh_views(&mut self, names: &[&str]) {
        let changed: BTreeSet<PathRoot> = names
            .iter()
            .map(|n| PathRoot::Named((*n).to_string()))
            .collect();
        self.refresh_bound(&changed, &HashSet::new());
    }

    /// Add a view over the named cell `name`, rendered immediately.
    pub fn add_view<F>(&mut self, name: impl Into<String>, template: F) -> ViewId
    where
        F: Fn(Option<&Value>, &RenderContext<'_>) -> Markup + Send + Sync + 'static,
    {
        let id = ViewId(self.next_view);
        self.next_view += 1;
        let mut view = LiveView {
            name: name.into(),
            template: Box::new(template),
            markup: Markup::text(""),
            bindings: Vec::new(),
            shown: Vec::new(),
            renders: 0,
        };
        render_view(&mut view, &self.context());
        self.views.insert(id, view);
        id
    }

    pub fn view(&self, id: ViewId) -> Option<&LiveView> {
        self.views.get(&id)
    }

    pub fn remove_view(&mut self, id: ViewId) -> bool {
        self.views.shift_remove(&id).is_some()
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.globals.set(name.clone(), value);
        let changed = BTreeSet::from([PathRoot::Global(name)]);
        self.refresh_bound(&changed, &HashSet::new());
    }

    /// Current value of binding `slot` on `node`.
    pub fn binding_value(&self, node: NodeId, slot: usize) -> BindingResult<Value> {
        let binding = self.binding(node, slot)?;
        binding::get(&binding.path, &self.context())
    }

    fn binding(&self, node: NodeId, slot: usize) -> BindingResult<&Binding> {
        self.tree
            .node(node)
            .and_then(|n| n.bindings.get(slot))
            .ok_or(BindingError::NoSuchBinding {
                node: node.index(),
                index: slot,
            })
    }

    /// Build the whole-value write that sets binding `slot` on `node` to `leaf`.
    pub fn prepare_write(&self, node: NodeId, slot: usize, leaf: Value) -> BindingResult<BindingWrite> {
        let binding = self.binding(node, slot)?;
        binding::prepare_write(binding, &self.context(), leaf)
    }

    /// Apply a write that stays local. Named writes must go through the
    /// session; this only handles globals.
    pub fn commit_local(&mut self, write: BindingWrite) -> Option<BindingWrite> {
        match write {
            BindingWrite::Global { name, value } => {
                self.set_global(name, value);
                None
            }
            named => Some(named),
        }
    }

    /// Mark `node` as having a local write in flight. Remote updates to its
    /// chunk are not rendered until [`Engine::end_local_write`].
    pub fn begin_local_write(&mut self, node: NodeId) -> bool {
        match self.tree.node_mut(node) {
            Some(n) => {
                n.updating = true;
                true
            }
            None => false,
        }
    }

    pub fn end_local_write(&mut self, node: NodeId) {
        if let Some(n) = self.tree.node_mut(node) {
            n.updating = false;
        }
    }

    /// Transient UI state for the node of chunk `id`.
    pub fn node_state_mut(&mut self, id: &ChunkId) -> Option<&mut IndexMap<String, Value>> {
        let node = self.tree.lookup(id)?;
        self.tree.node_mut(node).map(|n| &mut n.state)
    }

    /// Derived kind of chunk `id`, if known.
    pub fn kind_of(&self, id: &ChunkId) -> Option<ChunkKind> {
        self.model.get(id).map(Chunk::kind)
    }
}

impl<R> std::fmt::Debug for Engine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("serial", &self.serial)
            .field("chunks", &self.model.len())
            .field("nodes", &self.tree.len())
            .field("views", &self.views.len())
            .finish_non_exhaustive()
    }
}

fn evaluate(binding: &Binding, source: &impl ValueSource) -> String {
    match binding::get(&binding.path, source) {
        Ok(value) => display_string(&value),
        Err(err) => {
            trace!(%err, "binding has no value");
            String::new()
        }
    }
}

fn render_view(view: &mut LiveView, ctx: &RenderContext<'_>) {
    let value = ctx.named(&view.name);
    view.markup = (view.template)(value, ctx);
    view.bindings = scan(&view.markup);
    view.shown = view.bindings.iter().map(|b| evaluate(b, ctx)).collect();
    view.renders += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use leisure_types::LinkPatch;
    use serde_json::json;

    fn hl(id: &str, text: &str) -> WireChunk {
        WireChunk::new(id, ChunkKind::Headline, text)
    }

    fn text(id: &str, body: &str) -> WireChunk {
        WireChunk::new(id, ChunkKind::Text, body)
    }

    fn named_source(id: &str, name: &str, value: Value) -> WireChunk {
        WireChunk::new(
            id,
            ChunkKind::Source,
            format!("#+name: {name}\n#+begin_src json\n{value}\n#+end_src\n"),
        )
    }

    #[test]
    fn test_load_places_children_inside_headlines() {
        let mut engine = Engine::new();
        engine
            .load(vec![
                hl("h1", "* One\n"),
                text("t1", "body\n").with_parent("h1").with_prev("h1"),
                hl("h2", "* Two\n").with_prev("h1"),
            ])
            .unwrap();

        let tree = engine.tree();
        let h1 = tree.lookup(&"h1".into()).unwrap();
        let t1 = tree.lookup(&"t1".into()).unwrap();
        let h2 = tree.lookup(&"h2".into()).unwrap();
        assert_eq!(tree.roots(), &[h1, h2]);
        assert_eq!(tree.node(h1).unwrap().children(), &[t1]);
        assert_eq!(engine.document_text(), "* One\nbody\n* Two\n");
    }

    #[test]
    fn test_unsorted_snapshot_still_in_order() {
        let mut engine = Engine::new();
        engine
            .load(vec![
                text("c", "c\n").with_prev("b"),
                text("b", "b\n").with_prev("a"),
                text("a", "a\n"),
            ])
            .unwrap();
        assert_eq!(engine.document_text(), "a\nb\nc\n");
    }

    #[test]
    fn test_dangling_prev_goes_to_front() {
        let mut engine = Engine::new();
        engine
            .load(vec![text("a", "a\n"), text("b", "b\n").with_prev("ghost")])
            .unwrap();
        assert_eq!(engine.document_text(), "b\na\n");
    }

    #[test]
    fn test_serial_increases_on_every_apply() {
        let mut engine = Engine::new();
        let first = engine.apply(&ChunkDiff::default()).unwrap().serial;
        let second = engine.apply(&ChunkDiff::default()).unwrap().serial;
        assert!(second > first);
    }

    #[test]
    fn test_removal_clears_index() {
        let mut engine = Engine::new();
        engine
            .load(vec![named_source("s1", "counter", json!({"n": 1}))])
            .unwrap();
        assert!(engine.named("counter").is_some());
        engine
            .apply(&ChunkDiff {
                removed: vec!["s1".into()],
                ..Default::default()
            })
            .unwrap();
        assert!(engine.named("counter").is_none());
        assert!(engine.tree().is_empty());
    }

    #[test]
    fn test_corrupt_chunk_reported_after_cycle() {
        let mut engine = Engine::new();
        let err = engine
            .load(vec![text("ok", "fine\n"), hl("bad", "no stars\n").with_prev("ok")])
            .unwrap_err();
        assert_eq!(
            err,
            ChunkError::Corrupt {
                id: "bad".into(),
                kind: ChunkKind::Headline
            }
        );
        // the rest of the cycle still ran
        assert!(engine.node_for(&"ok".into()).is_some());
    }

    #[test]
    fn test_properties_drawer_hides_headline() {
        let mut engine = Engine::new();
        engine
            .load(vec![
                hl("h", "* Secret\n"),
                WireChunk::new("d", ChunkKind::Drawer, ":PROPERTIES:\n:hidden: t\n:END:\n")
                    .with_parent("h")
                    .with_prev("h"),
            ])
            .unwrap();
        let h = engine.node_for(&"h".into()).unwrap();
        assert!(engine.tree().node(h).unwrap().hidden);

        engine
            .apply(&ChunkDiff {
                removed: vec!["d".into()],
                ..Default::default()
            })
            .unwrap();
        assert!(!engine.tree().node(h).unwrap().hidden);
    }

    #[test]
    fn test_moved_drawer_unhides_old_parent() {
        let mut engine = Engine::new();
        engine
            .load(vec![
                hl("h1", "* One\n"),
                WireChunk::new("d", ChunkKind::Drawer, ":PROPERTIES:\n:hidden: t\n:END:\n")
                    .with_parent("h1")
                    .with_prev("h1"),
                hl("h2", "* Two\n").with_prev("h1"),
            ])
            .unwrap();
        let h1 = engine.node_for(&"h1".into()).unwrap();
        let h2 = engine.node_for(&"h2".into()).unwrap();
        assert!(engine.tree().node(h1).unwrap().hidden);

        let mut patch = LinkPatch::new();
        patch.insert("parent".into(), Some(json!("h2")));
        patch.insert("prev".into(), Some(json!("h2")));
        engine
            .apply(&ChunkDiff {
                linked: [(ChunkId::new("d"), patch)].into_iter().collect(),
                ..Default::default()
            })
            .unwrap();

        let tree = engine.tree();
        assert!(tree.node(h1).unwrap().children().is_empty());
        assert!(!tree.node(h1).unwrap().hidden);
        assert!(tree.node(h2).unwrap().hidden);
    }

    #[test]
    fn test_corrupt_update_keeps_serial_and_drops_index() {
        let mut engine = Engine::new();
        engine
            .load(vec![WireChunk::new(
                "s",
                ChunkKind::Source,
                "#+name: counter\n#+begin_src json :tags ui\n{\"n\": 1}\n#+end_src\n",
            )])
            .unwrap();
        let loaded = engine.chunk(&"s".into()).unwrap().serial();
        assert!(engine.named("counter").is_some());
        assert_eq!(engine.tagged_any(&["ui"]).len(), 1);

        let err = engine
            .apply(&ChunkDiff {
                changed: vec![WireChunk::new("s", ChunkKind::Source, "not a block\n")],
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ChunkError::Corrupt { .. }));

        let s = engine.chunk(&"s".into()).unwrap();
        assert!(s.serial() >= loaded);
        assert!(s.data().is_none());
        assert!(engine.named("counter").is_none());
        assert!(engine.tagged_any(&["ui"]).is_empty());
        assert!(engine.executor("anything").is_none());
    }

    #[test]
    fn test_global_binding_refresh() {
        let mut engine = Engine::new();
        engine.renderer_mut().register("text", |_, _| {
            Some(Markup::element("span").attr(binding::SHOW_ATTR, "@user"))
        });
        engine.set_global("user", json!("ada"));
        engine.load(vec![text("t", "x\n")]).unwrap();
        let node = engine.node_for(&"t".into()).unwrap();
        assert_eq!(engine.tree().node(node).unwrap().shown, vec!["ada"]);

        engine.set_global("user", json!("grace"));
        assert_eq!(engine.tree().node(node).unwrap().shown, vec!["grace"]);
    }

    #[test]
    fn test_kind_change_orphans_and_reclaims() {
        let mut engine = Engine::new();
        engine
            .load(vec![
                hl("h", "* H\n"),
                text("t", "t\n").with_parent("h").with_prev("h"),
            ])
            .unwrap();

        // h becomes text; t moves to top level after it
        engine
            .apply(&ChunkDiff {
                changed: vec![text("h", "H\n"), text("t", "t\n").with_prev("h")],
                ..Default::default()
            })
            .unwrap();
        let tree = engine.tree();
        let h = tree.lookup(&"h".into()).unwrap();
        let t = tree.lookup(&"t".into()).unwrap();
        assert_eq!(tree.roots(), &[h, t]);
        assert_eq!(tree.node(h).unwrap().kind(), ChunkKind::Text);
        assert!(tree.orphans().is_empty());
    }
}
