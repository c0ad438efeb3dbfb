//! Reference and tag indices over the chunk model.
//!
//! | index     | key          | value                |
//! |-----------|--------------|----------------------|
//! | names     | data name    | one chunk id         |
//! | tags      | tag          | set of chunk ids     |
//! | executors | exec key     | one chunk id         |
//!
//! The engine keeps these in step with chunk facets on every change and
//! removal, so a query never returns a removed chunk.

use std::collections::{BTreeSet, HashMap};

use leisure_types::ChunkId;

#[derive(Debug, Default)]
pub struct ChunkIndex {
    names: HashMap<String, ChunkId>,
    tags: HashMap<String, BTreeSet<ChunkId>>,
    executors: HashMap<String, ChunkId>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(&self, name: &str) -> Option<&ChunkId> {
        self.names.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, &ChunkId)> {
        self.names.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Point `name` at `id`, returning the chunk it previously referred to.
    pub fn register_name(&mut self, name: &str, id: &ChunkId) -> Option<ChunkId> {
        self.names
            .insert(name.to_string(), id.clone())
            .filter(|prev| prev != id)
    }

    /// Drop `name` only if it still refers to `id`.
    pub fn unregister_name(&mut self, name: &str, id: &ChunkId) -> bool {
        if self.names.get(name) == Some(id) {
            self.names.remove(name);
            true
        } else {
            false
        }
    }

    pub fn tag(&mut self, tag: &str, id: &ChunkId) {
        self.tags.entry(tag.to_string()).or_default().insert(id.clone());
    }

    pub fn untag(&mut self, tag: &str, id: &ChunkId) {
        if let Some(ids) = self.tags.get_mut(tag) {
            ids.remove(id);
            if ids.is_empty() {
                self.tags.remove(tag);
            }
        }
    }

    /// Every tag currently carried by at least one chunk.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub fn tagged(&self, tag: &str) -> impl Iterator<Item = &ChunkId> {
        self.tags.get(tag).into_iter().flatten()
    }

    /// Chunks carrying every one of `tags`. Empty input yields nothing.
    pub fn all_of<S: AsRef<str>>(&self, tags: &[S]) -> BTreeSet<ChunkId> {
        let mut sets = tags.iter().map(|t| self.tags.get(t.as_ref()));
        let Some(Some(first)) = sets.next() else {
            return BTreeSet::new();
        };
        let mut out = first.clone();
        for set in sets {
            match set {
                Some(set) => out.retain(|id| set.contains(id)),
                None => return BTreeSet::new(),
            }
        }
        out
    }

    /// Chunks carrying any of `tags`. Unknown tags contribute nothing.
    pub fn any_of<S: AsRef<str>>(&self, tags: &[S]) -> BTreeSet<ChunkId> {
        tags.iter()
            .filter_map(|t| self.tags.get(t.as_ref()))
            .flatten()
            .cloned()
            .collect()
    }

    pub fn executor(&self, key: &str) -> Option<&ChunkId> {
        self.executors.get(key)
    }

    pub fn register_executor(&mut self, key: &str, id: &ChunkId) {
        self.executors.insert(key.to_string(), id.clone());
    }

    pub fn unregister_executor(&mut self, key: &str, id: &ChunkId) {
        if self.executors.get(key) == Some(id) {
            self.executors.remove(key);
        }
    }

    /// Remove every entry pointing at `id`.
    pub fn forget(&mut self, id: &ChunkId) {
        self.names.retain(|_, v| v != id);
        self.executors.retain(|_, v| v != id);
        self.tags.retain(|_, ids| {
            ids.remove(id);
            !ids.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.names.clear();
        self.tags.clear();
        self.executors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ChunkId {
        ChunkId::new(s)
    }

    #[test]
    fn test_tag_queries() {
        let mut index = ChunkIndex::new();
        index.tag("ui", &id("a"));
        index.tag("ui", &id("b"));
        index.tag("data", &id("b"));

        assert_eq!(index.all_of(&["ui", "data"]), BTreeSet::from([id("b")]));
        assert_eq!(index.any_of(&["data", "nope"]), BTreeSet::from([id("b")]));
        assert!(index.any_of(&["nope"]).is_empty());
        assert!(index.all_of(&["ui", "nope"]).is_empty());

        index.untag("data", &id("b"));
        assert!(index.tagged("data").next().is_none());
    }

    #[test]
    fn test_unregister_only_matching_owner() {
        let mut index = ChunkIndex::new();
        assert_eq!(index.register_name("x", &id("a")), None);
        assert_eq!(index.register_name("x", &id("b")), Some(id("a")));
        assert!(!index.unregister_name("x", &id("a")));
        assert_eq!(index.named("x"), Some(&id("b")));
        assert!(index.unregister_name("x", &id("b")));
        assert!(index.named("x").is_none());
    }

    #[test]
    fn test_forget_drops_everything() {
        let mut index = ChunkIndex::new();
        index.register_name("n", &id("a"));
        index.register_executor("js", &id("a"));
        index.tag("t", &id("a"));
        index.forget(&id("a"));
        assert!(index.named("n").is_none());
        assert!(index.executor("js").is_none());
        assert!(index.any_of(&["t"]).is_empty());
    }
}
