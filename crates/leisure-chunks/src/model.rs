//! The chunk model: every chunk the client knows, keyed by id.
//!
//! Derivation is lazy and idempotent. A chunk carries the [`Serial`] of the
//! generation that last derived it, and [`ChunkModel::derive`] is a no-op when
//! asked to derive again in the same generation.

use std::collections::HashMap;

use leisure_types::{ChunkId, LinkPatch, Serial, WireChunk};
use tracing::{trace, warn};

use crate::chunk::Chunk;
use crate::derive::{DeriveInput, derive};
use crate::error::{ChunkError, ChunkResult};

/// Outcome of [`ChunkModel::ingest`].
#[derive(Debug)]
pub enum Ingested {
    /// A new entity was created.
    Created,
    /// The existing entity was updated in place.
    Updated,
    /// The kind changed: a new entity replaced the returned one.
    Replaced(Chunk),
}

/// Outcome of [`ChunkModel::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derived {
    /// Already derived in this generation.
    Skipped,
    /// Derived fields were recomputed.
    Fresh,
}

#[derive(Debug, Default)]
pub struct ChunkModel {
    chunks: HashMap<ChunkId, Chunk>,
}

impl ChunkModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &ChunkId) -> Option<&Chunk> {
        self.chunks.get(id)
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.chunks.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Store a raw record, creating or updating its entity.
    ///
    /// A record whose kind differs from the stored entity replaces it with a
    /// fresh one. The old entity is returned untouched.
    pub fn ingest(&mut self, raw: WireChunk) -> Ingested {
        let id = raw.id.clone();
        match self.chunks.get(&id).map(Chunk::kind) {
            Some(kind) if kind == raw.kind => {
                if let Some(existing) = self.chunks.get_mut(&id) {
                    *existing.record_mut() = raw;
                    // Text may have changed; force re-derivation.
                    existing.invalidate();
                }
                Ingested::Updated
            }
            _ => match self.chunks.insert(id.clone(), Chunk::from_record(raw)) {
                Some(old) => {
                    trace!(%id, from = %old.kind(), "chunk kind changed");
                    Ingested::Replaced(old)
                }
                None => Ingested::Created,
            },
        }
    }

    /// Patch link fields of an existing chunk. Returns `false` when the chunk
    /// is unknown.
    pub fn relink(&mut self, id: &ChunkId, patch: &LinkPatch) -> bool {
        let Some(chunk) = self.chunks.get_mut(id) else {
            return false;
        };
        let record = chunk.record_mut();
        for (field, value) in patch {
            if let Err(error) = record.patch_field(field, value.as_ref()) {
                warn!(%id, %field, %error, "ignoring malformed link patch");
            }
        }
        true
    }

    /// Mark a chunk as current for `serial` without re-deriving.
    pub fn stamp(&mut self, id: &ChunkId, serial: Serial) {
        if let Some(chunk) = self.chunks.get_mut(id) {
            chunk.set_serial(serial);
        }
    }

    /// Derive fields for `id` unless already derived in generation `serial`.
    pub fn derive(&mut self, id: &ChunkId, serial: Serial) -> ChunkResult<Derived> {
        let chunk = self
            .chunks
            .get_mut(id)
            .ok_or_else(|| ChunkError::UnknownChunk(id.clone()))?;
        if chunk.serial() == serial && chunk.data().is_some() {
            return Ok(Derived::Skipped);
        }
        let record = chunk.record();
        let data = derive(
            record.kind,
            DeriveInput {
                text: &record.text,
                value: record.value.as_ref(),
            },
        )
        .ok_or_else(|| ChunkError::Corrupt {
            id: id.clone(),
            kind: record.kind,
        })?;
        chunk.set_data(data, serial);
        Ok(Derived::Fresh)
    }

    /// Ingest and derive in one step. Repeating it in the same generation
    /// leaves the entity unchanged.
    pub fn populate(&mut self, raw: WireChunk, serial: Serial) -> ChunkResult<&Chunk> {
        let id = raw.id.clone();
        let unchanged = self
            .chunks
            .get(&id)
            .is_some_and(|c| c.serial() == serial && c.data().is_some() && c.record() == &raw);
        if !unchanged {
            self.ingest(raw);
            self.derive(&id, serial)?;
        }
        self.chunks.get(&id).ok_or(ChunkError::UnknownChunk(id))
    }

    pub fn remove(&mut self, id: &ChunkId) -> Option<Chunk> {
        self.chunks.remove(id)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leisure_types::ChunkKind;

    fn headline(id: &str, text: &str) -> WireChunk {
        WireChunk::new(id, ChunkKind::Headline, text)
    }

    #[test]
    fn test_populate_is_idempotent() {
        let mut model = ChunkModel::new();
        let serial = Serial::ZERO.next();
        let first = model.populate(headline("h1", "* One\n"), serial).unwrap().clone();
        let second = model.populate(headline("h1", "* One\n"), serial).unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(model.derive(&"h1".into(), serial).unwrap(), Derived::Skipped);
    }

    #[test]
    fn test_kind_change_replaces_entity() {
        let mut model = ChunkModel::new();
        model.ingest(headline("c", "* One\n"));
        let outcome = model.ingest(WireChunk::new("c", ChunkKind::Text, "plain\n"));
        let Ingested::Replaced(old) = outcome else {
            panic!("expected replacement");
        };
        assert_eq!(old.kind(), ChunkKind::Headline);
        assert_eq!(old.text(), "* One\n");
        assert_eq!(model.get(&"c".into()).unwrap().kind(), ChunkKind::Text);
    }

    #[test]
    fn test_corrupt_text_is_reported() {
        let mut model = ChunkModel::new();
        model.ingest(headline("bad", "no stars\n"));
        let err = model.derive(&"bad".into(), Serial::ZERO.next()).unwrap_err();
        assert_eq!(
            err,
            ChunkError::Corrupt {
                id: "bad".into(),
                kind: ChunkKind::Headline
            }
        );
    }

    #[test]
    fn test_update_never_rewinds_serial() {
        let mut model = ChunkModel::new();
        let first = Serial::ZERO.next();
        model.populate(headline("h", "* H\n"), first).unwrap();

        // same generation, new text: still re-derived
        model.populate(headline("h", "* Renamed\n"), first).unwrap();
        let h = model.get(&"h".into()).unwrap();
        assert_eq!(h.headline().unwrap().title_str, "Renamed");
        assert_eq!(h.serial(), first);

        model.ingest(headline("h", "no stars\n"));
        let h = model.get(&"h".into()).unwrap();
        assert_eq!(h.serial(), first);
        assert!(h.data().is_none());

        assert!(model.derive(&"h".into(), first.next()).is_err());
        let h = model.get(&"h".into()).unwrap();
        assert_eq!(h.serial(), first);
        assert!(h.data().is_none());
    }

    #[test]
    fn test_relink_patches_only_links() {
        let mut model = ChunkModel::new();
        model.ingest(headline("h", "* H\n"));
        let mut patch = LinkPatch::new();
        patch.insert("prev".into(), Some(serde_json::json!("a")));
        assert!(model.relink(&"h".into(), &patch));
        let chunk = model.get(&"h".into()).unwrap();
        assert_eq!(chunk.links().prev.as_ref().map(ChunkId::as_str), Some("a"));
        assert_eq!(chunk.text(), "* H\n");
        assert!(!model.relink(&"missing".into(), &patch));
    }
}
