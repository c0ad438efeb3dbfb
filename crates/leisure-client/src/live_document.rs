//! A session bound to a local engine.
//!
//! [`LiveDocument`] owns the glue between a [`SessionClient`] and an
//! [`Engine`]: connect loads the snapshot, every update goes through
//! [`LiveDocument::apply`], and binding writes round-trip through the
//! session's set operation.
//!
//! The engine sits behind a `parking_lot` mutex that is never held across
//! an await, so user edits can be submitted while the drive loop is waiting
//! on a poll.

use std::sync::Arc;

use leisure_chunks::{BindingWrite, CycleReport, Engine, NodeId};
use leisure_types::{ChunkId, Edit, Replacement, Snapshot, WireChunk};
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::plain::PlainDocument;
use crate::session::{SessionClient, Update};
use crate::transport::{HttpTransport, Transport};

pub struct LiveDocument<T = HttpTransport> {
    client: Arc<SessionClient<T>>,
    engine: Arc<Mutex<Engine>>,
    plain: Mutex<Option<PlainDocument>>,
}

impl<T: Transport> LiveDocument<T> {
    pub fn new(client: Arc<SessionClient<T>>) -> Self {
        Self::with_engine(client, Engine::new())
    }

    /// Use a pre-configured engine, e.g. one with templates registered.
    pub fn with_engine(client: Arc<SessionClient<T>>, engine: Engine) -> Self {
        Self {
            client,
            engine: Arc::new(Mutex::new(engine)),
            plain: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<SessionClient<T>> {
        &self.client
    }

    /// Lock the engine. Do not hold the guard across an await.
    pub fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock()
    }

    pub fn shared_engine(&self) -> Arc<Mutex<Engine>> {
        Arc::clone(&self.engine)
    }

    pub fn is_plain(&self) -> bool {
        self.plain.lock().is_some()
    }

    /// The document as this client currently sees it.
    pub fn text(&self) -> String {
        match &*self.plain.lock() {
            Some(doc) => doc.text().to_string(),
            None => self.engine.lock().document_text(),
        }
    }

    /// Connect and load the initial snapshot.
    pub async fn connect(&self) -> ClientResult<()> {
        match self.client.connect().await? {
            Snapshot::Chunks(chunks) => {
                *self.plain.lock() = None;
                let report = self.engine.lock().load(chunks)?;
                info!(nodes = report.stats.created, "document loaded");
            }
            Snapshot::Plain(text) => {
                *self.plain.lock() = Some(PlainDocument::new(text));
            }
        }
        Ok(())
    }

    /// Apply one update from the session.
    pub fn apply(&self, update: Update) -> ClientResult<Option<CycleReport>> {
        match update {
            Update::Diff(diff) => Ok(Some(self.engine.lock().apply(&diff)?)),
            Update::Text(edit) => {
                let mut plain = self.plain.lock();
                let doc = plain.get_or_insert_with(PlainDocument::default);
                doc.apply(&edit.replacements);
                Ok(None)
            }
        }
    }

    /// Run one poll cycle with an empty batch.
    pub async fn sync_once(&self) -> ClientResult<bool> {
        self.client
            .cycle(&mut Edit::empty, &mut |update| self.apply(update).map(|_| ()))
            .await
    }

    /// Drive the session until it fails. Returns the error that ended it.
    pub async fn run(&self) -> ClientError {
        self.client
            .drive(Edit::empty, |update| self.apply(update).map(|_| ()))
            .await
    }

    /// Submit a batch and apply its consequence.
    pub async fn edit(&self, edit: &Edit) -> ClientResult<()> {
        let update = self.client.edit(edit).await?;
        self.apply(update)?;
        Ok(())
    }

    /// Replace bytes `start..end` of chunk `id`'s text with `text`, sent as a
    /// whole-chunk replacement.
    pub async fn replace_chunk_span(
        &self,
        id: &ChunkId,
        start: usize,
        end: usize,
        text: &str,
    ) -> ClientResult<()> {
        let replaced = {
            let engine = self.engine.lock();
            let chunk = engine
                .chunk(id)
                .ok_or_else(|| leisure_chunks::ChunkError::UnknownChunk(id.clone()))?;
            let current = chunk.text();
            let (Some(head), Some(tail)) = (
                current.get(..start).filter(|_| start <= end),
                current.get(end..),
            ) else {
                return Err(ClientError::InvalidSpan {
                    id: id.clone(),
                    start,
                    end,
                });
            };
            format!("{head}{text}{tail}")
        };
        debug!(chunk = %id, start, end, "replacing chunk span");
        self.edit(&Edit::unselected(vec![Replacement::chunk(id.clone(), replaced)]))
            .await
    }

    /// Current value of a named data cell, from the server.
    pub async fn get(&self, name: &str) -> ClientResult<Value> {
        self.client.get(name).await
    }

    /// Replace a named value and show the acknowledged chunk.
    pub async fn set(&self, name: &str, value: &Value) -> ClientResult<()> {
        if let Some(chunk) = self.client.set(name, value).await? {
            self.show_acknowledged(chunk)?;
        }
        Ok(())
    }

    /// Write through value binding `slot` on `node`.
    ///
    /// Globals are updated locally. Named cells are sent whole to the server
    /// while the node is marked as updating, so a poll that lands meanwhile
    /// does not re-render it.
    pub async fn write_binding(&self, node: NodeId, slot: usize, leaf: Value) -> ClientResult<()> {
        let named = {
            let mut engine = self.engine.lock();
            let write = engine.prepare_write(node, slot, leaf)?;
            match engine.commit_local(write) {
                Some(BindingWrite::Named { name, value }) => {
                    engine.begin_local_write(node);
                    (name, value)
                }
                _ => return Ok(()),
            }
        };
        let (name, value) = named;

        let result = self.client.set(&name, &value).await;
        self.engine.lock().end_local_write(node);
        if let Some(chunk) = result? {
            self.show_acknowledged(chunk)?;
        }
        Ok(())
    }

    fn show_acknowledged(&self, chunk: WireChunk) -> ClientResult<()> {
        let report = self.engine.lock().apply_chunk(chunk)?;
        debug!(refreshed = report.refreshed.len(), "set acknowledged");
        Ok(())
    }

    pub async fn close(&self) -> ClientResult<()> {
        self.client.close().await
    }
}
