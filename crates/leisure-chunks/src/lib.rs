//! Chunk model and incremental render-tree reconciliation for live Leisure
//! documents.
//!
//! # Architecture
//!
//! ```text
//! ChunkDiff ──► Engine::apply
//!                 ├── ChunkModel   typed chunks, derived lazily per serial
//!                 ├── ChunkIndex   name → id, tag → ids, exec → id
//!                 ├── RenderTree   nodes placed from prev/parent links
//!                 ├── Templates    per-kind markup, explicit RenderContext
//!                 └── bindings     data-show / data-bind paths, live views
//! ```
//!
//! Everything here is synchronous and single-writer. The network side lives
//! in `leisure-client`.

pub mod binding;
pub mod chunk;
pub mod derive;
pub mod engine;
pub mod error;
pub mod index;
pub mod markup;
pub mod model;
pub mod render;
pub mod template;
pub mod view;

pub use binding::{
    BIND_ATTR, Binding, BindingKind, BindingPath, BindingWrite, Globals, PathRoot, SHOW_ATTR, Step,
    ValueSource,
};
pub use chunk::{
    Block, Chunk, ChunkData, Drawer, Headline, IndexFacets, Keyword, Source, Span, Table, Text,
};
pub use derive::hl_class;
pub use engine::{CycleReport, Engine};
pub use error::{BindingError, BindingResult, ChunkError, ChunkResult};
pub use index::ChunkIndex;
pub use markup::{Markup, render_inline};
pub use model::{ChunkModel, Derived, Ingested};
pub use render::{Container, NodeId, Position, RenderNode, RenderTree, TreeStats};
pub use template::{ChunkRenderer, RenderContext, TemplateFn, Templates};
pub use view::{LiveView, ViewFn, ViewId};

pub use leisure_types as types;
