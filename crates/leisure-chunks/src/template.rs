//! Per-kind render functions.
//!
//! The engine calls a [`ChunkRenderer`] for each touched chunk. [`Templates`]
//! is the stock renderer: a registry of functions keyed by kind name, falling
//! back to [`fallback`] for kinds without one. Render functions receive the
//! model, index, and globals through an explicit [`RenderContext`].

use std::collections::HashMap;

use leisure_types::ChunkKind;
use serde_json::Value;

use crate::binding::{Globals, ValueSource};
use crate::chunk::{Chunk, ChunkData};
use crate::index::ChunkIndex;
use crate::markup::{Markup, render_inline};
use crate::model::ChunkModel;

/// Read-only view of engine state handed to render functions.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub model: &'a ChunkModel,
    pub index: &'a ChunkIndex,
    pub globals: &'a Globals,
}

impl<'a> RenderContext<'a> {
    /// The chunk currently registered under `name`.
    pub fn named_chunk(&self, name: &str) -> Option<&'a Chunk> {
        self.index.named(name).and_then(|id| self.model.get(id))
    }
}

impl ValueSource for RenderContext<'_> {
    fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    fn named(&self, name: &str) -> Option<&Value> {
        self.named_chunk(name).and_then(Chunk::value)
    }
}

/// Produces markup for a chunk. `None` means "render nothing".
pub trait ChunkRenderer {
    fn render(&self, chunk: &Chunk, ctx: &RenderContext<'_>) -> Option<Markup>;
}

pub type TemplateFn = Box<dyn Fn(&Chunk, &RenderContext<'_>) -> Option<Markup> + Send + Sync>;

#[derive(Default)]
pub struct Templates {
    by_kind: HashMap<ChunkKind, TemplateFn>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template for the kind named `kind` (`"headline"`, `"source"`, …).
    /// Returns `false` for an unknown kind name.
    pub fn register<F>(&mut self, kind: &str, template: F) -> bool
    where
        F: Fn(&Chunk, &RenderContext<'_>) -> Option<Markup> + Send + Sync + 'static,
    {
        let Some(kind) = ChunkKind::from_str(kind) else {
            return false;
        };
        self.by_kind.insert(kind, Box::new(template));
        true
    }

    pub fn unregister(&mut self, kind: ChunkKind) -> bool {
        self.by_kind.remove(&kind).is_some()
    }

    pub fn has(&self, kind: ChunkKind) -> bool {
        self.by_kind.contains_key(&kind)
    }
}

impl ChunkRenderer for Templates {
    fn render(&self, chunk: &Chunk, ctx: &RenderContext<'_>) -> Option<Markup> {
        match self.by_kind.get(&chunk.kind()) {
            Some(template) => template(chunk, ctx),
            None => fallback(chunk, ctx),
        }
    }
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Generic renderer: inline emphasis for prose, preformatted bodies for code.
pub fn fallback(chunk: &Chunk, _ctx: &RenderContext<'_>) -> Option<Markup> {
    let markup = match chunk.data()? {
        ChunkData::Headline(h) => Markup::element("span")
            .attr("class", format!("leisure-headline {}", h.hl_class))
            .children(render_inline(&h.title_str)),
        ChunkData::Text(t) => Markup::element("span")
            .attr("class", "leisure-text")
            .children(render_inline(t.body.slice(chunk.text()))),
        ChunkData::Block(b) => Markup::element("div")
            .attr("class", format!("leisure-block leisure-block-{}", b.block_type))
            .child(Markup::element("pre").child(Markup::text(&b.content_str))),
        ChunkData::Source(s) => {
            let mut div = Markup::element("div")
                .attr("class", "leisure-source")
                .attr("data-language", &s.language);
            if let Some(name) = &s.name {
                div = div.attr("data-name", name);
            }
            div.child(
                Markup::element("pre").child(
                    Markup::element("code")
                        .attr("class", format!("language-{}", s.language))
                        .child(Markup::text(&s.content_str)),
                ),
            )
        }
        ChunkData::Drawer(d) if d.is_properties() => return None,
        ChunkData::Drawer(d) => Markup::element("div")
            .attr("class", "leisure-drawer")
            .attr("data-drawer", &d.name)
            .child(Markup::text(d.content.slice(chunk.text()))),
        ChunkData::Keyword(k) => Markup::element("div")
            .attr("class", "leisure-keyword")
            .attr("data-keyword", &k.name)
            .child(Markup::text(&k.value)),
        ChunkData::Table(t) => Markup::element("table").children(t.cells.iter().map(|row| {
            Markup::element("tr").children(
                row.iter()
                    .map(|cell| Markup::element("td").child(Markup::text(cell))),
            )
        })),
    };
    Some(markup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leisure_types::{Serial, WireChunk};

    fn render_one(templates: &Templates, raw: WireChunk) -> Option<String> {
        let mut model = ChunkModel::new();
        let id = raw.id.clone();
        model.populate(raw, Serial::ZERO.next()).unwrap();
        let index = ChunkIndex::new();
        let globals = Globals::new();
        let ctx = RenderContext {
            model: &model,
            index: &index,
            globals: &globals,
        };
        templates
            .render(model.get(&id).unwrap(), &ctx)
            .map(|m| m.to_html())
    }

    #[test]
    fn test_fallback_headline() {
        let html = render_one(
            &Templates::new(),
            WireChunk::new("h", ChunkKind::Headline, "* A *b*\n"),
        );
        assert_eq!(
            html.as_deref(),
            Some("<span class=\"leisure-headline leisure-hl-1\">A <b>b</b></span>")
        );
    }

    #[test]
    fn test_registered_template_wins() {
        let mut templates = Templates::new();
        assert!(templates.register("Text", |chunk, _| {
            Some(Markup::element("p").child(Markup::text(chunk.text().trim())))
        }));
        assert!(!templates.register("widget", |_, _| None));
        let html = render_one(&templates, WireChunk::new("t", ChunkKind::Text, "hi\n"));
        assert_eq!(html.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn test_properties_drawer_renders_nothing() {
        let html = render_one(
            &Templates::new(),
            WireChunk::new("d", ChunkKind::Drawer, ":PROPERTIES:\n:hidden: t\n:END:\n"),
        );
        assert!(html.is_none());
    }
}
