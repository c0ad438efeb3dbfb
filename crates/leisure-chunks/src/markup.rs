//! Rendered markup produced by templates.
//!
//! A small owned element tree. Binding attributes (`data-show`, `data-bind`)
//! are found by walking it; [`Markup::to_html`] serializes it for display.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;

/// Inline `*bold*` and `/italic/` runs.
static INLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*[^*\n]+\*|/[^/\n]+/").expect("inline markup regex"));

#[derive(Clone, Debug, PartialEq)]
pub enum Markup {
    Text(String),
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<Markup>,
    },
}

impl Markup {
    pub fn text(s: impl Into<String>) -> Self {
        Markup::Text(s.into())
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Markup::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder: set an attribute. No-op on text nodes.
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Markup::Element { attrs, .. } = &mut self {
            attrs.insert(key.into(), value.into());
        }
        self
    }

    /// Builder: append a child. No-op on text nodes.
    pub fn child(mut self, child: Markup) -> Self {
        if let Markup::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    pub fn children(mut self, more: impl IntoIterator<Item = Markup>) -> Self {
        if let Markup::Element { children, .. } = &mut self {
            children.extend(more);
        }
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        match self {
            Markup::Element { attrs, .. } => attrs.get(key).map(String::as_str),
            Markup::Text(_) => None,
        }
    }

    /// Pre-order walk over every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Markup)) {
        f(self);
        if let Markup::Element { children, .. } = self {
            for child in children {
                child.walk(f);
            }
        }
    }

    /// Concatenated text content.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.walk(&mut |node| {
            if let Markup::Text(s) = node {
                out.push_str(s);
            }
        });
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Markup::Text(s) => out.push_str(&escape(s)),
            Markup::Element {
                tag,
                attrs,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (k, v) in attrs {
                    let _ = write!(out, " {k}=\"{}\"", escape(v));
                }
                out.push('>');
                for child in children {
                    child.write_html(out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Turn inline emphasis into `<b>` and `<i>` elements.
///
/// Markers nest: `*a /b/ c*` yields a `<b>` holding an `<i>`.
pub fn render_inline(text: &str) -> Vec<Markup> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in INLINE_RE.find_iter(text) {
        if m.start() > last {
            out.push(Markup::text(&text[last..m.start()]));
        }
        let run = m.as_str();
        let inner = &run[1..run.len() - 1];
        let tag = if run.starts_with('*') { "b" } else { "i" };
        out.push(Markup::element(tag).children(render_inline(inner)));
        last = m.end();
    }
    if last < text.len() {
        out.push(Markup::text(&text[last..]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_bold_and_italic() {
        let html = Markup::element("p")
            .children(render_inline("a *bold* and /it/ end"))
            .to_html();
        assert_eq!(html, "<p>a <b>bold</b> and <i>it</i> end</p>");
    }

    #[test]
    fn test_nested_inline() {
        let html = Markup::element("p").children(render_inline("*x /y/ z*")).to_html();
        assert_eq!(html, "<p><b>x <i>y</i> z</b></p>");
    }

    #[test]
    fn test_escaping() {
        let html = Markup::element("span")
            .attr("title", "\"q\"")
            .child(Markup::text("<a & b>"))
            .to_html();
        assert_eq!(html, "<span title=\"&quot;q&quot;\">&lt;a &amp; b&gt;</span>");
    }
}
