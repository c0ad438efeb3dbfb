//! Per-kind derivation of chunk fields from text.
//!
//! Each [`ChunkKind`] has one deriver in [`DERIVERS`], looked up by
//! [`ChunkKind::index`]. A deriver returns `None` when the text does not have
//! the shape its kind requires; the model turns that into
//! [`ChunkError::Corrupt`](crate::ChunkError::Corrupt).
//!
//! ```text
//! headline   * Title            stars gap title rest
//! source     #+name: x          name? label content end results?
//!            #+begin_src js :tags a b
//!            ...
//!            #+end_src
//! block      #+begin_quote      label content end trailer
//! drawer     :PROPERTIES:       label content end
//! keyword    #+title: Foo       name value
//! table      | a | b |          name? rows
//! text       anything           body
//! ```

use std::sync::LazyLock;

use indexmap::IndexMap;
use leisure_types::ChunkKind;
use regex::Regex;
use serde_json::Value;
use strum::EnumCount;
use tracing::debug;

use crate::chunk::{
    Block, ChunkData, Drawer, Headline, Keyword, Source, Span, Table, Text,
};

static HEADLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\A(\*+)([ \t]+)([^\n]*)(.*)\z").expect("headline regex"));

static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)\A",
        r"(?:#\+name:[ \t]*([^\n]*?)[ \t]*\n)?",
        r".*?",
        r"((?m:^)[ \t]*#\+begin_src[ \t]*([^ \t\n]*)([^\n]*))(?:\n|\z)",
        r"(.*?)",
        r"((?m:^)[ \t]*#\+end_src[^\n]*(?:\n|\z))",
        r".*?",
        r"((?m:^)[ \t]*#\+results?:.*)?",
        r"\z",
    ))
    .expect("source regex")
});

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)\A",
        r"([ \t]*#\+begin_([^ \t\n]+)[^\n]*)\n",
        r"(.*?)",
        r"((?m:^)[ \t]*#\+end_[^\n]*(?:\n|\z))",
        r"(.*)\z",
    ))
    .expect("block regex")
});

static DRAWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)\A",
        r"([ \t]*:([^:\n]+):[ \t]*)\n",
        r"(.*?)",
        r"((?m:^)[ \t]*:end:[ \t]*(?:\n|\z))",
        r".*\z",
    ))
    .expect("drawer regex")
});

static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*:([^:\n]+):[ \t]*([^\n]*?)[ \t]*$").expect("property regex")
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A[ \t]*#\+([^:\s]+):[ \t]*([^\n]*?)[ \t]*(?:\n.*)?\z").expect("keyword regex")
});

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\A(?:#\+name:[ \t]*([^\n]*?)[ \t]*\n)?([ \t]*\|.*?)\s*\z")
        .expect("table regex")
});

/// Input to a deriver: the chunk text and the wire-supplied value, if any.
#[derive(Clone, Copy, Debug)]
pub struct DeriveInput<'a> {
    pub text: &'a str,
    pub value: Option<&'a Value>,
}

type Deriver = fn(DeriveInput<'_>) -> Option<ChunkData>;

/// Derivers in [`ChunkKind`] declaration order.
static DERIVERS: [Deriver; ChunkKind::COUNT] = [
    derive_headline,
    derive_text,
    derive_block,
    derive_source,
    derive_drawer,
    derive_keyword,
    derive_table,
];

/// Derive the fields of a chunk of `kind` from its text.
pub fn derive(kind: ChunkKind, input: DeriveInput<'_>) -> Option<ChunkData> {
    DERIVERS[kind.index()](input)
}

/// CSS class bucket for a headline level.
pub fn hl_class(level: usize) -> String {
    if level < 5 {
        format!("leisure-hl-{level}")
    } else {
        "leisure-hl-deep".to_string()
    }
}

fn derive_headline(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = HEADLINE_RE.captures(input.text)?;
    let stars = Span::from(caps.get(1)?);
    let title = Span::from(caps.get(3)?);
    Some(ChunkData::Headline(Headline {
        level: stars.len(),
        stars,
        gap: caps.get(2)?.into(),
        title,
        rest: caps.get(4)?.into(),
        title_str: title.slice(input.text).to_string(),
        hl_class: hl_class(stars.len()),
    }))
}

fn derive_text(input: DeriveInput<'_>) -> Option<ChunkData> {
    Some(ChunkData::Text(Text {
        body: Span::new(0, input.text.len()),
    }))
}

fn derive_block(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = BLOCK_RE.captures(input.text)?;
    let content = Span::from(caps.get(3)?);
    Some(ChunkData::Block(Block {
        block_type: caps.get(2)?.as_str().to_ascii_lowercase(),
        label: caps.get(1)?.into(),
        content,
        end_marker: caps.get(4)?.into(),
        trailer: caps.get(5)?.into(),
        content_str: content.slice(input.text).to_string(),
    }))
}

fn derive_source(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = SOURCE_RE.captures(input.text)?;
    let name_span = caps.get(1).map(Span::from).filter(|s| !s.is_empty());
    let name = name_span.map(|s| s.slice(input.text).to_string());
    let label = caps.get(2)?;
    let language = caps.get(3)?.as_str().to_ascii_lowercase();
    let options: Vec<String> = caps
        .get(4)?
        .as_str()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let content = Span::from(caps.get(5)?);
    let content_str = content.slice(input.text).to_string();
    let tags = option_tags(&options);
    let executor = option_after(&options, ":exec").map(str::to_string);
    let value = match input.value {
        Some(v) => Some(v.clone()),
        None if name.is_some() => parse_value(&language, &content_str),
        None => None,
    };

    Some(ChunkData::Source(Source {
        name,
        name_span,
        src_start: label.start(),
        language,
        options,
        label: label.into(),
        content,
        end_marker: caps.get(6)?.into(),
        results: caps.get(7).map(Span::from),
        content_str,
        value,
        tags,
        executor,
    }))
}

fn derive_drawer(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = DRAWER_RE.captures(input.text)?;
    let name = caps.get(2)?.as_str().trim().to_string();
    let content = Span::from(caps.get(3)?);
    let mut properties = IndexMap::new();
    if name.eq_ignore_ascii_case("properties") {
        for prop in PROPERTY_RE.captures_iter(content.slice(input.text)) {
            let (Some(key), Some(value)) = (prop.get(1), prop.get(2)) else {
                continue;
            };
            properties.insert(key.as_str().trim().to_ascii_lowercase(), value.as_str().to_string());
        }
    }
    Some(ChunkData::Drawer(Drawer {
        name,
        label: caps.get(1)?.into(),
        content,
        end_marker: caps.get(4)?.into(),
        properties,
    }))
}

fn derive_keyword(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = KEYWORD_RE.captures(input.text)?;
    Some(ChunkData::Keyword(Keyword {
        name: caps.get(1)?.as_str().to_ascii_lowercase(),
        value: caps.get(2)?.as_str().to_string(),
    }))
}

fn derive_table(input: DeriveInput<'_>) -> Option<ChunkData> {
    let caps = TABLE_RE.captures(input.text)?;
    let (name, name_start, name_end) = match caps.get(1).filter(|m| !m.is_empty()) {
        Some(m) => (Some(m.as_str().to_string()), m.start(), m.end()),
        None => (None, 0, 0),
    };
    let rows = caps.get(2)?;
    let cells: Vec<Vec<String>> = rows
        .as_str()
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|') && !line.starts_with("|-"))
        .map(split_row)
        .collect();
    let values = cells
        .iter()
        .map(|row| row.iter().map(|cell| cell_value(cell)).collect())
        .collect();
    Some(ChunkData::Table(Table {
        name,
        name_start,
        name_end,
        tbl_start: rows.start(),
        tbl_end: rows.end(),
        cells,
        values,
    }))
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// Interpret a table cell as an integer, float, boolean, or string.
fn cell_value(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = cell.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

fn option_after<'o>(options: &'o [String], key: &str) -> Option<&'o str> {
    let pos = options.iter().position(|o| o.eq_ignore_ascii_case(key))?;
    options.get(pos + 1).map(String::as_str).filter(|v| !v.starts_with(':'))
}

/// Tokens following `:tags`, up to the next `:key`.
fn option_tags(options: &[String]) -> Vec<String> {
    let Some(pos) = options.iter().position(|o| o.eq_ignore_ascii_case(":tags")) else {
        return Vec::new();
    };
    options[pos + 1..]
        .iter()
        .take_while(|o| !o.starts_with(':'))
        .cloned()
        .collect()
}

/// Parse the stored value of a named data source by language.
fn parse_value(language: &str, content: &str) -> Option<Value> {
    let parsed = match language {
        "json" => serde_json::from_str(content).map_err(|e| e.to_string()),
        "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        _ => return None,
    };
    parsed
        .inspect_err(|error| debug!(%language, %error, "source content is not a value"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(kind: ChunkKind, text: &str) -> Option<ChunkData> {
        derive(kind, DeriveInput { text, value: None })
    }

    #[test]
    fn test_headline_levels_and_class() {
        let Some(ChunkData::Headline(h)) = run(ChunkKind::Headline, "** Two\n") else {
            panic!("headline should parse");
        };
        assert_eq!(h.level, 2);
        assert_eq!(h.title_str, "Two");
        assert_eq!(h.hl_class, "leisure-hl-2");
        assert_eq!(h.rest.slice("** Two\n"), "\n");

        let Some(ChunkData::Headline(deep)) = run(ChunkKind::Headline, "****** Deep") else {
            panic!("deep headline should parse");
        };
        assert_eq!(deep.hl_class, "leisure-hl-deep");
    }

    #[test]
    fn test_headline_without_stars_is_corrupt() {
        assert!(run(ChunkKind::Headline, "not a headline\n").is_none());
    }

    #[test]
    fn test_named_json_source() {
        let text = "#+name: counter\n#+begin_src json :tags ui shared :exec js\n{\"items\": [0, 1, 5]}\n#+end_src\n";
        let Some(ChunkData::Source(s)) = run(ChunkKind::Source, text) else {
            panic!("source should parse");
        };
        assert_eq!(s.name.as_deref(), Some("counter"));
        assert_eq!(s.language, "json");
        assert_eq!(s.tags, vec!["ui", "shared"]);
        assert_eq!(s.executor.as_deref(), Some("js"));
        assert_eq!(s.value, Some(json!({"items": [0, 1, 5]})));
        assert_eq!(s.content_str, "{\"items\": [0, 1, 5]}\n");
        assert_eq!(&text[s.src_start..s.src_start + 11], "#+begin_src");
        assert!(s.results.is_none());
    }

    #[test]
    fn test_yaml_source_and_results() {
        let text = "#+NAME: cfg\n#+BEGIN_SRC yaml\na: 1\n#+END_SRC\n#+RESULTS:\n: 1\n";
        let Some(ChunkData::Source(s)) = run(ChunkKind::Source, text) else {
            panic!("source should parse");
        };
        assert_eq!(s.value, Some(json!({"a": 1})));
        assert!(s.results.is_some());
    }

    #[test]
    fn test_wire_value_wins() {
        let text = "#+name: n\n#+begin_src json\n1\n#+end_src\n";
        let wire = json!(42);
        let Some(ChunkData::Source(s)) = derive(
            ChunkKind::Source,
            DeriveInput {
                text,
                value: Some(&wire),
            },
        ) else {
            panic!("source should parse");
        };
        assert_eq!(s.value, Some(json!(42)));
    }

    #[test]
    fn test_unnamed_source_has_no_value() {
        let text = "#+begin_src json\n1\n#+end_src\n";
        let Some(ChunkData::Source(s)) = run(ChunkKind::Source, text) else {
            panic!("source should parse");
        };
        assert!(s.name.is_none());
        assert!(s.value.is_none());
    }

    #[test]
    fn test_source_without_end_is_corrupt() {
        assert!(run(ChunkKind::Source, "#+begin_src js\nx\n").is_none());
    }

    #[test]
    fn test_block_spans() {
        let text = "#+begin_quote\nhello\n#+end_quote\n";
        let Some(ChunkData::Block(b)) = run(ChunkKind::Block, text) else {
            panic!("block should parse");
        };
        assert_eq!(b.block_type, "quote");
        assert_eq!(b.content_str, "hello\n");
        assert_eq!(b.label.slice(text), "#+begin_quote");
    }

    #[test]
    fn test_properties_drawer() {
        let text = ":PROPERTIES:\n:Hidden: t\n:custom: some value\n:END:\n";
        let Some(ChunkData::Drawer(d)) = run(ChunkKind::Drawer, text) else {
            panic!("drawer should parse");
        };
        assert!(d.is_properties());
        assert_eq!(d.properties.get("hidden").map(String::as_str), Some("t"));
        assert_eq!(d.properties.get("custom").map(String::as_str), Some("some value"));
        assert!(d.hides_parent());
    }

    #[test]
    fn test_keyword() {
        let Some(ChunkData::Keyword(k)) = run(ChunkKind::Keyword, "#+TITLE: My Doc\n") else {
            panic!("keyword should parse");
        };
        assert_eq!(k.name, "title");
        assert_eq!(k.value, "My Doc");
    }

    #[test]
    fn test_table_cells() {
        let text = "#+name: t\n| a | 1 |\n|---+---|\n| b | 2.5 |\n";
        let Some(ChunkData::Table(t)) = run(ChunkKind::Table, text) else {
            panic!("table should parse");
        };
        assert_eq!(t.name.as_deref(), Some("t"));
        assert_eq!(&text[t.name_start..t.name_end], "t");
        assert_eq!(t.cells, vec![vec!["a", "1"], vec!["b", "2.5"]]);
        assert_eq!(t.values[0][1], json!(1));
        assert_eq!(t.values[1][1], json!(2.5));
    }

    #[test]
    fn test_text_always_derives() {
        assert!(matches!(run(ChunkKind::Text, ""), Some(ChunkData::Text(_))));
    }
}
