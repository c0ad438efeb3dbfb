//! End-to-end reconciliation scenarios over the public engine API.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use leisure_chunks::{BIND_ATTR, BindingWrite, ChunkModel, Engine, Markup, PathRoot, SHOW_ATTR};
use leisure_types::{ChunkDiff, ChunkId, ChunkKind, LinkPatch, Serial, WireChunk};
use serde_json::{Value, json};

fn id(s: &str) -> ChunkId {
    ChunkId::new(s)
}

fn source(id: &str, name: &str, options: &str, body: &str) -> WireChunk {
    WireChunk::new(
        id,
        ChunkKind::Source,
        format!("#+name: {name}\n#+begin_src json {options}\n{body}\n#+end_src\n"),
    )
}

/// A small document: two headlines, body text, a named source, a table.
fn sample() -> Vec<WireChunk> {
    vec![
        WireChunk::new("k", ChunkKind::Keyword, "#+TITLE: Sample\n"),
        WireChunk::new("h1", ChunkKind::Headline, "* First\n").with_prev("k"),
        WireChunk::new("t1", ChunkKind::Text, "Some *bold* text.\n")
            .with_parent("h1")
            .with_prev("h1"),
        source("s1", "counter", ":tags ui shared", r#"{"items": [0, 1, 5]}"#)
            .with_parent("h1")
            .with_prev("t1"),
        WireChunk::new("h2", ChunkKind::Headline, "* Second\n").with_prev("h1"),
        WireChunk::new("tb", ChunkKind::Table, "| a | 1 |\n| b | 2 |\n")
            .with_parent("h2")
            .with_prev("h2"),
    ]
}

const SAMPLE_TEXT: &str = "#+TITLE: Sample\n* First\nSome *bold* text.\n#+name: counter\n#+begin_src json :tags ui shared\n{\"items\": [0, 1, 5]}\n#+end_src\n* Second\n| a | 1 |\n| b | 2 |\n";

fn loaded() -> Engine {
    let mut engine = Engine::new();
    engine.load(sample()).expect("sample loads");
    engine
}

#[test]
fn text_coverage_reproduces_document() {
    let engine = loaded();
    assert_eq!(engine.document_text(), SAMPLE_TEXT);
}

#[test]
fn text_coverage_after_reversed_snapshot() {
    let mut engine = Engine::new();
    let mut chunks = sample();
    chunks.reverse();
    engine.load(chunks).unwrap();
    assert_eq!(engine.document_text(), SAMPLE_TEXT);
}

#[test]
fn idempotent_population() {
    let mut model = ChunkModel::new();
    let serial = Serial::ZERO.next();
    let raw = source("s", "n", "", "1");
    let first = model.populate(raw.clone(), serial).unwrap().clone();
    let second = model.populate(raw, serial).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(second.serial(), serial);
}

#[test]
fn empty_diff_is_structurally_stable() {
    let mut engine = loaded();
    let before = engine.tree().preorder();
    let report = engine.apply(&ChunkDiff::default()).unwrap();
    assert!(report.stats.is_quiet());
    assert_eq!(report.stats.rendered, 0);
    assert_eq!(engine.tree().preorder(), before);
}

#[test]
fn headline_child_stays_inside_on_change() {
    let mut engine = Engine::new();
    engine
        .load(vec![
            WireChunk::new("h1", ChunkKind::Headline, "* A\n"),
            WireChunk::new("t1", ChunkKind::Text, "b\n")
                .with_parent("h1")
                .with_prev("h1"),
        ])
        .unwrap();

    let report = engine
        .apply(&ChunkDiff {
            changed: vec![WireChunk::new("t1", ChunkKind::Text, "b changed\n")
                .with_parent("h1")
                .with_prev("h1")],
            ..Default::default()
        })
        .unwrap();

    let tree = engine.tree();
    let h1 = tree.lookup(&id("h1")).unwrap();
    let t1 = tree.lookup(&id("t1")).unwrap();
    assert_eq!(tree.node(h1).unwrap().children(), &[t1]);
    assert_eq!(tree.roots(), &[h1]);
    assert_eq!(report.stats.moved, 0);
    assert_eq!(report.stats.created, 0);
    assert_eq!(report.stats.rendered, 1);
}

#[test]
fn linked_patch_moves_without_rederiving() {
    let mut engine = loaded();
    let serial_before = engine.chunk(&id("tb")).unwrap().serial();

    // move the table under the first headline, after the source
    let mut patch = LinkPatch::new();
    patch.insert("parent".into(), Some(json!("h1")));
    patch.insert("prev".into(), Some(json!("s1")));
    let mut diff = ChunkDiff::default();
    diff.linked.insert(id("tb"), patch);
    let report = engine.apply(&diff).unwrap();

    let tb = engine.chunk(&id("tb")).unwrap();
    assert_eq!(tb.serial(), report.serial);
    assert!(tb.serial() > serial_before);
    let tree = engine.tree();
    let h1 = tree.lookup(&id("h1")).unwrap();
    assert_eq!(tree.node(h1).unwrap().children().len(), 3);
    assert_eq!(report.stats.moved, 1);
}

#[test]
fn tag_index_matches_derivation() {
    let mut engine = loaded();
    assert_eq!(engine.tagged_all(&["ui", "shared"]), BTreeSet::from([id("s1")]));

    // retag: drop "shared", add "hot"
    engine
        .apply(&ChunkDiff {
            changed: vec![
                source("s1", "counter", ":tags ui hot", r#"{"items": [0, 1, 5]}"#)
                    .with_parent("h1")
                    .with_prev("t1"),
            ],
            ..Default::default()
        })
        .unwrap();

    assert!(engine.tagged_any(&["shared"]).is_empty());
    assert_eq!(engine.tagged_any(&["hot", "nope"]), BTreeSet::from([id("s1")]));

    assert_tags_consistent(&engine);

    engine
        .apply(&ChunkDiff {
            removed: vec![id("s1")],
            ..Default::default()
        })
        .unwrap();
    assert!(engine.tagged_any(&["ui", "hot"]).is_empty());
    assert_tags_consistent(&engine);
}

/// `id ∈ index[t] ⇔ t ∈ tags(chunk[id])`, checked from both sides.
fn assert_tags_consistent(engine: &Engine) {
    for chunk in engine.model().iter() {
        for tag in chunk.facets().tags {
            assert!(engine.index().tagged(&tag).any(|t| t == chunk.id()), "{tag} misses {}", chunk.id());
        }
    }
    for tag in engine.index().tags() {
        for tagged in engine.index().tagged(tag) {
            let chunk = engine.chunk(tagged).expect("tagged chunk is in the model");
            assert!(
                chunk.facets().tags.iter().any(|t| t == tag),
                "{tagged} indexed under {tag} but does not carry it"
            );
        }
    }
}

#[test]
fn advisory_order_sets_processing_sequence() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new();
    let log = Arc::clone(&seen);
    engine.renderer_mut().register("text", move |chunk, _| {
        log.lock().unwrap().push(chunk.id().clone());
        Some(Markup::text(chunk.text()))
    });
    engine
        .load(vec![
            WireChunk::new("a", ChunkKind::Text, "a\n"),
            WireChunk::new("b", ChunkKind::Text, "b\n").with_prev("a"),
            WireChunk::new("c", ChunkKind::Text, "c\n").with_prev("b"),
        ])
        .unwrap();
    seen.lock().unwrap().clear();

    let report = engine
        .apply(&ChunkDiff {
            changed: vec![
                WireChunk::new("a", ChunkKind::Text, "A\n"),
                WireChunk::new("b", ChunkKind::Text, "B\n").with_prev("a"),
                WireChunk::new("c", ChunkKind::Text, "C\n").with_prev("b"),
            ],
            order: Some(vec![id("c"), id("a")]),
            ..Default::default()
        })
        .unwrap();

    // listed ids first, in the given order; the rest keep diff order
    let expected = vec![id("c"), id("a"), id("b")];
    assert_eq!(report.touched, expected);
    assert_eq!(*seen.lock().unwrap(), expected);
    // order never rewrites prev links
    assert_eq!(engine.document_text(), "A\nB\nC\n");
    assert_eq!(report.stats.moved, 0);
}

#[test]
fn latest_source_wins_a_name() {
    let mut engine = loaded();
    engine
        .apply(&ChunkDiff {
            added: vec![source("s2", "counter", "", r#"{"items": []}"#).with_prev("h2")],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(engine.named("counter").unwrap().id(), &id("s2"));

    // removing the newer one falls back to the older
    engine
        .apply(&ChunkDiff {
            removed: vec![id("s2")],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(engine.named("counter").unwrap().id(), &id("s1"));
}

#[test]
fn set_round_trip_refreshes_views() {
    let mut engine = Engine::new();
    engine
        .load(vec![source("s", "counter", "", r#"{"n": 1}"#)])
        .unwrap();

    let view = engine.add_view("counter", |value, _| {
        let n = value.and_then(|v| v.get("n")).cloned().unwrap_or(Value::Null);
        Markup::element("span").child(Markup::text(n.to_string()))
    });
    assert_eq!(engine.view(view).unwrap().markup.to_html(), "<span>1</span>");

    // the chunk as a set("counter", {n: 2}) acknowledgement returns it
    let acked = WireChunk::new(
        "s",
        ChunkKind::Source,
        "#+name: counter\n#+begin_src json\n{\"n\": 2}\n#+end_src\n",
    )
    .with_value(json!({"n": 2}));
    let report = engine.apply_chunk(acked).unwrap();

    assert_eq!(engine.value("counter"), Some(&json!({"n": 2})));
    assert!(report.refreshed.contains(&PathRoot::Named("counter".into())));
    let view = engine.view(view).unwrap();
    assert_eq!(view.markup.to_html(), "<span>2</span>");
    assert_eq!(view.renders, 2);
}

#[test]
fn copy_on_write_binding_submits_whole_value() {
    let mut engine = Engine::new();
    engine.renderer_mut().register("text", |_, _| {
        Some(
            Markup::element("div")
                .child(Markup::element("span").attr(SHOW_ATTR, "counter.items[2]"))
                .child(Markup::element("input").attr(BIND_ATTR, "counter.items[2]"))
                .child(Markup::element("input").attr(BIND_ATTR, "counter.items[")),
        )
    });
    engine
        .load(vec![
            source("s", "counter", "", r#"{"items": [0, 1, 5]}"#),
            WireChunk::new("t", ChunkKind::Text, "widget\n").with_prev("s"),
        ])
        .unwrap();

    let node = engine.node_for(&id("t")).unwrap();
    let rendered = engine.tree().node(node).unwrap();
    // the malformed binding is skipped, the cycle still completes
    assert_eq!(rendered.bindings.len(), 2);
    assert_eq!(rendered.shown, vec!["5", "5"]);

    let write = engine.prepare_write(node, 1, json!(9)).unwrap();
    assert_eq!(
        write,
        BindingWrite::Named {
            name: "counter".into(),
            value: json!({"items": [0, 1, 9]}),
        }
    );
    assert!(engine.prepare_write(node, 0, json!(9)).is_err());
    // preparing a write changes nothing locally
    assert_eq!(engine.value("counter"), Some(&json!({"items": [0, 1, 5]})));
}

#[test]
fn in_flight_write_suppresses_echo_render() {
    let mut engine = Engine::new();
    engine
        .load(vec![source("s", "counter", "", r#"{"n": 1}"#)])
        .unwrap();
    let node = engine.node_for(&id("s")).unwrap();
    assert!(engine.begin_local_write(node));

    let report = engine
        .apply(&ChunkDiff {
            changed: vec![source("s", "counter", "", r#"{"n": 7}"#)],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(report.deferred, vec![id("s")]);
    assert_eq!(report.stats.rendered, 0);

    engine.end_local_write(node);
    let report = engine
        .apply(&ChunkDiff {
            changed: vec![source("s", "counter", "", r#"{"n": 8}"#)],
            ..Default::default()
        })
        .unwrap();
    assert!(report.deferred.is_empty());
    assert_eq!(report.stats.rendered, 1);
}
