//! Shared test doubles: a minimal tree document and a deterministic CRDT
//! engine.
//!
//! `TestDoc` implements the document collaborator surface with the standard
//! position accounting (node boundaries are width-1, text characters are
//! width-1, the root's boundaries are not counted). `TestEngine` implements
//! the engine surface just far enough for two-party tests: identities are
//! minted per engine, sequences merge by element identity, and an element
//! present on only one side is treated as deleted when it was minted by the
//! baseline actor and as inserted otherwise. It is a test double, not a
//! CRDT.

#![allow(dead_code)]

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use prosemerge_core::document::{DocModel, EditBatch, EditOp, NodeSpan, ResolvedPath, Slice, Transaction, TxStep};
use prosemerge_core::engine::{ChangeRecord, ChangeSet, Engine, EngineError, Mutator};
use prosemerge_core::replicated::{Container, ObjId, RepValue, SeqItem, Sequence, TextAtom, TextRun};

pub const ORIGIN: u64 = 70_001;
pub const ALICE: u64 = 70_002;
pub const BOB: u64 = 70_003;

// ---------------------------------------------------------------------------
// Tree document fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TestNode {
    Elem {
        kind: String,
        attrs: Option<Map<String, Value>>,
        children: Vec<TestNode>,
    },
    Text(String),
}

impl TestNode {
    pub fn size(&self) -> usize {
        match self {
            TestNode::Text(text) => text.chars().count(),
            TestNode::Elem { children, .. } => {
                2 + children.iter().map(TestNode::size).sum::<usize>()
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            TestNode::Text(text) => json!({"type": "text", "text": text}),
            TestNode::Elem {
                kind,
                attrs,
                children,
            } => {
                let mut map = Map::new();
                map.insert("type".to_string(), Value::String(kind.clone()));
                if let Some(attrs) = attrs {
                    map.insert("attrs".to_string(), Value::Object(attrs.clone()));
                }
                map.insert(
                    "content".to_string(),
                    Value::Array(children.iter().map(TestNode::to_value).collect()),
                );
                Value::Object(map)
            }
        }
    }

    fn from_value(value: &Value) -> Option<TestNode> {
        if let Some(text) = value.as_str() {
            // Loose characters in a content array read back as text.
            return Some(TestNode::Text(text.to_string()));
        }
        let map = value.as_object()?;
        if let Some(text) = map.get("text").and_then(Value::as_str) {
            return Some(TestNode::Text(text.to_string()));
        }
        let kind = map.get("type")?.as_str()?.to_string();
        let attrs = map.get("attrs").and_then(Value::as_object).cloned();
        let children = match map.get("content") {
            Some(Value::Array(items)) => items
                .iter()
                .map(TestNode::from_value)
                .collect::<Option<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Some(TestNode::Elem {
            kind,
            attrs,
            children,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestDoc {
    pub children: Vec<TestNode>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TestSchema;

impl TestDoc {
    pub fn content_size(&self) -> usize {
        self.children.iter().map(TestNode::size).sum()
    }

    pub fn text_content(&self) -> String {
        fn collect(nodes: &[TestNode], out: &mut String) {
            for node in nodes {
                match node {
                    TestNode::Text(text) => out.push_str(text),
                    TestNode::Elem { children, .. } => collect(children, out),
                }
            }
        }
        let mut out = String::new();
        collect(&self.children, &mut out);
        out
    }

    pub fn apply_edit(&mut self, edit: &EditOp) {
        match edit {
            EditOp::InsertText { at, text } => insert_text(&mut self.children, *at, text),
            EditOp::DeleteRange { from, to } => delete_range(&mut self.children, *from, *to),
        }
    }

    pub fn apply_batch(&mut self, batch: &EditBatch) {
        for edit in &batch.edits {
            self.apply_edit(edit);
        }
    }
}

fn char_to_byte(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(byte, _)| byte)
        .unwrap_or(text.len())
}

fn insert_text(children: &mut Vec<TestNode>, rel: usize, text: &str) {
    enum Landing {
        IntoText(usize, usize),
        Boundary(usize),
        Descend(usize, usize),
        Append,
    }
    let mut landing = Landing::Append;
    let mut acc = 0usize;
    for (i, child) in children.iter().enumerate() {
        let width = child.size();
        match child {
            TestNode::Text(_) => {
                if rel >= acc && rel <= acc + width {
                    landing = Landing::IntoText(i, rel - acc);
                    break;
                }
            }
            TestNode::Elem { .. } => {
                if rel <= acc {
                    landing = Landing::Boundary(i);
                    break;
                }
                if rel < acc + width {
                    landing = Landing::Descend(i, rel - acc - 1);
                    break;
                }
            }
        }
        acc += width;
    }
    match landing {
        Landing::IntoText(i, char_idx) => {
            if let TestNode::Text(s) = &mut children[i] {
                let byte = char_to_byte(s, char_idx);
                s.insert_str(byte, text);
            }
        }
        Landing::Boundary(i) => children.insert(i, TestNode::Text(text.to_string())),
        Landing::Descend(i, inner) => {
            if let TestNode::Elem {
                children: inner_children,
                ..
            } = &mut children[i]
            {
                insert_text(inner_children, inner, text);
            }
        }
        Landing::Append => children.push(TestNode::Text(text.to_string())),
    }
}

fn delete_range(children: &mut Vec<TestNode>, from: usize, to: usize) {
    let mut acc = 0usize;
    let mut i = 0usize;
    while i < children.len() {
        let width = children[i].size();
        let start = acc;
        let end = acc + width;
        if to <= start {
            break;
        }
        if from >= end {
            acc = end;
            i += 1;
            continue;
        }
        if from <= start && to >= end {
            children.remove(i);
            acc = end;
            continue;
        }
        match &mut children[i] {
            TestNode::Text(s) => {
                let lo = char_to_byte(s, from.max(start) - start);
                let hi = char_to_byte(s, to.min(end) - start);
                s.replace_range(lo..hi, "");
            }
            TestNode::Elem {
                children: inner, ..
            } => {
                let inner_from = from.max(start + 1) - (start + 1);
                let inner_to = to.min(end - 1) - (start + 1);
                delete_range(inner, inner_from, inner_to);
            }
        }
        acc = end;
        i += 1;
    }
}

impl DocModel for TestDoc {
    type Schema = TestSchema;

    fn deserialize(_schema: &TestSchema, value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.get("type")?.as_str()? != "doc" {
            return None;
        }
        let children = match map.get("content") {
            Some(Value::Array(items)) => items
                .iter()
                .map(TestNode::from_value)
                .collect::<Option<Vec<_>>>()?,
            _ => Vec::new(),
        };
        Some(TestDoc { children })
    }

    fn serialize(&self) -> Value {
        json!({
            "type": "doc",
            "content": self.children.iter().map(TestNode::to_value).collect::<Vec<_>>(),
        })
    }

    fn resolve_path(&self, offset: usize) -> Option<ResolvedPath> {
        if offset > self.content_size() {
            return None;
        }
        let mut indices = Vec::new();
        let mut children = &self.children;
        let mut rel = offset;
        loop {
            let mut descend: Option<(usize, usize)> = None;
            let mut acc = 0usize;
            for (i, child) in children.iter().enumerate() {
                let width = child.size();
                if rel <= acc {
                    break;
                }
                if rel < acc + width {
                    if let TestNode::Elem { .. } = child {
                        descend = Some((i, rel - acc - 1));
                    }
                    break;
                }
                acc += width;
            }
            let Some((index, inner)) = descend else {
                break;
            };
            indices.push(index);
            rel = inner;
            children = match &children[index] {
                TestNode::Elem { children, .. } => children,
                TestNode::Text(_) => unreachable!("descend only targets elements"),
            };
        }
        Some(ResolvedPath {
            depth: indices.len(),
            indices,
            parent_offset: rel,
        })
    }

    fn node_at(&self, offset: usize) -> Option<NodeSpan> {
        let mut children = &self.children;
        let mut rel = offset;
        loop {
            let mut descend: Option<(&Vec<TestNode>, usize)> = None;
            let mut acc = 0usize;
            for child in children {
                let width = child.size();
                if rel == acc {
                    return Some(NodeSpan { size: width });
                }
                if rel < acc + width {
                    match child {
                        TestNode::Text(_) => return Some(NodeSpan { size: width }),
                        TestNode::Elem {
                            children: inner, ..
                        } => {
                            descend = Some((inner, rel - acc - 1));
                        }
                    }
                    break;
                }
                acc += width;
            }
            let (inner, inner_rel) = descend?;
            children = inner;
            rel = inner_rel;
        }
    }
}

// Builders in the shape of the editor test utilities.

pub fn doc(children: Vec<TestNode>) -> TestDoc {
    TestDoc { children }
}

pub fn p(text: &str) -> TestNode {
    let children = if text.is_empty() {
        Vec::new()
    } else {
        vec![TestNode::Text(text.to_string())]
    };
    TestNode::Elem {
        kind: "paragraph".to_string(),
        attrs: None,
        children,
    }
}

/// Builds a transaction from `(from, to, inserted)` replacement triples,
/// snapshotting the shifting document before each step. Returns the
/// transaction and the document after all steps.
pub fn transaction(origin: &TestDoc, replacements: &[(usize, usize, &str)]) -> (Transaction<TestDoc>, TestDoc) {
    let mut current = origin.clone();
    let mut steps = Vec::new();
    for &(from, to, inserted) in replacements {
        let slice = if inserted.is_empty() {
            Slice::empty()
        } else {
            Slice::text(inserted)
        };
        steps.push(TxStep {
            from,
            to,
            slice,
            doc: current.clone(),
        });
        if to > from {
            current.apply_edit(&EditOp::DeleteRange { from, to });
        }
        if !inserted.is_empty() {
            current.apply_edit(&EditOp::InsertText {
                at: from,
                text: inserted.to_string(),
            });
        }
    }
    (Transaction::new(steps), current)
}

pub fn empty_root() -> RepValue {
    RepValue::Node(Container::default())
}

// ---------------------------------------------------------------------------
// Engine double
// ---------------------------------------------------------------------------

pub struct TestEngine {
    sid: u64,
    baseline_sid: u64,
    next_ctr: u64,
}

impl TestEngine {
    /// `sid` mints this engine's identities; `baseline_sid` is the actor
    /// that seeded the shared origin snapshot, used by the merge rule to
    /// tell deletions from insertions.
    pub fn new(sid: u64, baseline_sid: u64) -> Self {
        TestEngine {
            sid,
            baseline_sid,
            next_ctr: 1,
        }
    }
}

impl Engine for TestEngine {
    fn mutate(&mut self, base: &RepValue, mutator: &mut Mutator<'_>) -> Result<RepValue, EngineError> {
        let mut next = base.clone();
        mutator(&mut next)?;
        assign_ids(&mut next, self.sid, &mut self.next_ctr);
        Ok(next)
    }

    fn diff(&self, old: &RepValue, new: &RepValue) -> Result<ChangeSet, EngineError> {
        let mut out = Vec::new();
        diff_value(old, new, &mut out);
        Ok(out)
    }

    fn merge(&self, ours: &RepValue, theirs: &RepValue) -> Result<RepValue, EngineError> {
        Ok(merge_value(ours, theirs, self.baseline_sid))
    }
}

pub fn assign_ids(value: &mut RepValue, sid: u64, next: &mut u64) {
    fn bump(id: &mut ObjId, sid: u64, next: &mut u64) {
        if !id.is_assigned() {
            *id = ObjId { sid, ctr: *next };
            *next += 1;
        }
    }
    match value {
        RepValue::Scalar(_) => {}
        RepValue::Text(run) => {
            bump(&mut run.id, sid, next);
            for atom in &mut run.atoms {
                bump(&mut atom.id, sid, next);
            }
        }
        RepValue::Seq(seq) => {
            bump(&mut seq.id, sid, next);
            for item in &mut seq.items {
                bump(&mut item.id, sid, next);
                assign_ids(&mut item.value, sid, next);
            }
        }
        RepValue::Node(node) => {
            bump(&mut node.id, sid, next);
            for field in node.fields.values_mut() {
                assign_ids(field, sid, next);
            }
        }
    }
}

fn diff_value(old: &RepValue, new: &RepValue, out: &mut ChangeSet) {
    match (old, new) {
        (RepValue::Node(a), RepValue::Node(b)) => {
            for (key, new_field) in &b.fields {
                match a.fields.get(key) {
                    Some(old_field) => match (old_field, new_field) {
                        (RepValue::Scalar(x), RepValue::Scalar(y)) => {
                            if x != y {
                                out.push(ChangeRecord::Assign {
                                    container: a.id,
                                    key: key.clone(),
                                    value: y.clone(),
                                });
                            }
                        }
                        _ => diff_value(old_field, new_field, out),
                    },
                    None => out.push(ChangeRecord::Assign {
                        container: a.id,
                        key: key.clone(),
                        value: prosemerge_core::convert::from_replicated(new_field),
                    }),
                }
            }
        }
        (RepValue::Text(a), RepValue::Text(b)) => {
            let old_ids: HashSet<ObjId> = a.atoms.iter().map(|atom| atom.id).collect();
            let mut i = 0usize;
            let mut j = 0usize;
            while i < a.atoms.len() || j < b.atoms.len() {
                if i < a.atoms.len() && j < b.atoms.len() && a.atoms[i].id == b.atoms[j].id {
                    i += 1;
                    j += 1;
                    continue;
                }
                if j < b.atoms.len() && !old_ids.contains(&b.atoms[j].id) {
                    out.push(ChangeRecord::Insert {
                        container: a.id,
                        index: j,
                        value: Value::String(b.atoms[j].ch.to_string()),
                    });
                    j += 1;
                    continue;
                }
                out.push(ChangeRecord::Remove {
                    container: a.id,
                    index: j,
                });
                i += 1;
            }
        }
        (RepValue::Seq(a), RepValue::Seq(b)) => {
            let old_ids: HashSet<ObjId> = a.items.iter().map(|item| item.id).collect();
            let mut i = 0usize;
            let mut j = 0usize;
            while i < a.items.len() || j < b.items.len() {
                if i < a.items.len() && j < b.items.len() && a.items[i].id == b.items[j].id {
                    diff_value(&a.items[i].value, &b.items[j].value, out);
                    i += 1;
                    j += 1;
                    continue;
                }
                if j < b.items.len() && !old_ids.contains(&b.items[j].id) {
                    out.push(ChangeRecord::Insert {
                        container: a.id,
                        index: j,
                        value: prosemerge_core::convert::from_replicated(&b.items[j].value),
                    });
                    j += 1;
                    continue;
                }
                out.push(ChangeRecord::Remove {
                    container: a.id,
                    index: j,
                });
                i += 1;
            }
        }
        _ => {}
    }
}

fn merge_value(ours: &RepValue, theirs: &RepValue, baseline: u64) -> RepValue {
    match (ours, theirs) {
        (RepValue::Node(a), RepValue::Node(b)) => {
            let mut node = Container {
                id: a.id,
                fields: a.fields.clone(),
            };
            for (key, their_field) in &b.fields {
                let merged = match a.fields.get(key) {
                    Some(our_field) => merge_value(our_field, their_field, baseline),
                    None => their_field.clone(),
                };
                node.fields.insert(key.clone(), merged);
            }
            RepValue::Node(node)
        }
        (RepValue::Text(a), RepValue::Text(b)) => RepValue::Text(TextRun {
            id: a.id,
            atoms: merge_atoms(&a.atoms, &b.atoms, baseline),
        }),
        (RepValue::Seq(a), RepValue::Seq(b)) => RepValue::Seq(Sequence {
            id: a.id,
            items: merge_items(&a.items, &b.items, baseline),
        }),
        _ => ours.clone(),
    }
}

fn merge_atoms(a: &[TextAtom], b: &[TextAtom], baseline: u64) -> Vec<TextAtom> {
    let a_ids: HashSet<ObjId> = a.iter().map(|atom| atom.id).collect();
    let b_ids: HashSet<ObjId> = b.iter().map(|atom| atom.id).collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;
    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i].id == b[j].id {
            out.push(a[i].clone());
            i += 1;
            j += 1;
            continue;
        }
        let mut a_run = Vec::new();
        while i < a.len() && !b_ids.contains(&a[i].id) {
            a_run.push(a[i].clone());
            i += 1;
        }
        let mut b_run = Vec::new();
        while j < b.len() && !a_ids.contains(&b[j].id) {
            b_run.push(b[j].clone());
            j += 1;
        }
        if a_run.is_empty() && b_run.is_empty() {
            // Crossed ordering; only reachable on inputs that do not share
            // an origin. Keep ours to guarantee progress.
            if i < a.len() {
                out.push(a[i].clone());
                i += 1;
            } else if j < b.len() {
                out.push(b[j].clone());
                j += 1;
            }
            continue;
        }
        a_run.retain(|atom| atom.id.sid != baseline);
        b_run.retain(|atom| atom.id.sid != baseline);
        let b_first = match (a_run.first(), b_run.first()) {
            (Some(x), Some(y)) => y.id < x.id,
            _ => false,
        };
        if b_first {
            out.extend(b_run);
            out.extend(a_run);
        } else {
            out.extend(a_run);
            out.extend(b_run);
        }
    }
    out
}

fn merge_items(a: &[SeqItem], b: &[SeqItem], baseline: u64) -> Vec<SeqItem> {
    let a_ids: HashSet<ObjId> = a.iter().map(|item| item.id).collect();
    let b_ids: HashSet<ObjId> = b.iter().map(|item| item.id).collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut j = 0usize;
    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i].id == b[j].id {
            out.push(SeqItem {
                id: a[i].id,
                value: merge_value(&a[i].value, &b[j].value, baseline),
            });
            i += 1;
            j += 1;
            continue;
        }
        let mut a_run = Vec::new();
        while i < a.len() && !b_ids.contains(&a[i].id) {
            a_run.push(a[i].clone());
            i += 1;
        }
        let mut b_run = Vec::new();
        while j < b.len() && !a_ids.contains(&b[j].id) {
            b_run.push(b[j].clone());
            j += 1;
        }
        if a_run.is_empty() && b_run.is_empty() {
            if i < a.len() {
                out.push(a[i].clone());
                i += 1;
            } else if j < b.len() {
                out.push(b[j].clone());
                j += 1;
            }
            continue;
        }
        a_run.retain(|item| item.id.sid != baseline);
        b_run.retain(|item| item.id.sid != baseline);
        let b_first = match (a_run.first(), b_run.first()) {
            (Some(x), Some(y)) => y.id < x.id,
            _ => false,
        };
        if b_first {
            out.extend(b_run);
            out.extend(a_run);
        } else {
            out.extend(a_run);
            out.extend(b_run);
        }
    }
    out
}
