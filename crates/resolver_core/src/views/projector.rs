//! Project phase: query rows → render-agnostic view model.
//!
//! Every projection sorts its output, so the same underlying data always
//! yields the same `content_digest` regardless of store result order.
//! Rows that land on the same item are merged: lists are unioned, counts
//! summed, and conflicting scalar fields resolve to the least value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use crate::ports::Row;
use crate::value::PropValue;
use crate::views::selector::ViewType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Language, artifact type or knowledge-object type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Named lists of related things (docs, dependencies, schemas).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSection {
    pub heading: String,
    pub items: Vec<ViewItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub view_type: ViewType,
    pub scope_org: String,
    pub scope_path: String,
    pub title: String,
    pub sections: Vec<ViewSection>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summary: BTreeMap<String, i64>,
    pub content_digest: String,
}

impl ViewModel {
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }

    /// JSON form with keys in canonical order.
    pub fn to_canonical_json(&self) -> JsonValue {
        canonicalize_json(&serde_json::to_value(self).unwrap_or(JsonValue::Null))
    }
}

/// Digest input: everything but the digest itself.
#[derive(Serialize)]
struct DigestInput<'a> {
    view_type: ViewType,
    scope_org: &'a str,
    scope_path: &'a str,
    title: &'a str,
    sections: &'a [ViewSection],
    summary: &'a BTreeMap<String, i64>,
}

pub fn project(
    view_type: ViewType,
    scope_org: &str,
    scope_path: &str,
    rows: &[Row],
) -> ViewModel {
    let (sections, summary) = match view_type {
        ViewType::Architecture => (project_architecture(rows), BTreeMap::new()),
        ViewType::ApiReference => (project_api_reference(rows), BTreeMap::new()),
        ViewType::Coverage => project_coverage(rows),
        ViewType::Index => (project_index(rows), BTreeMap::new()),
    };
    let title = format!("{}: {}", view_type.title(), scope_org);

    let content_digest = digest(&DigestInput {
        view_type,
        scope_org,
        scope_path,
        title: &title,
        sections: &sections,
        summary: &summary,
    });

    ViewModel {
        view_type,
        scope_org: scope_org.to_string(),
        scope_path: scope_path.to_string(),
        title,
        sections,
        summary,
        content_digest,
    }
}

// ── per-type projections ──────────────────────────────────────

/// Components grouped by directory; docs and dependencies merged per component.
fn project_architecture(rows: &[Row]) -> Vec<ViewSection> {
    let mut by_dir: BTreeMap<String, BTreeMap<(String, String), ViewItem>> = BTreeMap::new();

    for row in rows {
        let Some(name) = text(row, "name") else { continue };
        let path = text(row, "path").unwrap_or_default();
        let item = by_dir
            .entry(parent_dir(&path))
            .or_default()
            .entry((path.clone(), name.clone()))
            .or_insert_with(|| ViewItem {
                name,
                path: (!path.is_empty()).then(|| path.clone()),
                ..ViewItem::default()
            });
        keep_least(
            &mut item.kind,
            text(row, "language").or_else(|| text(row, "type")),
        );
        merge_links(item, "docs", names(row, "docs"));
        merge_links(item, "depends_on", names(row, "dependencies"));
    }

    sections_from(by_dir)
}

/// Endpoints grouped by module directory.
fn project_api_reference(rows: &[Row]) -> Vec<ViewSection> {
    let mut by_module: BTreeMap<String, BTreeMap<(String, String), ViewItem>> = BTreeMap::new();

    for row in rows {
        let Some(name) = text(row, "name") else { continue };
        let path = text(row, "path").unwrap_or_default();
        let item = by_module
            .entry(parent_dir(&path))
            .or_default()
            .entry((path.clone(), name.clone()))
            .or_insert_with(|| ViewItem {
                name,
                path: (!path.is_empty()).then(|| path.clone()),
                ..ViewItem::default()
            });
        keep_least(&mut item.kind, text(row, "language"));
        keep_least(&mut item.description, text(row, "description"));
        merge_links(item, "documentation", names(row, "documentation"));
        merge_links(item, "schemas", names(row, "schemas"));
    }

    sections_from(by_module)
}

/// Node counts per type plus totals.
fn project_coverage(rows: &[Row]) -> (Vec<ViewSection>, BTreeMap<String, i64>) {
    let mut by_type: BTreeMap<String, ViewItem> = BTreeMap::new();
    for row in rows {
        let name = text(row, "node_type").unwrap_or_else(|| "unknown".to_string());
        let item = by_type.entry(name.clone()).or_insert_with(|| ViewItem {
            name,
            ..ViewItem::default()
        });
        *item.metrics.entry("count".into()).or_default() += int(row, "count");
        *item.metrics.entry("tests".into()).or_default() += int(row, "test_count");
        merge_links(item, "languages", names(row, "languages"));
        merge_links(item, "ko_types", names(row, "ko_types"));
    }
    let mut items: Vec<ViewItem> = by_type.into_values().collect();

    items.sort_by(|a, b| {
        b.metrics["count"]
            .cmp(&a.metrics["count"])
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut summary: BTreeMap<String, i64> = BTreeMap::new();
    summary.insert(
        "total_nodes".to_string(),
        items.iter().map(|i| i.metrics["count"]).sum(),
    );
    summary.insert(
        "tested_artifacts".to_string(),
        items.iter().map(|i| i.metrics["tests"]).sum(),
    );
    summary.insert("node_types".to_string(), items.len() as i64);

    let sections = vec![ViewSection {
        heading: "Node types".to_string(),
        items,
    }];
    (sections, summary)
}

/// Browseable catalog: one section per node label, items by name.
fn project_index(rows: &[Row]) -> Vec<ViewSection> {
    let mut by_label: BTreeMap<String, BTreeMap<(String, String), ViewItem>> = BTreeMap::new();

    for row in rows {
        let Some(name) = text(row, "name") else { continue };
        let path = text(row, "path").unwrap_or_default();
        let label = text(row, "node_label").unwrap_or_else(|| "unknown".to_string());
        let item = by_label
            .entry(label)
            .or_default()
            .entry((name.clone(), path.clone()))
            .or_insert_with(|| ViewItem {
                name,
                path: (!path.is_empty()).then_some(path),
                ..ViewItem::default()
            });
        keep_least(&mut item.kind, text(row, "type_or_language"));
        keep_least(&mut item.description, text(row, "description"));
    }

    sections_from(by_label)
}

// ── helpers ───────────────────────────────────────────────────

fn sections_from<K>(grouped: BTreeMap<String, BTreeMap<K, ViewItem>>) -> Vec<ViewSection> {
    grouped
        .into_iter()
        .map(|(heading, items)| ViewSection {
            heading,
            items: items.into_values().collect(),
        })
        .collect()
}

fn merge_links(item: &mut ViewItem, key: &str, mut values: Vec<String>) {
    if values.is_empty() {
        return;
    }
    let entry = item.links.entry(key.to_string()).or_default();
    entry.append(&mut values);
    entry.sort();
    entry.dedup();
}

fn keep_least(slot: &mut Option<String>, candidate: Option<String>) {
    let Some(candidate) = candidate else { return };
    match slot {
        Some(current) if *current <= candidate => {}
        _ => *slot = Some(candidate),
    }
}

fn text(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        PropValue::String(s) if !s.is_empty() => Some(s.clone()),
        PropValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn int(row: &Row, key: &str) -> i64 {
    row.get(key).and_then(PropValue::as_i64).unwrap_or(0)
}

/// Display names of a list column: plain strings, or node maps with a
/// `name`/`path` (directly or under `properties`).
fn names(row: &Row, key: &str) -> Vec<String> {
    let Some(list) = row.get(key).and_then(PropValue::as_list) else {
        return Vec::new();
    };
    let mut out: Vec<String> = list.iter().filter_map(display_name).collect();
    out.sort();
    out.dedup();
    out
}

fn display_name(value: &PropValue) -> Option<String> {
    match value {
        PropValue::String(s) if !s.is_empty() => Some(s.clone()),
        PropValue::Map(map) => {
            let props = map
                .get("properties")
                .and_then(PropValue::as_map)
                .unwrap_or(map);
            props
                .get("name")
                .or_else(|| props.get("path"))
                .and_then(PropValue::as_str)
                .map(str::to_string)
        }
        _ => None,
    }
}

/// `src/api/routes.rs` → `src/api`; bare names group under `/`.
fn parent_dir(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir.to_string(),
        _ => "/".to_string(),
    }
}

// ── content digest ────────────────────────────────────────────

fn digest<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_value(value).unwrap_or(JsonValue::Null);
    let bytes = serde_json::to_vec(&canonicalize_json(&json)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Recursively sort object keys; arrays keep their order.
pub fn canonicalize_json(v: &JsonValue) -> JsonValue {
    match v {
        JsonValue::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for k in keys {
                if let Some(child) = map.get(k) {
                    sorted.insert(k.clone(), canonicalize_json(child));
                }
            }
            JsonValue::Object(sorted)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(canonicalize_json).collect()),
        other => other.clone(),
    }
}
