//! Compatibility-graph edges and their release buckets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ports::{GraphQuery, Row};
use crate::value::PropValue;

/// Relation kinds that make up the compatibility graph.
pub const COMPAT_RELATIONS: [&str; 6] = [
    "COMPATIBLE_WITH",
    "SUPPORTS",
    "ADAPTER_SUPPORTS",
    "IMPLEMENTS",
    "CERTIFIES_CONFORMANCE",
    "GOVERNS",
];

const SDK_PREFIX: &str = "registry/SDK_Release/";
const SIDECAR_PREFIX: &str = "registry/Sidecar_Release/";
const ADAPTER_PREFIX: &str = "registry/Adapter_Release/";

const COMPAT_EDGES: &str = "
MATCH (n:RegistryNode {id: $id})-[r]->(m:RegistryNode)
WHERE type(r) IN $relations
RETURN 'out' AS direction, type(r) AS rel_type, m.id AS target_id, properties(r) AS rel_props
UNION ALL
MATCH (m:RegistryNode)-[r]->(n:RegistryNode {id: $id})
WHERE type(r) IN $relations
RETURN 'in' AS direction, type(r) AS rel_type, m.id AS target_id, properties(r) AS rel_props
";

pub(crate) fn edges_query(node_id: &str, graph: Option<String>) -> GraphQuery {
    let relations: Vec<PropValue> = COMPAT_RELATIONS.iter().map(|r| (*r).into()).collect();
    GraphQuery::new("registry.compat_edges", COMPAT_EDGES)
        .param("id", node_id)
        .param("relations", PropValue::List(relations))
        .on_graph(graph)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    In,
    Out,
}

/// One compatibility edge, as seen from the queried node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityEdge {
    pub kind: String,
    pub direction: EdgeDirection,
    pub target_id: String,
    pub properties: BTreeMap<String, PropValue>,
}

/// Edges grouped by the kind of release they point at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatBuckets {
    pub sdks: Vec<CompatibilityEdge>,
    pub sidecars: Vec<CompatibilityEdge>,
    pub adapters: Vec<CompatibilityEdge>,
}

impl CompatBuckets {
    pub fn len(&self) -> usize {
        self.sdks.len() + self.sidecars.len() + self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place an edge into its bucket; unclassified edges are dropped.
    pub fn push(&mut self, edge: CompatibilityEdge) {
        match Bucket::for_target(&edge.target_id) {
            Some(Bucket::Sdks) => self.sdks.push(edge),
            Some(Bucket::Sidecars) => self.sidecars.push(edge),
            Some(Bucket::Adapters) => self.adapters.push(edge),
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Sdks,
    Sidecars,
    Adapters,
}

impl Bucket {
    pub fn for_target(target_id: &str) -> Option<Self> {
        if target_id.starts_with(SDK_PREFIX) {
            Some(Bucket::Sdks)
        } else if target_id.starts_with(SIDECAR_PREFIX) {
            Some(Bucket::Sidecars)
        } else if target_id.starts_with(ADAPTER_PREFIX) {
            Some(Bucket::Adapters)
        } else {
            None
        }
    }
}

/// Decode one edge row. Rows missing a target or carrying an unknown
/// relation kind yield `None`.
pub(crate) fn edge_from_row(row: &Row) -> Option<CompatibilityEdge> {
    let kind = row.get("rel_type")?.as_str()?;
    if !COMPAT_RELATIONS.contains(&kind) {
        return None;
    }
    let target_id = row.get("target_id")?.as_str()?.to_string();
    let direction = match row.get("direction").and_then(PropValue::as_str) {
        Some("in") => EdgeDirection::In,
        _ => EdgeDirection::Out,
    };
    let properties = row
        .get("rel_props")
        .and_then(PropValue::as_map)
        .cloned()
        .unwrap_or_default();
    Some(CompatibilityEdge {
        kind: kind.to_string(),
        direction,
        target_id,
        properties,
    })
}

pub(crate) fn bucket_rows(rows: &[Row]) -> CompatBuckets {
    let mut buckets = CompatBuckets::default();
    for edge in rows.iter().filter_map(edge_from_row) {
        buckets.push(edge);
    }
    buckets
}
