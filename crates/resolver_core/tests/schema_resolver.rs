//! SchemaResolver behaviour against a scripted in-memory graph.
//!
//! Query counts come from `MemoryGraph`; expiry is driven with paused tokio
//! time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use resolver_core::memory::{MemoryGraph, MemoryTelemetry};
use resolver_core::ports::Row;
use resolver_core::schema::EdgeDirection;
use resolver_core::{Attribution, PropValue, ResolverError, SchemaResolver, SchemaResolverConfig};

const NODE_BY_ID: &str = "registry.node_by_id";
const LATEST: &str = "registry.nodes_by_type_and_name";
const COMPAT: &str = "registry.compat_edges";

// ── Fixtures ───────────────────────────────────────────────────

fn node_row(name: &str, version: &str) -> Row {
    let mut props = BTreeMap::new();
    props.insert("name".to_string(), PropValue::from(name));
    props.insert("version".to_string(), PropValue::from(version));
    props.insert(
        "schema".to_string(),
        PropValue::from_stored(serde_json::json!("{\"type\":\"object\"}")),
    );
    let mut row = Row::new();
    row.insert("props".into(), PropValue::Map(props));
    row.insert(
        "labels".into(),
        PropValue::from(vec!["RegistryNode", "Event_Schema"]),
    );
    row
}

fn edge_row(direction: &str, rel: &str, target: &str) -> Row {
    let mut row = Row::new();
    row.insert("direction".into(), direction.into());
    row.insert("rel_type".into(), rel.into());
    row.insert("target_id".into(), target.into());
    row
}

fn version_row(id: &str, version: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".into(), id.into());
    row.insert("version".into(), version.into());
    row
}

/// Graph that knows exactly one node: membrane.inject@1.1.
fn registry() -> Arc<MemoryGraph> {
    let graph = Arc::new(MemoryGraph::new());
    graph.on(NODE_BY_ID, |q| {
        if q.param_str("id") == Some("registry/Event_Schema/membrane.inject@1.1") {
            vec![node_row("membrane.inject", "1.1")]
        } else {
            vec![]
        }
    });
    graph
}

fn resolver(graph: Arc<MemoryGraph>, telemetry: Arc<MemoryTelemetry>) -> SchemaResolver {
    SchemaResolver::new(graph, telemetry, SchemaResolverConfig::default())
}

fn who() -> Attribution<'static> {
    Attribution::new(Some("docs-agent"), Some("acme"))
}

// ── Canonicalization ───────────────────────────────────────────

#[tokio::test]
async fn shorthand_resolves_to_canonical_event_schema() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    let node = r
        .resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();

    assert_eq!(node.id, "registry/Event_Schema/membrane.inject@1.1");
    assert_eq!(node.version.as_deref(), Some("1.1"));
    assert!(node.properties["schema"].as_map().is_some());
    assert!(node.compat.is_none());
}

#[tokio::test]
async fn missing_version_raises_before_any_query() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    let err = r
        .resolve_schema_id("tool:summarizer", who(), true)
        .await
        .unwrap_err();

    assert!(matches!(err, ResolverError::VersionRequired(_)));
    assert_eq!(graph.total_calls(), 0);
}

#[tokio::test]
async fn unknown_hint_is_resolution_error() {
    let r = resolver(registry(), Arc::new(MemoryTelemetry::new()));
    let err = r
        .resolve_schema_id("gadget:thing@1.0", who(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::Resolution(_)));
}

// ── Positive cache ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn second_resolve_within_ttl_performs_no_queries() {
    let graph = registry();
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = resolver(graph.clone(), telemetry.clone());

    let first = r
        .resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .unwrap();
    let calls_after_first = graph.total_calls();
    tokio::time::advance(Duration::from_secs(59)).await;
    let second = r
        .resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .unwrap();

    assert_eq!(graph.total_calls(), calls_after_first);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(
        telemetry.kinds(),
        vec![
            "resolver.compat_fetch",
            "resolver.fetch",
            "resolver.hit",
            "resolver.compat_hit"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn positive_entry_expires_after_ttl() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    r.resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    r.resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();

    assert_eq!(graph.calls(NODE_BY_ID), 2);
}

// ── Negative cache ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn missing_ref_queries_once_within_negative_ttl() {
    let graph = registry();
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = resolver(graph.clone(), telemetry.clone());

    for _ in 0..2 {
        let err = r
            .resolve_schema_id("ghost@1.0", who(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::NotFound(_)));
    }

    assert_eq!(graph.total_calls(), 1);
    assert_eq!(
        telemetry.kinds(),
        vec!["resolver.miss", "resolver.negative_hit"]
    );
}

#[tokio::test(start_paused = true)]
async fn negative_entry_expires_and_store_is_requeried() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    let _ = r.resolve_schema_id("ghost@1.0", who(), false).await;
    tokio::time::advance(Duration::from_secs(11)).await;
    let _ = r.resolve_schema_id("ghost@1.0", who(), false).await;

    assert_eq!(graph.calls(NODE_BY_ID), 2);
}

#[tokio::test(start_paused = true)]
async fn explicit_invalidate_reveals_newly_created_node() {
    let graph = Arc::new(MemoryGraph::new());
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));
    assert!(r.resolve_schema_id("fresh@1.0", who(), false).await.is_err());

    graph.respond(NODE_BY_ID, vec![node_row("fresh", "1.0")]);
    assert!(r.invalidate("registry/Event_Schema/fresh@1.0"));

    let node = r.resolve_schema_id("fresh@1.0", who(), false).await.unwrap();
    assert_eq!(node.name, "fresh");
}

// ── Failures never touch the caches ────────────────────────────

#[tokio::test(start_paused = true)]
async fn timeout_is_not_a_negative_hit() {
    let graph = registry();
    let r = SchemaResolver::new(
        graph.clone(),
        Arc::new(MemoryTelemetry::new()),
        SchemaResolverConfig::default().with_query_timeout(Duration::from_millis(100)),
    );

    graph.set_delay(Some(Duration::from_secs(1)));
    let err = r
        .resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    graph.set_delay(None);
    let node = r
        .resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();
    assert_eq!(node.name, "membrane.inject");
    assert_eq!(graph.calls(NODE_BY_ID), 2);
}

#[tokio::test]
async fn upstream_failure_is_not_cached() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    graph.set_failure(Some("connection refused"));
    let err = r
        .resolve_schema_id("ghost@1.0", who(), false)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "query_failed");

    graph.set_failure(None);
    let err = r
        .resolve_schema_id("ghost@1.0", who(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::NotFound(_)));
    assert_eq!(graph.calls(NODE_BY_ID), 2);
}

#[tokio::test]
async fn compat_failure_leaves_node_uncached() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    graph.set_query_failure(COMPAT, Some("boom"));
    assert!(r
        .resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .is_err());
    graph.set_query_failure(COMPAT, None);

    r.resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .unwrap();
    assert_eq!(graph.calls(NODE_BY_ID), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_node_survives_compat_failure() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    r.resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();
    graph.set_query_failure(COMPAT, Some("boom"));

    let node = r
        .resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .unwrap();
    assert_eq!(node.id, "registry/Event_Schema/membrane.inject@1.1");
    assert!(node.compat.is_none());
    assert_eq!(graph.calls(NODE_BY_ID), 1);

    // Once the store recovers the edges come back without refetching the node.
    graph.set_query_failure(COMPAT, None);
    let node = r
        .resolve_schema_id("membrane.inject@1.1", who(), true)
        .await
        .unwrap();
    assert!(node.compat.is_some());
    assert_eq!(graph.calls(NODE_BY_ID), 1);
}

// ── resolve_latest ─────────────────────────────────────────────

#[tokio::test]
async fn latest_compares_versions_numerically() {
    let graph = Arc::new(MemoryGraph::new());
    graph.respond(
        LATEST,
        vec![
            version_row("registry/Event_Schema/graph.delta@1.0", "1.0"),
            version_row("registry/Event_Schema/graph.delta@1.10", "1.10"),
            version_row("registry/Event_Schema/graph.delta@1.9", "1.9"),
        ],
    );
    graph.on(NODE_BY_ID, |q| {
        let version = q.param_str("id").and_then(|id| id.rsplit('@').next());
        vec![node_row("graph.delta", version.unwrap_or("0"))]
    });
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));

    let node = r
        .resolve_latest("Event_Schema", "graph.delta", who())
        .await
        .unwrap();

    assert_eq!(node.id, "registry/Event_Schema/graph.delta@1.10");
    let query = graph.last_call(LATEST).unwrap();
    assert_eq!(query.param_str("type_name"), Some("Event_Schema"));
    assert_eq!(query.param_str("name"), Some("graph.delta"));
}

#[tokio::test]
async fn latest_accepts_type_hints() {
    let graph = Arc::new(MemoryGraph::new());
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));
    let _ = r.resolve_latest("envelope", "membrane", who()).await;
    assert_eq!(
        graph.last_call(LATEST).unwrap().param_str("type_name"),
        Some("Envelope_Schema")
    );
}

#[tokio::test]
async fn latest_with_no_candidates_is_not_found() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = resolver(Arc::new(MemoryGraph::new()), telemetry.clone());

    let err = r
        .resolve_latest("Event_Schema", "nothing", who())
        .await
        .unwrap_err();

    assert!(matches!(err, ResolverError::NotFound(_)));
    let events = telemetry.events();
    assert_eq!(events[0].kind.as_str(), "resolver.latest_miss");
    assert_eq!(events[0].subject, "Event_Schema/nothing");
    assert_eq!(events[0].org.as_deref(), Some("acme"));
}

// ── compat_for ─────────────────────────────────────────────────

#[tokio::test]
async fn supports_edge_to_sdk_release_lands_in_sdks() {
    let graph = registry();
    graph.respond(
        COMPAT,
        vec![
            edge_row("out", "SUPPORTS", "registry/SDK_Release/py-sdk@2.0"),
            edge_row("in", "GOVERNS", "registry/Policy/retention"),
        ],
    );
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = resolver(graph.clone(), telemetry.clone());

    let buckets = r
        .compat_for("registry/Event_Schema/membrane.inject@1.1", who())
        .await
        .unwrap();

    assert_eq!(buckets.sdks.len(), 1);
    assert_eq!(buckets.sdks[0].target_id, "registry/SDK_Release/py-sdk@2.0");
    assert_eq!(buckets.sdks[0].direction, EdgeDirection::Out);
    assert!(buckets.sidecars.is_empty());
    assert!(buckets.adapters.is_empty());
    assert_eq!(telemetry.events()[0].edge_count, Some(2));
}

#[tokio::test]
async fn compat_is_cached_independently() {
    let graph = registry();
    let r = resolver(graph.clone(), Arc::new(MemoryTelemetry::new()));
    let id = "registry/Event_Schema/membrane.inject@1.1";

    r.compat_for(id, who()).await.unwrap();
    r.compat_for(id, who()).await.unwrap();
    r.resolve_schema_id(id, who(), true).await.unwrap();

    assert_eq!(graph.calls(COMPAT), 1);
    assert_eq!(graph.calls(NODE_BY_ID), 1);
}

#[tokio::test]
async fn telemetry_carries_caller_and_org() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let r = resolver(registry(), telemetry.clone());
    r.resolve_schema_id("membrane.inject@1.1", who(), false)
        .await
        .unwrap();

    let fetch = &telemetry.events()[0];
    assert_eq!(fetch.kind.as_str(), "resolver.fetch");
    assert_eq!(fetch.caller.as_deref(), Some("docs-agent"));
    assert_eq!(fetch.org.as_deref(), Some("acme"));
}
