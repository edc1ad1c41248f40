//! End-to-end view pipeline: request envelope in, exactly one event out.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use resolver_core::events::{
    FailureEvent, InvalidatedBroadcast, ViewResultEvent, FAILURE_EMIT, VIEW_INVALIDATED,
    VIEW_REQUEST, VIEW_RESULT,
};
use resolver_core::governance::DOCS_NAMESPACE;
use resolver_core::memory::{MemoryBus, MemoryGraph};
use resolver_core::views::{PriceSchedule, Stage};
use resolver_core::{
    Envelope, GovernanceGate, GovernancePolicies, NamespacePolicy, PropValue, Row, ViewOutcome,
    ViewResolver, ViewResolverConfig,
};

const ARCH: &str = "views.architecture";
const INDEX: &str = "views.index";

// ── Fixtures ───────────────────────────────────────────────────

fn artifact(name: &str, path: &str) -> Row {
    let mut row = Row::new();
    row.insert("name".into(), PropValue::from(name));
    row.insert("path".into(), PropValue::from(path));
    row.insert("language".into(), PropValue::from("rust"));
    row.insert("docs".into(), PropValue::from(vec!["ADR-7"]));
    row
}

fn scripted_graph() -> Arc<MemoryGraph> {
    let graph = Arc::new(MemoryGraph::new());
    graph.respond(
        ARCH,
        vec![
            artifact("router", "/src/api/router.rs"),
            artifact("cache", "/src/cache.rs"),
        ],
    );
    graph
}

struct Harness {
    graph: Arc<MemoryGraph>,
    bus: Arc<MemoryBus>,
    resolver: ViewResolver,
}

fn harness_with(policy: NamespacePolicy, config: ViewResolverConfig) -> Harness {
    let graph = scripted_graph();
    let bus = Arc::new(MemoryBus::new());
    let gate = Arc::new(GovernanceGate::new(
        GovernancePolicies::single(DOCS_NAMESPACE, policy),
        PriceSchedule::default(),
    ));
    let resolver = ViewResolver::new(graph.clone(), bus.clone(), gate, config);
    Harness {
        graph,
        bus,
        resolver,
    }
}

fn harness() -> Harness {
    harness_with(NamespacePolicy::default(), ViewResolverConfig::default())
}

fn request(id: &str, view_type: &str, format: &str) -> Envelope {
    Envelope::new(
        VIEW_REQUEST,
        json!({
            "request_id": id,
            "view_type": view_type,
            "scope_org": "acme",
            "scope_path": "/",
            "format": format,
        }),
        "ui.docs",
    )
}

fn failures(bus: &MemoryBus) -> Vec<FailureEvent> {
    bus.on_channel(FAILURE_EMIT)
        .into_iter()
        .map(|e| serde_json::from_value(e.payload).unwrap())
        .collect()
}

fn results(bus: &MemoryBus) -> Vec<ViewResultEvent> {
    bus.on_channel(VIEW_RESULT)
        .into_iter()
        .map(|e| serde_json::from_value(e.payload).unwrap())
        .collect()
}

// ── Happy path ─────────────────────────────────────────────────

#[tokio::test]
async fn architecture_request_emits_one_priced_result() {
    let h = harness();

    let outcome = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    assert!(outcome.is_emitted());
    assert_eq!(h.bus.published().len(), 1);
    let result = &results(&h.bus)[0];
    assert_eq!(result.request_id, "r-1");
    assert_eq!(result.view_type, "architecture");
    assert_eq!(result.price.currency, "$MIND");
    assert!(result.content_digest.starts_with("sha256:"));

    let payload: serde_json::Value = serde_json::from_str(&result.payload).unwrap();
    assert_eq!(payload["content_digest"], result.content_digest.as_str());
    assert_eq!(h.graph.last_call(ARCH).unwrap().param_str("scope_org"), Some("acme"));
}

#[tokio::test]
async fn second_request_is_a_cache_hit_with_identical_digest() {
    let h = harness();

    let first = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;
    let second = h
        .resolver
        .handle_request(&request("r-2", "architecture", "markdown"))
        .await;

    assert_eq!(h.graph.calls(ARCH), 1);
    match (first, second) {
        (
            ViewOutcome::Emitted {
                content_digest: a,
                cache_hit: false,
                ..
            },
            ViewOutcome::Emitted {
                content_digest: b,
                cache_hit: true,
                ..
            },
        ) => assert_eq!(a, b),
        other => panic!("unexpected outcomes: {other:?}"),
    }
    assert!(results(&h.bus)[1].payload.starts_with("# Architecture: acme"));
}

#[tokio::test]
async fn identical_graph_state_yields_identical_digest_across_resolvers() {
    let a = harness();
    let b = harness();

    a.resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;
    b.resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    assert_eq!(results(&a.bus)[0].content_digest, results(&b.bus)[0].content_digest);
    assert_eq!(results(&a.bus)[0].payload, results(&b.bus)[0].payload);
}

#[tokio::test]
async fn empty_scope_still_emits_a_result() {
    let h = harness();

    let outcome = h
        .resolver
        .handle_request(&request("r-1", "index", "html"))
        .await;

    assert!(outcome.is_emitted());
    assert_eq!(h.graph.calls(INDEX), 1);
    assert!(results(&h.bus)[0].payload.starts_with("<article"));
}

// ── Failures ───────────────────────────────────────────────────

#[tokio::test]
async fn unknown_view_type_lists_valid_types() {
    let h = harness();

    let outcome = h
        .resolver
        .handle_request(&request("r-9", "timeline", "json"))
        .await;

    assert_eq!(outcome.reason(), Some("unknown_view_type"));
    assert_eq!(h.graph.total_calls(), 0);
    assert!(results(&h.bus).is_empty());

    let failure = &failures(&h.bus)[0];
    assert_eq!(failure.component, "view_resolver.select");
    assert_eq!(failure.correlation_id, "r-9");
    for valid in ["architecture", "api-reference", "coverage", "index"] {
        assert!(failure.detail.contains(valid), "{}", failure.detail);
    }
}

#[tokio::test]
async fn malformed_request_fails_at_decode() {
    let h = harness();
    let envelope = Envelope::new(VIEW_REQUEST, json!({ "request_id": "r-x" }), "ui.docs");

    let outcome = h.resolver.handle_request(&envelope).await;

    assert_eq!(outcome.reason(), Some("malformed_request"));
    let failure = &failures(&h.bus)[0];
    assert_eq!(failure.component, "view_resolver.decode");
    assert_eq!(failure.correlation_id, "r-x");
}

#[tokio::test]
async fn oversize_payload_is_refused_after_render() {
    let policy = NamespacePolicy {
        payload_cap_bytes: 64,
        ..NamespacePolicy::default()
    };
    let h = harness_with(policy, ViewResolverConfig::default());

    let outcome = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    assert_eq!(outcome.reason(), Some("payload_too_large"));
    assert!(results(&h.bus).is_empty());
    assert_eq!(failures(&h.bus)[0].component, "view_resolver.emit");
}

#[tokio::test]
async fn foreign_emitter_is_rejected_before_any_query() {
    let h = harness();
    let mut envelope = request("r-1", "architecture", "json");
    envelope.origin = "rogue.bot".into();

    let outcome = h.resolver.handle_request(&envelope).await;

    assert_eq!(outcome.reason(), Some("emitter_not_allowed"));
    assert_eq!(h.graph.total_calls(), 0);
}

#[tokio::test]
async fn unpriced_format_is_rejected_before_any_query() {
    let h = harness();

    let outcome = h
        .resolver
        .handle_request(&request("r-1", "architecture", "pdf"))
        .await;

    match outcome {
        ViewOutcome::Failed { stage, reason, .. } => {
            assert_eq!(stage, Stage::Governance);
            assert_eq!(reason, "unpriced_format");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.graph.total_calls(), 0);
}

#[tokio::test]
async fn missing_quote_is_rejected_when_required() {
    let policy = NamespacePolicy {
        quote_required: true,
        ..NamespacePolicy::default()
    };
    let h = harness_with(policy, ViewResolverConfig::default());

    let refused = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;
    assert_eq!(refused.reason(), Some("quote_invalid"));

    let mut quoted = request("r-2", "architecture", "json");
    quoted.payload["quote_id"] = json!("q-123");
    assert!(h.resolver.handle_request(&quoted).await.is_emitted());
    assert_eq!(h.graph.calls(ARCH), 1);
}

#[tokio::test]
async fn rate_limit_applies_per_tenant() {
    let policy = NamespacePolicy {
        rate_limit_max: 2,
        ..NamespacePolicy::default()
    };
    let h = harness_with(policy, ViewResolverConfig::default());

    for id in ["r-1", "r-2"] {
        assert!(h
            .resolver
            .handle_request(&request(id, "architecture", "json"))
            .await
            .is_emitted());
    }
    let limited = h
        .resolver
        .handle_request(&request("r-3", "architecture", "json"))
        .await;

    assert_eq!(limited.reason(), Some("rate_limit_exceeded"));
    assert_eq!(h.bus.published().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn query_timeout_does_not_poison_the_cache() {
    let h = harness_with(
        NamespacePolicy::default(),
        ViewResolverConfig::default().with_query_timeout(Duration::from_millis(100)),
    );

    h.graph.set_delay(Some(Duration::from_secs(1)));
    let timed_out = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;
    assert_eq!(timed_out.reason(), Some("upstream_timeout"));
    assert_eq!(failures(&h.bus)[0].component, "view_resolver.project");
    assert!(h.resolver.cache().is_empty());

    h.graph.set_delay(None);
    let retried = h
        .resolver
        .handle_request(&request("r-2", "architecture", "json"))
        .await;
    assert!(retried.is_emitted());
    assert_eq!(h.graph.calls(ARCH), 2);
}

#[tokio::test]
async fn publish_failure_is_reported_in_the_outcome() {
    let h = harness();
    h.bus.set_failure(Some("bus down"));

    let outcome = h
        .resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    assert_eq!(outcome.reason(), Some("publish_failed"));
    assert!(h.bus.published().is_empty());
}

// ── Invalidation ───────────────────────────────────────────────

#[tokio::test]
async fn explicit_invalidation_forces_one_more_query_within_ttl() {
    let h = harness();
    h.resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    let signal = Envelope::new(
        VIEW_INVALIDATED,
        json!({ "view_type": "architecture", "scope_org": "acme", "scope_path": "/" }),
        "l2.indexer",
    );
    assert_eq!(h.resolver.handle_invalidation(&signal), 1);

    h.resolver
        .handle_request(&request("r-2", "architecture", "json"))
        .await;
    h.resolver
        .handle_request(&request("r-3", "architecture", "json"))
        .await;
    assert_eq!(h.graph.calls(ARCH), 2);
}

#[tokio::test]
async fn invalidation_for_another_org_keeps_cache() {
    let h = harness();
    h.resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;

    let signal = Envelope::new(
        VIEW_INVALIDATED,
        json!({ "view_type": "*", "scope_org": "globex" }),
        "l2.indexer",
    );
    assert_eq!(h.resolver.handle_invalidation(&signal), 0);
    assert_eq!(h.resolver.cache().len(), 1);
}

#[tokio::test]
async fn graph_delta_purges_org_and_broadcasts() {
    let h = harness();
    h.resolver
        .handle_request(&request("r-1", "architecture", "json"))
        .await;
    h.resolver
        .handle_request(&request("r-2", "index", "json"))
        .await;

    let delta = Envelope::new(
        "graph.delta.upsert",
        json!({ "scope_org": "acme", "node_ids": ["n1"] }),
        "l2.graph",
    );
    let removed = h.resolver.handle_graph_delta(&delta).await.unwrap();
    assert_eq!(removed, 2);
    assert!(h.resolver.cache().is_empty());

    let broadcasts = h.bus.on_channel(VIEW_INVALIDATED);
    assert_eq!(broadcasts.len(), 1);
    let broadcast: InvalidatedBroadcast =
        serde_json::from_value(broadcasts[0].payload.clone()).unwrap();
    assert_eq!(broadcast.reasons, vec!["graph.delta.upsert"]);
    assert!(broadcast.affects.contains(&"architecture:acme:*".to_string()));
    assert_eq!(broadcast.affects.len(), 4);
}
