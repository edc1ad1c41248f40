//! Resolver telemetry: attribution records for every lookup branch.
//!
//! This is an auditing channel, not debug logging: each record names the
//! caller and org that triggered it.

use serde::Serialize;

/// What happened during a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TelemetryKind {
    #[serde(rename = "resolver.hit")]
    Hit,
    #[serde(rename = "resolver.negative_hit")]
    NegativeHit,
    #[serde(rename = "resolver.miss")]
    Miss,
    #[serde(rename = "resolver.fetch")]
    Fetch,
    #[serde(rename = "resolver.latest_miss")]
    LatestMiss,
    #[serde(rename = "resolver.compat_hit")]
    CompatHit,
    #[serde(rename = "resolver.compat_fetch")]
    CompatFetch,
}

impl TelemetryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Hit => "resolver.hit",
            TelemetryKind::NegativeHit => "resolver.negative_hit",
            TelemetryKind::Miss => "resolver.miss",
            TelemetryKind::Fetch => "resolver.fetch",
            TelemetryKind::LatestMiss => "resolver.latest_miss",
            TelemetryKind::CompatHit => "resolver.compat_hit",
            TelemetryKind::CompatFetch => "resolver.compat_fetch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub kind: TelemetryKind,
    /// Canonical id, or `Type/name` for latest-version lookups.
    pub subject: String,
    pub caller: Option<String>,
    pub org: Option<String>,
    pub edge_count: Option<usize>,
}

impl TelemetryEvent {
    pub fn new(
        kind: TelemetryKind,
        subject: impl Into<String>,
        caller: Option<&str>,
        org: Option<&str>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            caller: caller.map(str::to_string),
            org: org.map(str::to_string),
            edge_count: None,
        }
    }

    pub fn with_edge_count(mut self, count: usize) -> Self {
        self.edge_count = Some(count);
        self
    }
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Writes telemetry as structured `tracing` events under `resolver.telemetry`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        tracing::info!(
            target: "resolver.telemetry",
            event = event.kind.as_str(),
            subject = %event.subject,
            caller = event.caller.as_deref().unwrap_or("-"),
            org = event.org.as_deref().unwrap_or("-"),
            edge_count = event.edge_count,
        );
    }
}
