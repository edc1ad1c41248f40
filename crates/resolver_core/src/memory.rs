//! In-memory port implementations for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ResolverError;
use crate::events::Envelope;
use crate::ports::{EventBus, GraphQuery, GraphQueryPort, Result, Row};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

type Handler = Arc<dyn Fn(&GraphQuery) -> Vec<Row> + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scripted graph store.
///
/// Responses are registered per query name; unscripted queries return no
/// rows. Every call is counted, including ones that fail or time out.
#[derive(Default)]
pub struct MemoryGraph {
    handlers: Mutex<HashMap<&'static str, Handler>>,
    calls: Mutex<Vec<GraphQuery>>,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<String>>,
    failing: Mutex<HashMap<&'static str, String>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `name` with the rows the handler computes from the query.
    pub fn on(
        &self,
        name: &'static str,
        handler: impl Fn(&GraphQuery) -> Vec<Row> + Send + Sync + 'static,
    ) {
        lock(&self.handlers).insert(name, Arc::new(handler));
    }

    /// Answer `name` with fixed rows.
    pub fn respond(&self, name: &'static str, rows: Vec<Row>) {
        self.on(name, move |_| rows.clone());
    }

    /// Sleep before answering. Pair with paused tokio time in tests.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Fail every query with an upstream error until cleared.
    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    /// Fail only queries named `name`; `None` clears it.
    pub fn set_query_failure(&self, name: &'static str, message: Option<&str>) {
        let mut failing = lock(&self.failing);
        match message {
            Some(m) => failing.insert(name, m.to_string()),
            None => failing.remove(name),
        };
    }

    pub fn calls(&self, name: &str) -> usize {
        lock(&self.calls).iter().filter(|q| q.name == name).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_call(&self, name: &str) -> Option<GraphQuery> {
        lock(&self.calls).iter().rev().find(|q| q.name == name).cloned()
    }
}

#[async_trait]
impl GraphQueryPort for MemoryGraph {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Row>> {
        lock(&self.calls).push(query.clone());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = lock(&self.failure)
            .clone()
            .or_else(|| lock(&self.failing).get(query.name).cloned());
        if let Some(message) = failure {
            return Err(ResolverError::Upstream(message));
        }

        let handler = lock(&self.handlers).get(query.name).cloned();
        Ok(handler.map(|h| h(query)).unwrap_or_default())
    }
}

/// Records published envelopes.
#[derive(Debug, Default)]
pub struct MemoryBus {
    published: Mutex<Vec<Envelope>>,
    failure: Mutex<Option<String>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failure(&self, message: Option<&str>) {
        *lock(&self.failure) = message.map(str::to_string);
    }

    pub fn published(&self) -> Vec<Envelope> {
        lock(&self.published).clone()
    }

    pub fn on_channel(&self, channel: &str) -> Vec<Envelope> {
        lock(&self.published)
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<()> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(ResolverError::Publish(message));
        }
        lock(&self.published).push(envelope);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        lock(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(|e| e.kind.as_str()).collect()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        lock(&self.events).push(event);
    }
}
