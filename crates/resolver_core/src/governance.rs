//! GovernanceGate: namespace policy checks run before compute and before
//! emission.
//!
//! Pre-compute order: emitter allow-list, tenant rate limit, format priced,
//! quote. Pre-emission: payload cap. The first failing check wins.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::GovernanceViolation;
use crate::views::cache::glob_matches;
use crate::views::renderer::{Format, PriceSchedule};

/// Namespace of `docs.view.request` and friends.
pub const DOCS_NAMESPACE: &str = "docs";

pub const DEFAULT_PAYLOAD_CAP_BYTES: usize = 64 * 1024;

/// CPS-1 quote ids look like `q-<anything>`.
const QUOTE_PREFIX: &str = "q-";

// ── Policy ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespacePolicy {
    pub payload_cap_bytes: usize,
    /// Requests allowed per tenant per window; 0 disables the limit.
    pub rate_limit_max: usize,
    pub rate_limit_window_secs: u64,
    /// Emitter patterns: exact ids, or `prefix*`.
    pub allowed_emitters: Vec<String>,
    pub quote_required: bool,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            payload_cap_bytes: DEFAULT_PAYLOAD_CAP_BYTES,
            rate_limit_max: 100,
            rate_limit_window_secs: 60,
            allowed_emitters: vec!["l2.*".to_string(), "ui.*".to_string()],
            quote_required: false,
        }
    }
}

impl NamespacePolicy {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn allows_emitter(&self, emitter: &str) -> bool {
        self.allowed_emitters
            .iter()
            .any(|pattern| glob_matches(pattern, emitter))
    }
}

/// Policies keyed by namespace. Loaded from YAML:
///
/// ```yaml
/// namespaces:
///   docs:
///     payload_cap_bytes: 65536
///     rate_limit_max: 100
///     allowed_emitters: ["ui.*", "l2.*"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernancePolicies {
    #[serde(default)]
    pub namespaces: BTreeMap<String, NamespacePolicy>,
}

impl GovernancePolicies {
    pub fn single(namespace: &str, policy: NamespacePolicy) -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(namespace.to_string(), policy);
        Self { namespaces }
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Namespaces in `other` replace same-named ones here.
    pub fn merge(&mut self, other: GovernancePolicies) {
        self.namespaces.extend(other.namespaces);
    }

    pub fn get(&self, namespace: &str) -> Option<&NamespacePolicy> {
        self.namespaces.get(namespace)
    }
}

// ── Decision ──────────────────────────────────────────────────

/// Outcome of a check, for logs and API responses. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GovernanceDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> From<&Result<T, GovernanceViolation>> for GovernanceDecision {
    fn from(result: &Result<T, GovernanceViolation>) -> Self {
        match result {
            Ok(_) => Self {
                allowed: true,
                reason: None,
            },
            Err(v) => Self {
                allowed: false,
                reason: Some(v.reason().to_string()),
            },
        }
    }
}

/// What a pre-compute check looks at.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub namespace: &'a str,
    pub emitter: &'a str,
    pub tenant: &'a str,
    pub format: &'a str,
    pub quote_id: Option<&'a str>,
}

// ── Gate ──────────────────────────────────────────────────────

pub struct GovernanceGate {
    policies: GovernancePolicies,
    prices: PriceSchedule,
    windows: Mutex<RateWindows>,
}

/// Request instants per (namespace, tenant), oldest first.
#[derive(Default)]
struct RateWindows {
    hits: HashMap<(String, String), VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

impl GovernanceGate {
    pub fn new(policies: GovernancePolicies, prices: PriceSchedule) -> Self {
        Self {
            policies,
            prices,
            windows: Mutex::new(RateWindows::default()),
        }
    }

    /// Number of (namespace, tenant) pairs with requests still in a window.
    pub fn tracked_windows(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .hits
            .len()
    }

    pub fn policies(&self) -> &GovernancePolicies {
        &self.policies
    }

    pub fn prices(&self) -> &PriceSchedule {
        &self.prices
    }

    /// Run the pre-compute checks and return the parsed, priced format.
    ///
    /// A request that passes the rate check is counted against the window
    /// even if a later check rejects it.
    pub fn precheck(&self, req: &GateRequest<'_>) -> Result<Format, GovernanceViolation> {
        let policy = self.policy_for(req.namespace, req.emitter)?;
        if !policy.allows_emitter(req.emitter) {
            return Err(GovernanceViolation::EmitterNotAllowed {
                emitter: req.emitter.to_string(),
                namespace: req.namespace.to_string(),
            });
        }

        self.check_rate(req.namespace, req.tenant, policy)?;

        let format: Format = req.format.parse()?;
        if !self.prices.is_priced(format) {
            return Err(GovernanceViolation::UnpricedFormat {
                format: req.format.to_string(),
            });
        }

        if policy.quote_required {
            match req.quote_id {
                Some(q) if q.starts_with(QUOTE_PREFIX) && q.len() > QUOTE_PREFIX.len() => {}
                other => {
                    return Err(GovernanceViolation::QuoteInvalid {
                        quote_id: other.unwrap_or_default().to_string(),
                    })
                }
            }
        }

        Ok(format)
    }

    /// Pre-emission size check. Unknown namespaces get the default cap.
    pub fn check_payload(&self, namespace: &str, size: usize) -> Result<(), GovernanceViolation> {
        let cap = self
            .policies
            .get(namespace)
            .map(|p| p.payload_cap_bytes)
            .unwrap_or(DEFAULT_PAYLOAD_CAP_BYTES);
        if size > cap {
            return Err(GovernanceViolation::PayloadTooLarge { size, cap });
        }
        Ok(())
    }

    fn policy_for(
        &self,
        namespace: &str,
        emitter: &str,
    ) -> Result<&NamespacePolicy, GovernanceViolation> {
        self.policies
            .get(namespace)
            .ok_or_else(|| GovernanceViolation::EmitterNotAllowed {
                emitter: emitter.to_string(),
                namespace: namespace.to_string(),
            })
    }

    /// Rolling window: drop instants older than the window, then count.
    ///
    /// At most once per window, pairs whose instants have all expired are
    /// dropped so idle tenants do not pin memory.
    fn check_rate(
        &self,
        namespace: &str,
        tenant: &str,
        policy: &NamespacePolicy,
    ) -> Result<(), GovernanceViolation> {
        if policy.rate_limit_max == 0 {
            return Ok(());
        }
        let window = policy.rate_limit_window();
        let now = Instant::now();

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if windows
            .last_sweep
            .map_or(true, |t| now.duration_since(t) >= window)
        {
            self.sweep(&mut windows.hits, now);
            windows.last_sweep = Some(now);
        }

        let hits = windows
            .hits
            .entry((namespace.to_string(), tenant.to_string()))
            .or_default();
        prune(hits, now, window);

        if hits.len() >= policy.rate_limit_max {
            tracing::warn!(namespace, tenant, limit = policy.rate_limit_max, "rate limit exceeded");
            return Err(GovernanceViolation::RateLimitExceeded {
                tenant: tenant.to_string(),
                limit: policy.rate_limit_max,
                window_secs: policy.rate_limit_window_secs,
            });
        }
        hits.push_back(now);
        Ok(())
    }

    fn sweep(&self, hits: &mut HashMap<(String, String), VecDeque<Instant>>, now: Instant) {
        let before = hits.len();
        hits.retain(|(namespace, _), instants| {
            match self.policies.get(namespace) {
                Some(policy) => prune(instants, now, policy.rate_limit_window()),
                None => instants.clear(),
            }
            !instants.is_empty()
        });
        if hits.len() < before {
            tracing::debug!(dropped = before - hits.len(), "idle rate windows dropped");
        }
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while hits
        .front()
        .is_some_and(|t| now.duration_since(*t) >= window)
    {
        hits.pop_front();
    }
}
