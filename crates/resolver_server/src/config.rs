//! Process configuration, read once at startup.
//!
//! Everything comes from `RESOLVER_*` env vars (after `.env` is loaded by
//! `main`). An optional YAML policy file adds or overrides namespace
//! policies on top of the `docs` policy built from env.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use resolver_core::governance::{GovernancePolicies, NamespacePolicy, DOCS_NAMESPACE};
use resolver_core::{SchemaResolverConfig, ViewResolverConfig};
use resolver_graph::GraphClientConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub graph_url: String,
    pub graph_api_key: String,
    pub graph_name: String,
    pub query_timeout: Duration,
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub view_ttl: Duration,
    pub docs_policy: NamespacePolicy,
    pub policy_file: Option<PathBuf>,
    pub bus_inject_url: String,
    pub bind_addr: String,
    pub queue_capacity: usize,
    pub publish_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        let defaults = NamespacePolicy::default();
        let docs_policy = NamespacePolicy {
            payload_cap_bytes: parse_or(
                &get,
                "RESOLVER_PAYLOAD_CAP_BYTES",
                defaults.payload_cap_bytes,
            )?,
            rate_limit_max: parse_or(&get, "RESOLVER_RATE_LIMIT_MAX", defaults.rate_limit_max)?,
            rate_limit_window_secs: parse_or(
                &get,
                "RESOLVER_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
            allowed_emitters: match get("RESOLVER_ALLOWED_EMITTERS") {
                Some(list) => split_list(&list),
                None => defaults.allowed_emitters,
            },
            quote_required: parse_or(&get, "RESOLVER_QUOTE_REQUIRED", defaults.quote_required)?,
        };

        Ok(Self {
            graph_url: required("RESOLVER_GRAPH_URL")?,
            graph_api_key: required("RESOLVER_GRAPH_API_KEY")?,
            graph_name: get("RESOLVER_GRAPH_NAME").unwrap_or_else(|| "protocol".into()),
            query_timeout: Duration::from_millis(parse_or(
                &get,
                "RESOLVER_QUERY_TIMEOUT_MS",
                10_000,
            )?),
            positive_ttl: Duration::from_secs(parse_or(&get, "RESOLVER_POSITIVE_TTL_SECS", 60)?),
            negative_ttl: Duration::from_secs(parse_or(&get, "RESOLVER_NEGATIVE_TTL_SECS", 10)?),
            view_ttl: Duration::from_secs(parse_or(&get, "RESOLVER_VIEW_TTL_SECS", 300)?),
            docs_policy,
            policy_file: get("RESOLVER_POLICY_FILE").map(PathBuf::from),
            bus_inject_url: required("RESOLVER_BUS_INJECT_URL")?,
            bind_addr: get("RESOLVER_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:4200".into()),
            queue_capacity: parse_or(&get, "RESOLVER_QUEUE_CAPACITY", 256)?,
            publish_timeout: Duration::from_millis(parse_or(
                &get,
                "RESOLVER_PUBLISH_TIMEOUT_MS",
                5_000,
            )?),
        })
    }

    /// The env `docs` policy, with the policy file (if any) merged over it.
    pub fn policies(&self) -> Result<GovernancePolicies> {
        let mut policies = GovernancePolicies::single(DOCS_NAMESPACE, self.docs_policy.clone());
        if let Some(path) = &self.policy_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read policy file {}", path.display()))?;
            let from_file = GovernancePolicies::from_yaml(&raw)
                .with_context(|| format!("invalid policy file {}", path.display()))?;
            policies.merge(from_file);
        }
        Ok(policies)
    }

    pub fn graph_client(&self) -> GraphClientConfig {
        GraphClientConfig::new(&self.graph_url, &self.graph_api_key)
            .with_default_graph(&self.graph_name)
            .with_timeout(self.query_timeout)
    }

    pub fn schema_resolver(&self) -> SchemaResolverConfig {
        SchemaResolverConfig::default()
            .with_positive_ttl(self.positive_ttl)
            .with_negative_ttl(self.negative_ttl)
            .with_query_timeout(self.query_timeout)
    }

    pub fn view_resolver(&self) -> ViewResolverConfig {
        ViewResolverConfig::default()
            .with_view_ttl(self.view_ttl)
            .with_query_timeout(self.query_timeout)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?} is invalid: {e}")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
