//! ViewCache: projected models and rendered results, both on a TTL, both
//! purgeable by an explicit invalidation signal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::views::projector::ViewModel;
use crate::views::renderer::{Format, ViewResult};
use crate::views::selector::ViewType;

/// Wildcard accepted by [`ViewCache::invalidate`].
pub const ANY: &str = "*";

/// Deterministic cache key of a request: `(view_type, scope_org, scope_path)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub view_type: ViewType,
    pub scope_org: String,
    pub scope_path: String,
}

impl ViewKey {
    pub fn new(view_type: ViewType, scope_org: &str, scope_path: &str) -> Self {
        Self {
            view_type,
            scope_org: scope_org.to_string(),
            scope_path: scope_path.to_string(),
        }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.view_type, self.scope_org, self.scope_path)
    }
}

/// Invalidation filter. `*` matches anything; a trailing `*` on the path
/// matches by prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSelector {
    pub view_type: String,
    pub scope_org: String,
    pub scope_path: String,
}

impl ViewSelector {
    pub fn new(view_type: &str, scope_org: &str, scope_path: &str) -> Self {
        Self {
            view_type: view_type.to_string(),
            scope_org: scope_org.to_string(),
            scope_path: scope_path.to_string(),
        }
    }

    pub fn whole_org(scope_org: &str) -> Self {
        Self::new(ANY, scope_org, ANY)
    }

    pub fn matches(&self, key: &ViewKey) -> bool {
        glob_matches(&self.view_type, key.view_type.as_str())
            && glob_matches(&self.scope_org, &key.scope_org)
            && glob_matches(&self.scope_path, &key.scope_path)
    }
}

impl fmt::Display for ViewSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.view_type, self.scope_org, self.scope_path)
    }
}

/// `*` alone matches anything, `prefix*` matches by prefix, anything else
/// must match exactly.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

pub struct ViewCache {
    ttl: Duration,
    models: TtlCache<Arc<ViewModel>, ViewKey>,
    rendered: TtlCache<ViewResult, (ViewKey, Format)>,
}

impl ViewCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            models: TtlCache::new(),
            rendered: TtlCache::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_model(&self, key: &ViewKey) -> Option<Arc<ViewModel>> {
        self.models.get(key)
    }

    pub fn set_model(&self, key: ViewKey, model: Arc<ViewModel>) {
        self.models.set(key, model, self.ttl);
    }

    /// A rendered result, only if it was rendered from a model with `digest`.
    pub fn get_rendered(&self, key: &ViewKey, format: Format, digest: &str) -> Option<ViewResult> {
        self.rendered
            .get(&(key.clone(), format))
            .filter(|r| r.content_digest == digest)
    }

    pub fn set_rendered(&self, key: ViewKey, result: ViewResult) {
        let format = result.format;
        self.rendered.set((key, format), result, self.ttl);
    }

    /// Purge every model and rendering matching `selector`. Returns the
    /// number of models removed.
    pub fn invalidate(&self, selector: &ViewSelector) -> usize {
        self.rendered.invalidate_where(|(key, _)| selector.matches(key));
        let removed = self.models.invalidate_where(|key| selector.matches(key));
        tracing::info!(selector = %selector, removed, "view cache invalidated");
        removed
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
