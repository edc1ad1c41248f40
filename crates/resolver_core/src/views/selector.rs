//! Selector registry: the fixed set of view types and their query templates.
//!
//! Templates are static text. `$scope_org` and `$scope_path` always travel as
//! parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ResolverError;
use crate::ports::GraphQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewType {
    Architecture,
    ApiReference,
    Coverage,
    Index,
}

impl ViewType {
    pub const ALL: [ViewType; 4] = [
        ViewType::Architecture,
        ViewType::ApiReference,
        ViewType::Coverage,
        ViewType::Index,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::Architecture => "architecture",
            ViewType::ApiReference => "api-reference",
            ViewType::Coverage => "coverage",
            ViewType::Index => "index",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(ViewType::as_str).collect()
    }

    pub fn title(&self) -> &'static str {
        match self {
            ViewType::Architecture => "Architecture",
            ViewType::ApiReference => "API Reference",
            ViewType::Coverage => "Coverage",
            ViewType::Index => "Index",
        }
    }

    fn template(&self) -> (&'static str, &'static str) {
        match self {
            ViewType::Architecture => ("views.architecture", ARCHITECTURE),
            ViewType::ApiReference => ("views.api_reference", API_REFERENCE),
            ViewType::Coverage => ("views.coverage", COVERAGE),
            ViewType::Index => ("views.index", INDEX),
        }
    }
}

impl fmt::Display for ViewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ResolverError::UnknownViewType {
                requested: s.to_string(),
                valid: Self::names(),
            })
    }
}

/// Build the parameterized query for a view over one org and path prefix.
pub fn select(
    view_type: ViewType,
    scope_org: &str,
    scope_path: &str,
    graph: Option<String>,
) -> GraphQuery {
    let (name, statement) = view_type.template();
    GraphQuery::new(name, statement)
        .param("scope_org", scope_org)
        .param("scope_path", scope_path)
        .on_graph(graph)
}

const ARCHITECTURE: &str = "
MATCH (ca:U4_Code_Artifact)
WHERE ca.scope_ref = $scope_org
  AND ($scope_path = '/' OR ca.path STARTS WITH $scope_path)
OPTIONAL MATCH (ko:U4_Knowledge_Object)-[:U4_DOCUMENTS]->(ca)
WHERE ko.ko_type IN ['spec', 'adr']
OPTIONAL MATCH (ca)-[:U4_DEPENDS_ON]->(dep:U4_Code_Artifact)
WITH ca, collect(DISTINCT ko) AS docs, collect(DISTINCT dep) AS dependencies
RETURN ca.path AS path,
       ca.name AS name,
       ca.language AS language,
       ca.artifact_type AS type,
       docs,
       dependencies
ORDER BY ca.path
LIMIT 50
";

const API_REFERENCE: &str = "
MATCH (ca:U4_Code_Artifact)
WHERE ca.scope_ref = $scope_org
  AND ($scope_path = '/' OR ca.path STARTS WITH $scope_path)
  AND (ca.name =~ '.*[Aa]pi.*'
    OR ca.name =~ '.*[Ee]ndpoint.*'
    OR ca.name =~ '.*[Hh]andler.*'
    OR ca.name =~ '.*[Rr]oute.*'
    OR ca.path =~ '.*/api/.*'
    OR ca.path =~ '.*/routes/.*'
    OR ca.path =~ '.*/endpoints/.*')
OPTIONAL MATCH (ko:U4_Knowledge_Object)-[:U4_DOCUMENTS]->(ca)
WHERE ko.ko_type = 'reference'
OPTIONAL MATCH (schema:U4_Knowledge_Object)-[:U4_DOCUMENTS]->(ca)
WHERE schema.ko_type = 'spec' AND schema.name =~ '.*[Ss]chema.*'
RETURN ca.name AS name,
       ca.path AS path,
       ca.description AS description,
       ca.language AS language,
       collect(DISTINCT ko) AS documentation,
       collect(DISTINCT schema) AS schemas
ORDER BY ca.path
LIMIT 30
";

const COVERAGE: &str = "
MATCH (n)
WHERE n.scope_ref = $scope_org
  AND ($scope_path = '/' OR coalesce(n.path, '') STARTS WITH $scope_path)
WITH labels(n)[0] AS node_type, n
WITH node_type,
     count(n) AS count,
     collect(DISTINCT n.language) AS languages,
     collect(DISTINCT n.ko_type) AS ko_types
OPTIONAL MATCH (t)-[:U4_TESTS]->(c)
WHERE c.scope_ref = $scope_org AND labels(c)[0] = node_type
WITH node_type, count, languages, ko_types, count(t) AS test_count
RETURN node_type, count, languages, ko_types, test_count
ORDER BY count DESC
";

const INDEX: &str = "
MATCH (n)
WHERE n.scope_ref = $scope_org
  AND (n:U4_Knowledge_Object OR n:U4_Code_Artifact)
  AND ($scope_path = '/' OR coalesce(n.path, '') STARTS WITH $scope_path)
RETURN n.name AS name,
       CASE
         WHEN n:U4_Knowledge_Object THEN n.ko_type
         WHEN n:U4_Code_Artifact THEN n.language
         ELSE 'unknown'
       END AS type_or_language,
       n.path AS path,
       labels(n)[0] AS node_label,
       n.description AS description
ORDER BY node_label, name
LIMIT 100
";
