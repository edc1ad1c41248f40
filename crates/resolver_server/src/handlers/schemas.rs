//! Synchronous registry lookups:
//!   GET /schemas/resolve?ref=&caller=&org=&include_compat=
//!   GET /schemas/latest?type=&name=&caller=&org=
//!   GET /schemas/compat?id=&caller=&org=

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::Json;
use serde::Deserialize;

use resolver_core::schema::CompatBuckets;
use resolver_core::{Attribution, RegistryNode, SchemaResolver};

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    #[serde(rename = "ref")]
    pub reference: String,
    pub caller: Option<String>,
    pub org: Option<String>,
    #[serde(default = "default_include_compat")]
    pub include_compat: bool,
}

fn default_include_compat() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct LatestParams {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub caller: Option<String>,
    pub org: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompatParams {
    pub id: String,
    pub caller: Option<String>,
    pub org: Option<String>,
}

pub async fn resolve(
    Extension(schemas): Extension<Arc<SchemaResolver>>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<RegistryNode>, AppError> {
    let who = Attribution::new(params.caller.as_deref(), params.org.as_deref());
    let node = schemas
        .resolve_schema_id(&params.reference, who, params.include_compat)
        .await?;
    Ok(Json(node))
}

pub async fn latest(
    Extension(schemas): Extension<Arc<SchemaResolver>>,
    Query(params): Query<LatestParams>,
) -> Result<Json<RegistryNode>, AppError> {
    let who = Attribution::new(params.caller.as_deref(), params.org.as_deref());
    let node = schemas
        .resolve_latest(&params.type_name, &params.name, who)
        .await?;
    Ok(Json(node))
}

pub async fn compat(
    Extension(schemas): Extension<Arc<SchemaResolver>>,
    Query(params): Query<CompatParams>,
) -> Result<Json<CompatBuckets>, AppError> {
    let who = Attribution::new(params.caller.as_deref(), params.org.as_deref());
    Ok(Json(schemas.compat_for(&params.id, who).await?))
}
