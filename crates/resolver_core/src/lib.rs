//! Registry resolution and view materialization.
//!
//! `SchemaResolver` turns shorthand or canonical references into registry
//! nodes behind positive/negative TTL caches. `ViewResolver` turns
//! `docs.view.request` events into governed, cached, rendered views.
//! Both reach the outside world only through the traits in [`ports`].

pub mod cache;
pub mod error;
pub mod events;
pub mod governance;
pub mod memory;
pub mod ports;
pub mod reference;
pub mod schema;
pub mod telemetry;
pub mod value;
pub mod version;
pub mod views;

pub use error::{GovernanceViolation, ResolverError};
pub use events::Envelope;
pub use governance::{GovernanceGate, GovernancePolicies, NamespacePolicy};
pub use ports::{EventBus, GraphQuery, GraphQueryPort, Row};
pub use schema::{Attribution, RegistryNode, SchemaResolver, SchemaResolverConfig};
pub use telemetry::{TelemetrySink, TracingTelemetry};
pub use value::PropValue;
pub use views::{ViewOutcome, ViewResolver, ViewResolverConfig};
