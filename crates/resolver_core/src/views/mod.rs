//! View materialization: selector registry, projection, rendering, the view
//! cache and the request pipeline that ties them together.

pub mod cache;
pub mod pipeline;
pub mod projector;
pub mod renderer;
pub mod selector;

pub use cache::{ViewCache, ViewKey, ViewSelector};
pub use pipeline::{Stage, ViewOutcome, ViewResolver, ViewResolverConfig};
pub use projector::{ViewItem, ViewModel, ViewSection};
pub use renderer::{Format, PriceRule, PriceSchedule, ViewResult};
pub use selector::ViewType;
