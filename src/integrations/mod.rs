//! Integration Registry & Metrics (component I): a name-keyed registry
//! of live/lazily-constructed integrations with optional capability
//! probing, plus a metrics sidecar any caller can wrap around an
//! integration invocation.

pub mod metrics;
pub mod registry;

pub use metrics::{IntegrationMetrics, MetricsSidecar};
pub use registry::{Configurable, HealthCheckable, Integration, IntegrationRegistry, LifecycleAware, Refreshable};
