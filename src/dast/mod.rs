//! Probe construction, bounded execution and response classification.

pub mod classifier;
pub mod executor;
pub mod request;
pub mod transport;

pub use classifier::FindingClassifier;
pub use executor::{
    Baselines, ClassifyingSink, ExecutorSettings, InFlightGauge, PoolStats, ProbeExecutor, ProbeHandler, ProbeResult,
};
pub use request::RequestBuilder;
pub use transport::{HttpTransport, ProbeTransport, TransportError};
