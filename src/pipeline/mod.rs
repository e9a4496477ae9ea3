pub mod events;
pub mod orchestrator;
pub mod phase;

pub use events::ScanEvent;
pub use orchestrator::ScanPipeline;
pub use phase::{ScanPhase, PHASES};
