pub mod endpoint;
pub mod documentation;
pub mod payload;
pub mod probe;
pub mod finding;
pub mod report;

pub use endpoint::*;
pub use documentation::*;
pub use payload::*;
pub use probe::*;
pub use finding::*;
pub use report::*;
