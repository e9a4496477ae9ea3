pub mod assembler;
pub mod formatter;
pub mod progress;

pub use assembler::{atomic_write, write_report};
pub use formatter::{format_executive_summary, format_finding_markdown, format_report_markdown, format_terminal_summary};
pub use progress::ScanProgress;
