//! Content tools module
//!
//! Tools that work on text the agent already has: analysis and saving.

mod analyze;
mod save;

pub use analyze::{analyze, AnalyzeArgs, ContentAnalysis};
pub use save::{sanitize_filename, DirectorySink, FileSink, SaveArgs};
