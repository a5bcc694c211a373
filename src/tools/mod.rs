//! Tools module - Tool implementations for the agent
//!
//! Contains browser automation, content tools, and the tool registry.

pub mod browser;
pub mod content;
pub mod registry;

pub use registry::{ToolName, ToolRegistry};
