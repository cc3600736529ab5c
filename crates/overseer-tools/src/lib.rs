//! # Overseer Tools
//!
//! The five canonical tools bridging the registry to the sandbox
//! facades: shell, file_read, file_write, file_list, browser. Each is a
//! thin adapter: argument translation in, uniform outcome out. Policy
//! enforcement and size ceilings live in the sandbox layer.

mod browser;
mod file;
mod shell;
mod truncate;

use std::sync::Arc;

use overseer_core::tool::ToolRegistry;
use overseer_sandbox::SandboxManager;

pub use browser::BrowserTool;
pub use file::{FileListTool, FileReadTool, FileWriteTool};
pub use shell::ShellTool;
pub use truncate::{truncate_output, OUTPUT_CEILING_CHARS};

/// Register the canonical tool set against a sandbox manager.
pub fn register_canonical_tools(registry: &mut ToolRegistry, sandboxes: Arc<SandboxManager>) {
    registry.register(Arc::new(ShellTool::new(sandboxes.clone())));
    registry.register(Arc::new(FileReadTool::new(sandboxes.clone())));
    registry.register(Arc::new(FileWriteTool::new(sandboxes.clone())));
    registry.register(Arc::new(FileListTool::new(sandboxes.clone())));
    registry.register(Arc::new(BrowserTool::new(sandboxes)));
}
