//! # Overseer Sandbox
//!
//! Lifecycle management for the isolated, disposable execution
//! environments bound to tasks, plus RPC-style facades over the HTTP
//! services running inside every sandbox image (shell, file, browser).
//!
//! Containers run non-root with all capabilities dropped, no privilege
//! escalation, a read-only root, and tmpfs-only writable space at /tmp
//! and /work. The shell facade enforces a command blocklist and the file
//! facade a /work-rooted path policy before any request leaves the host;
//! the in-sandbox services enforce the same rules.

pub mod container;
pub mod manager;
pub mod policy;
pub mod services;

pub use container::{ContainerError, ContainerSettings};
pub use manager::{
    Sandbox, SandboxError, SandboxLifecycle, SandboxManager, SandboxManagerConfig, SandboxStatus,
};
pub use services::{
    BrowserOptions, BrowserOutput, DirEntry, DirListing, FileContent, FileWritten, ShellOptions,
    ShellOutput,
};
