//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here:
//! - `process` - liveness checks and termination by pid
//! - `permissions` - executable bits
//! - `paths` - executable names and OS/architecture identifiers

pub mod paths;
pub mod permissions;
pub mod process;

pub use paths::{adoptium_arch, adoptium_os, java_executable_name};
pub use permissions::set_executable;
pub use process::{is_process_alive, terminate_child, terminate_process};
