//! Firmata Core - Headless library for managing owlcms-firmata installations.
//!
//! Installed versions live side by side under an installation root, one
//! directory per version. This crate enumerates them, installs and updates
//! them from GitHub releases, carries user data between them, and runs at
//! most one of them as a supervised Java process.
//!
//! The front end drives everything through [`AppState::execute`].
//!
//! # Example
//!
//! ```rust,no_run
//! use firmata_core::{AppState, Command, Outcome};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> firmata_core::Result<()> {
//!     let mut state = AppState::new("/path/to/owlcms-firmata")?;
//!
//!     if let Outcome::Versions { versions } = state.execute(Command::List).await? {
//!         for entry in versions {
//!             println!("{} (update: {:?})", entry.version, entry.update);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod fs_utils;
pub mod network;
pub mod platform;
pub mod process;
pub mod runtime;
pub mod state;
pub mod version_manager;
pub mod versions;

// Re-export commonly used types
pub use commands::{Command, Outcome, UpdateCheck, VersionEntry};
pub use config::{resolve_install_root, LauncherSettings};
pub use error::{ErrorCategory, FirmataError, Result};
pub use fs_utils::{carry_forward, copy_tree, CarryForwardReport, CopyOptions, CopyStats};
pub use network::{ArtifactDownloader, ReleaseIndex, ReleaseInfo};
pub use process::{ProcessExit, ProcessStatus, ProcessSupervisor};
pub use runtime::{JavaRuntime, JavaRuntimeManager, RuntimeProvider};
pub use state::AppState;
pub use version_manager::{Guidance, VersionManager};
pub use versions::AppVersion;
