//! Launching and supervising the owlcms-firmata server.
//!
//! At most one server runs at a time. The supervisor keeps the child handle
//! and mirrors its pid into `firmata.pid` so a later invocation can report on
//! it or stop it.

mod launcher;
mod supervisor;

pub use launcher::{log_file_name, LaunchConfig};
pub use supervisor::{ProcessExit, ProcessStatus, ProcessSupervisor, RunningProcess};
