//! Filesystem backends for the OnedataFS contents manager.
//!
//! - `LocalFs`: a directory tree on a mounted filesystem (a oneclient mount
//!   or any local directory), rooted at a configured location
//! - `MemoryFs`: an in-process tree with deterministic timestamps and fault
//!   injection, used by tests

pub mod config;
pub mod local;
pub mod memory;

pub use config::LocalFsConfig;
pub use local::LocalFs;
pub use memory::MemoryFs;
