//! Connection configuration: the snapshot, how it is loaded and validated,
//! and where it is published.

mod global;
mod loader;
mod snapshot;
mod validation;

pub use global::{GlobalConfig, global};
pub use loader::{ConfigLoader, DirectoryLoader, FileFormat, format_for_extension};
pub use snapshot::{ConfigSnapshot, Connection, ConnectionKind, ImportSchema};
pub use validation::Validate;
