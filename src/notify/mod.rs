//! Filesystem change notification.
//!
//! Watches configuration directories and delivers filtered, coalesced change
//! batches to a single handler.

pub mod batch;
pub mod watcher;

pub use batch::{ChangeBatch, Inclusion};
pub use watcher::{
    ChangeHandler, DEFAULT_DEBOUNCE, MAX_BATCH_WINDOWS, WatchOptions, WatchSubscription,
};
