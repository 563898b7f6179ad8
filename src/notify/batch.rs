//! Change batches and the extension filter that decides what gets into them.

use notify::{Event, EventKind};
use std::path::{Path, PathBuf};

/// Inclusion predicate over file extensions.
///
/// Extensions are compared without the leading dot and case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inclusion {
    extensions: Vec<String>,
}

impl Inclusion {
    /// Include files whose extension is one of `extensions`.
    pub fn from_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Included extensions.
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether a path passes the filter.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|e| e.eq_ignore_ascii_case(ext))
            })
    }

    /// Whether an event is relevant: a create, modify or remove touching at
    /// least one included path.
    pub fn accepts(&self, event: &Event) -> bool {
        matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) && event.paths.iter().any(|p| self.matches(p))
    }
}

/// One or more filesystem changes delivered together.
///
/// A batch may coalesce several OS-level events (write followed by rename,
/// several editors saving at once); it says nothing about which single change
/// triggered it. The batch delivered right after start is empty.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    events: Vec<Event>,
}

impl ChangeBatch {
    /// Create a batch from raw events.
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// The empty batch emitted when a subscription starts.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Add an event to the batch.
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Raw events in arrival order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of raw events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct paths touched by this batch, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .events
            .iter()
            .flat_map(|e| e.paths.iter().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}
