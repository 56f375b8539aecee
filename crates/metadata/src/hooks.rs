//! Restore observers.
//!
//! Observers get a synchronous veto before a restore mutates anything, and a
//! notification once the outcome is final: after commit on success, after
//! rollback on failure.

use reclaim_core::TransactionId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The entity a restore concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreEvent {
    pub entity_type: String,
    pub entity_id: String,
    /// Marker value at the time the restore started.
    pub transaction_id: Option<TransactionId>,
}

impl RestoreEvent {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        transaction_id: Option<TransactionId>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            transaction_id,
        }
    }
}

/// Final outcome reported to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    /// The restore was rolled back; state is unchanged.
    Failed { kind: &'static str, message: String },
}

impl RestoreOutcome {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored)
    }
}

/// Hook pair fired around every entity restore.
pub trait RestoreObserver: Send + Sync {
    /// Called before any mutation. Returning false vetoes the restore.
    fn restoring(&self, _event: &RestoreEvent) -> bool {
        true
    }

    /// Called once the restore committed or rolled back.
    fn restored(&self, _event: &RestoreEvent, _outcome: &RestoreOutcome) {}
}

/// Ordered list of observers, each optionally scoped to one entity type.
#[derive(Clone, Default)]
pub struct RestoreObservers {
    entries: Vec<(Option<String>, Arc<dyn RestoreObserver>)>,
}

impl RestoreObservers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe restores of every entity type.
    pub fn add(&mut self, observer: Arc<dyn RestoreObserver>) {
        self.entries.push((None, observer));
    }

    /// Observe restores of one entity type.
    pub fn add_for(&mut self, entity_type: impl Into<String>, observer: Arc<dyn RestoreObserver>) {
        self.entries.push((Some(entity_type.into()), observer));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'a>(
        &'a self,
        event: &'a RestoreEvent,
    ) -> impl Iterator<Item = &'a Arc<dyn RestoreObserver>> + 'a {
        self.entries.iter().filter_map(move |(scope, observer)| {
            match scope {
                Some(entity_type) if *entity_type != event.entity_type => None,
                _ => Some(observer),
            }
        })
    }

    /// Ask every matching observer; the first veto wins.
    pub fn allow_restore(&self, event: &RestoreEvent) -> bool {
        for observer in self.matching(event) {
            if !observer.restoring(event) {
                tracing::debug!(
                    entity_type = %event.entity_type,
                    entity_id = %event.entity_id,
                    "Restore vetoed by observer"
                );
                return false;
            }
        }
        true
    }

    /// Deliver the final outcome to every matching observer.
    pub fn notify(&self, event: &RestoreEvent, outcome: &RestoreOutcome) {
        for observer in self.matching(event) {
            observer.restored(event, outcome);
        }
    }
}

impl fmt::Debug for RestoreObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreObservers")
            .field("len", &self.entries.len())
            .finish()
    }
}
