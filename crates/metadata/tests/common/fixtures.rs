//! Entity fixtures and observers.

use reclaim_core::TransactionId;
use reclaim_metadata::{RestoreEvent, RestoreObserver, RestoreOutcome, SoftDeletable};
use serde::Serialize;
use std::sync::Mutex;

/// Entity with an integer key and the default marker column.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Widget {
    pub id: i64,
    pub name: String,
    pub delete_transaction_id: Option<TransactionId>,
}

impl SoftDeletable for Widget {
    type Id = i64;
    const ENTITY_TYPE: &'static str = "Widget";
    const TABLE: &'static str = "widgets";

    fn entity_id(&self) -> i64 {
        self.id
    }

    fn deletion_marker(&self) -> Option<TransactionId> {
        self.delete_transaction_id
    }

    fn set_deletion_marker(&mut self, marker: Option<TransactionId>) {
        self.delete_transaction_id = marker;
    }
}

/// Entity with a text key and its own marker column.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct Gadget {
    pub sku: String,
    pub label: String,
    pub trashed_in: Option<TransactionId>,
}

impl SoftDeletable for Gadget {
    type Id = String;
    const ENTITY_TYPE: &'static str = "Gadget";
    const TABLE: &'static str = "gadgets";
    const ID_COLUMN: &'static str = "sku";
    const MARKER_COLUMN: Option<&'static str> = Some("trashed_in");

    fn entity_id(&self) -> String {
        self.sku.clone()
    }

    fn deletion_marker(&self) -> Option<TransactionId> {
        self.trashed_in
    }

    fn set_deletion_marker(&mut self, marker: Option<TransactionId>) {
        self.trashed_in = marker;
    }
}

/// Observer that records every notification and can veto one entity id.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub veto_entity_id: Option<String>,
    pub asked: Mutex<Vec<String>>,
    pub notified: Mutex<Vec<(String, RestoreOutcome)>>,
}

#[allow(dead_code)]
impl RecordingObserver {
    pub fn vetoing(entity_id: &str) -> Self {
        Self {
            veto_entity_id: Some(entity_id.to_string()),
            ..Default::default()
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub fn notified(&self) -> Vec<(String, RestoreOutcome)> {
        self.notified.lock().unwrap().clone()
    }
}

impl RestoreObserver for RecordingObserver {
    fn restoring(&self, event: &RestoreEvent) -> bool {
        self.asked.lock().unwrap().push(event.entity_id.clone());
        self.veto_entity_id.as_deref() != Some(event.entity_id.as_str())
    }

    fn restored(&self, event: &RestoreEvent, outcome: &RestoreOutcome) {
        self.notified
            .lock()
            .unwrap()
            .push((event.entity_id.clone(), outcome.clone()));
    }
}
