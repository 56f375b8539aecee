//! Core domain types shared by the reclaim crates.
//!
//! This crate defines:
//! - Delete transaction and log entry identifiers
//! - Actor identity resolution and the unknown-actor sentinel
//! - Configuration for the soft delete coordinator, its log schema and the metadata store
//! - SQL identifier validation for configurable table and column names

pub mod actor;
pub mod config;
pub mod error;
pub mod ident;
pub mod ids;

pub use actor::{
    ActorId, ActorProvider, FixedActor, SharedActorProvider, UNKNOWN_ACTOR_ID, UnknownActor,
};
pub use error::{Error, Result};
pub use ident::Ident;
pub use ids::{LogEntryId, TransactionId};

/// Default name of the deletion marker column on soft-deletable tables.
pub const DEFAULT_MARKER_COLUMN: &str = "delete_transaction_id";
