//! Actor identity resolution.
//!
//! Every delete transaction records who started it, and every restore records
//! who performed it. The identity comes from an injected [`ActorProvider`];
//! when none is configured the [`UNKNOWN_ACTOR_ID`] sentinel is stored.

use std::fmt;
use std::sync::Arc;

/// Identity of the user or process performing a delete or restore.
pub type ActorId = i64;

/// Actor id recorded when no provider is configured.
///
/// The log tables declare the actor columns `NOT NULL` for deletions, so the
/// absence of an actor is stored as this value rather than `NULL`.
pub const UNKNOWN_ACTOR_ID: ActorId = -1;

/// Resolves the actor for the operation in progress.
pub trait ActorProvider: Send + Sync {
    /// Return the current actor id.
    fn current_actor(&self) -> ActorId;
}

impl<F> ActorProvider for F
where
    F: Fn() -> ActorId + Send + Sync,
{
    fn current_actor(&self) -> ActorId {
        self()
    }
}

/// Provider that always reports [`UNKNOWN_ACTOR_ID`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UnknownActor;

impl ActorProvider for UnknownActor {
    fn current_actor(&self) -> ActorId {
        UNKNOWN_ACTOR_ID
    }
}

/// Provider that always reports the same actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedActor(pub ActorId);

impl ActorProvider for FixedActor {
    fn current_actor(&self) -> ActorId {
        self.0
    }
}

/// Shared handle to an actor provider.
#[derive(Clone)]
pub struct SharedActorProvider(Arc<dyn ActorProvider>);

impl SharedActorProvider {
    /// Wrap a provider.
    pub fn new(provider: impl ActorProvider + 'static) -> Self {
        Self(Arc::new(provider))
    }

    /// Provider for an optional configured actor id, falling back to the sentinel.
    pub fn from_config(actor_id: Option<ActorId>) -> Self {
        match actor_id {
            Some(id) => Self::new(FixedActor(id)),
            None => Self::new(UnknownActor),
        }
    }

    /// Resolve the current actor.
    pub fn current_actor(&self) -> ActorId {
        self.0.current_actor()
    }
}

impl Default for SharedActorProvider {
    fn default() -> Self {
        Self::new(UnknownActor)
    }
}

impl fmt::Debug for SharedActorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedActorProvider").finish_non_exhaustive()
    }
}
