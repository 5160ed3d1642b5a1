//! Contract between the cache and the runtime that owns live sessions.
//!
//! The cache never builds live sessions itself. It hands a decoded
//! [`SessionRecord`] to a [`SessionOwner`], which binds it to its own
//! active-session bookkeeping and returns a handle that can serve requests.

use crate::error::BoxError;
use crate::record::SessionRecord;

/// An attached session handle held in the hot tier.
///
/// Handles are cheap to clone (typically an `Arc` inside) and are never
/// written to the durable tier directly; [`LiveSession::record`] produces the
/// state that is.
pub trait LiveSession: Clone + Send + Sync + 'static {
    /// Session identifier.
    fn id(&self) -> &str;

    /// Snapshot of the durable state of this session.
    fn record(&self) -> SessionRecord;
}

/// Runtime that can turn a stored record back into a live session.
///
/// The cache mirrors its hot tier into the owner: [`attached`] runs when a
/// session becomes the served entry for its id and [`released`] when the
/// cache stops serving it. Both hooks run under the hot-tier write lock, so
/// they must be quick and must not call back into the cache.
///
/// [`attached`]: SessionOwner::attached
/// [`released`]: SessionOwner::released
pub trait SessionOwner: Send + Sync + 'static {
    /// Live session type produced by reattachment.
    type Session: LiveSession;

    /// Build a live session bound to this owner from `record`.
    ///
    /// Concurrent loads of the same session may call this more than once;
    /// only the session the cache ends up serving is passed to
    /// [`attached`](SessionOwner::attached).
    fn reattach(&self, record: SessionRecord) -> Result<Self::Session, BoxError>;

    /// `session` is now the hot-tier entry for its id. Replaces any
    /// earlier session with the same id.
    fn attached(&self, _session: &Self::Session) {}

    /// The hot tier no longer holds `session_id`: deleted, expired, or the
    /// cache was closed.
    fn released(&self, _session_id: &str) {}
}
