//! Host integration traits.
//!
//! The engine never decides when a rebuild runs. Hosts implement
//! [`BuildScheduler`] to receive rebuild requests from the state update queue and
//! run [`build_component`](crate::build_component) according to their own policy
//! (synchronously on the main thread or dispatched to a worker).

use crate::state::UpdateMode;

/// Receives rebuild requests for a component tree.
///
/// Implementations must be safe to call from any thread; the update queue calls
/// it from whichever thread announced the state change.
pub trait BuildScheduler: Send + Sync {
    /// Request a rebuild. `mode` is [`UpdateMode::Synchronous`] only when the
    /// request was announced on the queue's owner thread.
    fn schedule_build(&self, mode: UpdateMode);
}
