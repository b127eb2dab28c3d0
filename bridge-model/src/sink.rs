//! External-sink capability boundary.
//!
//! The Touch Portal client transport itself is out of scope; the state
//! engine only needs to call four operations on it. Modeling that boundary
//! as a narrow trait (rather than depending on a concrete client type) lets
//! [`crate::state::TPState`] be constructed and tested without a running
//! Touch Portal process, the way the plugin's `XplmApi` splits between a
//! production implementation and `MockXplm`.

/// Narrow capability interface standing in for the Touch Portal client.
pub trait TpSink: Send + Sync {
    /// Create a new dynamic state with an initial value.
    fn create_state(&self, internal_name: &str, description: &str, default: &str);
    /// Push a new value for an existing state.
    fn state_update(&self, internal_name: &str, value: &str);
    /// Remove a dynamic state, e.g. on reinit.
    fn remove_state(&self, internal_name: &str);
    /// Whether the underlying transport is currently connected.
    fn is_connected(&self) -> bool;
}
