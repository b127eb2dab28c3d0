//! Concrete [`TpSink`] implementations.
//!
//! The real Touch Portal client transport is out of scope (§1); `LoggingSink`
//! stands in for it until one is wired up, and `MockTpSink` — modeled
//! directly on the plugin's `MockXplm` — is what the test suite uses.

use std::sync::Mutex;

use bridge_model::TpSink;
use tracing::info;

/// Logs every call through `tracing` and reports permanently connected.
/// Placeholder for the real Touch Portal client, which this crate does not
/// implement.
#[derive(Default)]
pub struct LoggingSink;

impl TpSink for LoggingSink {
    fn create_state(&self, internal_name: &str, description: &str, default: &str) {
        info!(internal_name, description, default, "create_state");
    }

    fn state_update(&self, internal_name: &str, value: &str) {
        info!(internal_name, value, "state_update");
    }

    fn remove_state(&self, internal_name: &str) {
        info!(internal_name, "remove_state");
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[derive(Default)]
struct MockInner {
    created: Vec<(String, String, String)>,
    updates: Vec<(String, String)>,
    removed: Vec<String>,
    connected: bool,
}

/// In-memory recorder of every sink call, in order, with a togglable
/// connected flag — the `MockXplm` of the external-sink boundary.
pub struct MockTpSink {
    inner: Mutex<MockInner>,
}

impl MockTpSink {
    pub fn new() -> Self {
        Self { inner: Mutex::new(MockInner { connected: true, ..Default::default() }) }
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().unwrap().connected = connected;
    }

    pub fn created_states(&self) -> Vec<(String, String, String)> {
        self.inner.lock().unwrap().created.clone()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().updates.clone()
    }

    pub fn removed_states(&self) -> Vec<String> {
        self.inner.lock().unwrap().removed.clone()
    }
}

impl Default for MockTpSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TpSink for MockTpSink {
    fn create_state(&self, internal_name: &str, description: &str, default: &str) {
        self.inner.lock().unwrap().created.push((
            internal_name.to_string(),
            description.to_string(),
            default.to_string(),
        ));
    }

    fn state_update(&self, internal_name: &str, value: &str) {
        self.inner.lock().unwrap().updates.push((internal_name.to_string(), value.to_string()));
    }

    fn remove_state(&self, internal_name: &str) {
        self.inner.lock().unwrap().removed.push(internal_name.to_string());
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().unwrap().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_calls_in_order() {
        let sink = MockTpSink::new();
        sink.create_state("A", "Alpha", "None");
        sink.state_update("A", "1");
        sink.state_update("A", "2");
        sink.remove_state("A");
        assert_eq!(sink.created_states(), vec![("A".into(), "Alpha".into(), "None".into())]);
        assert_eq!(sink.updates(), vec![("A".into(), "1".into()), ("A".into(), "2".into())]);
        assert_eq!(sink.removed_states(), vec!["A".to_string()]);
    }

    #[test]
    fn connected_flag_is_togglable() {
        let sink = MockTpSink::new();
        assert!(sink.is_connected());
        sink.set_connected(false);
        assert!(!sink.is_connected());
    }
}
