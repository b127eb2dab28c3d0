//! Subscription multiplexer (C4): the index↔path bijection the simulator's
//! RREF protocol needs, plus the refcount map page activations drive.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};

use bridge_model::{BridgeError, Result};
use tracing::{debug, warn};
use xplane_wire::{encode_cmnd, encode_dref, encode_rref_request, DrefValue};

/// Hard cap on simultaneously subscribed datarefs — X-Plane becomes
/// unreliable well past this (observed CTDs around ~100).
pub const MAX_SUBSCRIPTIONS: usize = 80;
pub const DEFAULT_REQ_FREQUENCY: i32 = 1;

struct Inner {
    index_to_path: HashMap<i32, String>,
    path_to_index: HashMap<String, i32>,
    next_index: i32,
    refcount: HashMap<String, u32>,
}

/// Owns the RREF subscribe/unsubscribe side of the data-plane socket.
pub struct SubscriptionMultiplexer {
    inner: Mutex<Inner>,
    socket: Arc<UdpSocket>,
}

impl SubscriptionMultiplexer {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                index_to_path: HashMap::new(),
                path_to_index: HashMap::new(),
                next_index: 0,
                refcount: HashMap::new(),
            }),
            socket,
        }
    }

    /// Number of currently-subscribed (index-bound) paths.
    pub fn subscribed_count(&self) -> usize {
        self.inner.lock().unwrap().index_to_path.len()
    }

    pub fn is_subscribed(&self, path: &str) -> bool {
        self.inner.lock().unwrap().path_to_index.contains_key(path)
    }

    fn send_rref(&self, target: SocketAddr, freq: i32, index: i32, path: &str) -> Result<()> {
        let frame = encode_rref_request(freq, index, path);
        self.socket
            .send_to(&frame, target)
            .map(|_| ())
            .map_err(|_| BridgeError::ConnectionLost { timeouts: 0 })
    }

    /// Subscribe (or re-subscribe / unsubscribe with `freq == 0`) a path.
    ///
    /// Reusing an already-subscribed path's index re-emits the RREF frame at
    /// the new frequency; `freq == 0` additionally drops the local
    /// `index→path` binding (X-Plane is still told to stop, but a trailing
    /// in-flight packet for the old index is now unambiguously stale).
    pub fn subscribe(&self, target: SocketAddr, path: &str, freq: i32) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(&index) = inner.path_to_index.get(path) {
            if freq == 0 {
                inner.path_to_index.remove(path);
                inner.index_to_path.remove(&index);
            }
            drop(inner);
            return self.send_rref(target, freq, index, path);
        }

        if freq == 0 {
            // Unsubscribing a path we never actually subscribed to: nothing
            // local to clean up, and nothing useful to tell X-Plane either.
            debug!(path, "unsubscribe requested for unknown path, ignoring");
            return Ok(());
        }

        if inner.index_to_path.len() >= MAX_SUBSCRIPTIONS {
            warn!(path, count = inner.index_to_path.len(), "subscription capacity exceeded");
            return Err(BridgeError::CapacityExceeded { max: MAX_SUBSCRIPTIONS });
        }

        let index = inner.next_index;
        inner.next_index += 1;
        inner.index_to_path.insert(index, path.to_string());
        inner.path_to_index.insert(path.to_string(), index);
        drop(inner);
        self.send_rref(target, freq, index, path)
    }

    /// Resolve an inbound RREF response index to its dataref path, if still
    /// bound. Unknown indices are the dispatcher's cue to silently discard.
    pub fn path_for_index(&self, index: i32) -> Option<String> {
        self.inner.lock().unwrap().index_to_path.get(&index).cloned()
    }

    /// Bump a path's page-reference count. Returns `true` on a 0→1
    /// transition (caller should subscribe at the simulator).
    pub fn add_reference(&self, path: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.refcount.entry(path.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop a path's page-reference count. Returns `true` on a 1→0
    /// transition (caller should unsubscribe at the simulator).
    pub fn remove_reference(&self, path: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.refcount.get_mut(path) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                inner.refcount.remove(path);
                true
            }
            None => false,
        }
    }

    pub fn reference_count(&self, path: &str) -> u32 {
        self.inner.lock().unwrap().refcount.get(path).copied().unwrap_or(0)
    }

    /// Every path currently bound to an index, for `cleanup()` to unwind.
    pub fn subscribed_paths(&self) -> Vec<String> {
        self.inner.lock().unwrap().path_to_index.keys().cloned().collect()
    }

    /// Re-emit an RREF subscribe frame at `target` for every path still
    /// bound to an index. A reconnect gives up a fresh UDP link to a
    /// simulator that has forgotten every prior RREF registration, while
    /// this table's index↔path bookkeeping survives the drop untouched —
    /// so the bookkeeping alone is not enough, the simulator has to be told
    /// again which indices it should resume streaming.
    pub fn resubscribe_all(&self, target: SocketAddr) -> Result<()> {
        let bound: Vec<(i32, String)> = {
            let inner = self.inner.lock().unwrap();
            inner.index_to_path.iter().map(|(index, path)| (*index, path.clone())).collect()
        };
        for (index, path) in bound {
            self.send_rref(target, DEFAULT_REQ_FREQUENCY, index, &path)?;
        }
        Ok(())
    }

    /// Send a CMND frame. This is the sole UDP egress for outbound control
    /// (§2's "external action → C9/C8 → C4 → UDP socket"), so command
    /// execution and dataref writes both route through here alongside RREF
    /// subscribe/unsubscribe.
    pub fn send_command(&self, target: SocketAddr, path: &str) -> Result<()> {
        let frame = encode_cmnd(path);
        self.socket.send_to(&frame, target).map(|_| ()).map_err(|_| BridgeError::ConnectionLost { timeouts: 0 })
    }

    /// Write a dataref. `SetDataref` always coerces to a float per §6.
    pub fn write_dataref(&self, target: SocketAddr, path: &str, value: f32) -> Result<()> {
        let frame = encode_dref(path, DrefValue::Float(value));
        self.socket.send_to(&frame, target).map(|_| ()).map_err(|_| BridgeError::ConnectionLost { timeouts: 0 })
    }
}
