//! Dataref dispatcher (C7): drains the reader's queue, updates canonical
//! dataref values, and lets [`Dataref::update_value`] fire listener
//! notifications when a page actually cares about the path.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use bridge_model::DatarefRegistry;
use tracing::debug;

use crate::subscriptions::SubscriptionMultiplexer;

/// Unit of work enqueued by the reader.
pub enum DispatchItem {
    Value(i32, f64),
    Terminate,
}

/// Drain `rx` until [`DispatchItem::Terminate`] or the channel closes.
pub fn run(rx: &Receiver<DispatchItem>, registry: &DatarefRegistry, subscriptions: &SubscriptionMultiplexer) {
    while let Ok(item) = rx.recv() {
        match item {
            DispatchItem::Terminate => break,
            DispatchItem::Value(index, raw) => {
                let Some(path) = subscriptions.path_for_index(index) else {
                    debug!(index, "no dataref for index, probably no longer monitored");
                    continue;
                };
                let dataref = registry.get(&path);
                let cascade = subscriptions.reference_count(&path) >= 1;
                dataref.update_value(raw, cascade);
            }
        }
    }
}

/// Spawn the dispatcher loop on its own thread.
pub fn spawn(
    rx: Receiver<DispatchItem>,
    registry: Arc<DatarefRegistry>,
    subscriptions: Arc<SubscriptionMultiplexer>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("dataref_dispatcher".into())
        .spawn(move || run(&rx, &registry, &subscriptions))
        .expect("failed to spawn dataref_dispatcher thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::mpsc;

    fn harness() -> (DatarefRegistry, SubscriptionMultiplexer) {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        (DatarefRegistry::new(), SubscriptionMultiplexer::new(socket))
    }

    #[test]
    fn unknown_index_is_discarded_without_panic() {
        let (registry, subs) = harness();
        let (tx, rx) = mpsc::channel();
        tx.send(DispatchItem::Value(999, 1.0)).unwrap();
        tx.send(DispatchItem::Terminate).unwrap();
        run(&rx, &registry, &subs); // must return cleanly
    }

    #[test]
    fn known_index_updates_dataref_value() {
        let (registry, subs) = harness();
        let target = "127.0.0.1:1".parse().unwrap();
        subs.subscribe(target, "sim/cockpit/alt", 1).unwrap();

        let (tx, rx) = mpsc::channel();
        tx.send(DispatchItem::Value(0, 1234.0)).unwrap();
        tx.send(DispatchItem::Terminate).unwrap();
        run(&rx, &registry, &subs);

        let dref = registry.get("sim/cockpit/alt");
        assert_eq!(dref.value(), Some(1234.0));
    }

    #[test]
    fn terminate_sentinel_stops_loop() {
        let (registry, subs) = harness();
        let (tx, rx) = mpsc::channel();
        tx.send(DispatchItem::Terminate).unwrap();
        tx.send(DispatchItem::Value(0, 5.0)).unwrap(); // never processed
        run(&rx, &registry, &subs);
        assert!(!subs.is_subscribed("sim/never"));
    }
}
