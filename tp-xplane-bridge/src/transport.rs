//! Concrete data-plane transport: owns the reader and dispatcher threads and
//! exposes the `start`/`stop`/`cleanup` hooks the beacon supervisor drives
//! by composition rather than subclassing.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bridge_model::DatarefRegistry;
use tracing::{debug, warn};

use crate::dispatcher::{self, DispatchItem};
use crate::reader;
use crate::stop_signal::StopSignal;
use crate::subscriptions::SubscriptionMultiplexer;

/// Hook surface the beacon supervisor drives; a `BeaconSupervisor` owns a
/// `dyn UdpTransport` value instead of subclassing it.
pub trait UdpTransport: Send + Sync {
    fn start(&self, target: SocketAddr);
    fn stop(&self);
    fn cleanup(&self);
    /// `false` once the reader has declared the connection lost (five
    /// consecutive socket timeouts) — the supervisor polls this to notice
    /// a drop it didn't itself initiate.
    fn is_alive(&self) -> bool;
}

struct Running {
    reader_stop: Arc<StopSignal>,
    reader_handle: JoinHandle<()>,
    dispatch_tx: Sender<DispatchItem>,
    dispatcher_handle: JoinHandle<()>,
}

/// Default [`UdpTransport`]: a socket shared by reader and subscription
/// writer, a dataref registry, and the index↔path multiplexer.
pub struct DataPlane {
    socket: Arc<UdpSocket>,
    registry: Arc<DatarefRegistry>,
    subscriptions: Arc<SubscriptionMultiplexer>,
    running: Mutex<Option<Running>>,
    target: Mutex<Option<SocketAddr>>,
    lost: Arc<AtomicBool>,
}

impl DataPlane {
    pub fn new(socket: Arc<UdpSocket>, registry: Arc<DatarefRegistry>, subscriptions: Arc<SubscriptionMultiplexer>) -> Self {
        Self {
            socket,
            registry,
            subscriptions,
            running: Mutex::new(None),
            target: Mutex::new(None),
            lost: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.subscriptions
    }

    pub fn registry(&self) -> &Arc<DatarefRegistry> {
        &self.registry
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }
}

impl UdpTransport for DataPlane {
    fn start(&self, target: SocketAddr) {
        let mut running = self.running.lock().unwrap();
        if running.is_some() {
            debug!("data plane already running");
            return;
        }
        *self.target.lock().unwrap() = Some(target);
        self.lost.store(false, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel();
        let reader_stop = Arc::new(StopSignal::new());
        let lost = Arc::clone(&self.lost);

        let reader_handle = reader::spawn(Arc::clone(&self.socket), tx.clone(), Arc::clone(&reader_stop), move || {
            lost.store(true, Ordering::SeqCst);
        });
        let dispatcher_handle = dispatcher::spawn(rx, Arc::clone(&self.registry), Arc::clone(&self.subscriptions));

        *running = Some(Running { reader_stop, reader_handle, dispatch_tx: tx, dispatcher_handle });
        drop(running);

        // A reconnect hands us a simulator that has forgotten every RREF
        // registration it had before the drop; the index↔path bookkeeping
        // survives locally, so replay it against the new connection.
        if let Err(err) = self.subscriptions.resubscribe_all(target) {
            warn!(%err, "failed to re-emit subscriptions after reconnect");
        }
    }

    fn stop(&self) {
        let Some(running) = self.running.lock().unwrap().take() else {
            debug!("data plane not running");
            return;
        };
        let _ = running.dispatch_tx.send(DispatchItem::Terminate);
        let _ = running.dispatcher_handle.join();
        running.reader_stop.set();
        let _ = running.reader_handle.join();
    }

    fn cleanup(&self) {
        // Called by the supervisor just before disconnecting: best-effort
        // tell the simulator to stop every active subscription.
        let Some(target) = *self.target.lock().unwrap() else {
            return;
        };
        for path in self.subscriptions.subscribed_paths() {
            let _ = self.subscriptions.subscribe(target, &path, 0);
        }
    }

    fn is_alive(&self) -> bool {
        self.is_running() && !self.lost.load(Ordering::SeqCst)
    }
}
