//! Beacon supervisor (C5): multicast-discovers the simulator, hands the
//! discovered address to a [`UdpTransport`], and keeps retrying on loss.
//!
//! Grounded on the Python plugin's `start`/`stop`/`_reconnect_loop`: a single
//! background thread alternates between "look for a beacon" and "drive the
//! transport until it tells us the connection is lost", composing a
//! transport value rather than subclassing it.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bridge_model::{BridgeError, Result};
use tracing::{info, warn};
use xplane_wire::{parse_beacon, Beacon};

use crate::stop_signal::StopSignal;
use crate::transport::UdpTransport;

pub const BEACON_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 1, 1);
pub const BEACON_PORT: u16 = 49707;
pub const BEACON_TIMEOUT: Duration = Duration::from_secs(3);
pub const RECONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Warn only every Nth consecutive "beacon not found" attempt, so a long
/// outage doesn't flood the log.
pub const WARN_FREQ: u32 = 10;

#[derive(Debug, Clone)]
pub struct DiscoveredBeacon {
    pub beacon: Beacon,
    pub addr: SocketAddr,
}

/// Dependency-injection seam so the reconnect loop can be tested without a
/// real multicast socket.
pub trait BeaconFinder: Send + Sync {
    fn find(&self) -> Result<DiscoveredBeacon>;
}

/// Production finder: joins the X-Plane multicast group and waits up to
/// [`BEACON_TIMEOUT`] for one valid `BECN` packet.
pub struct MulticastBeaconFinder;

impl BeaconFinder for MulticastBeaconFinder {
    fn find(&self) -> Result<DiscoveredBeacon> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, BEACON_PORT))
            .map_err(|_| BridgeError::ConnectionNotFound)?;
        socket
            .join_multicast_v4(&BEACON_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)
            .map_err(|_| BridgeError::ConnectionNotFound)?;
        socket.set_read_timeout(Some(BEACON_TIMEOUT)).map_err(|_| BridgeError::ConnectionNotFound)?;

        let mut buf = [0u8; 512];
        let (n, from) = socket.recv_from(&mut buf).map_err(|_| BridgeError::ConnectionNotFound)?;
        let beacon = parse_beacon(&buf[..n])?;
        let addr = SocketAddr::new(from.ip(), beacon.port);
        Ok(DiscoveredBeacon { beacon, addr })
    }
}

struct Inner {
    handle: Option<JoinHandle<()>>,
    stop: Arc<StopSignal>,
}

/// Drives `finder`/`transport` on a background thread: look for a beacon,
/// start the transport against it, wait for the transport (via `on_lost`'s
/// companion flag) to report the connection gone, repeat.
pub struct BeaconSupervisor<F: BeaconFinder + 'static, T: UdpTransport + 'static> {
    finder: Arc<F>,
    transport: Arc<T>,
    connected: Arc<AtomicBool>,
    inner: Mutex<Inner>,
    on_connect: Arc<dyn Fn(SocketAddr) + Send + Sync>,
}

impl<F: BeaconFinder + 'static, T: UdpTransport + 'static> BeaconSupervisor<F, T> {
    pub fn new(finder: Arc<F>, transport: Arc<T>) -> Self {
        Self::with_on_connect(finder, transport, |_| {})
    }

    /// Like [`Self::new`], but `on_connect` is invoked with the beacon's
    /// advertised address right after the transport starts — the page
    /// scope controller uses this to learn where to send subscribe/command
    /// frames once a connection actually exists.
    pub fn with_on_connect(
        finder: Arc<F>,
        transport: Arc<T>,
        on_connect: impl Fn(SocketAddr) + Send + Sync + 'static,
    ) -> Self {
        Self {
            finder,
            transport,
            connected: Arc::new(AtomicBool::new(false)),
            inner: Mutex::new(Inner { handle: None, stop: Arc::new(StopSignal::new()) }),
            on_connect: Arc::new(on_connect),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Start the reconnect loop. Idempotent: a second call while already
    /// running is a no-op.
    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.handle.is_some() {
            return;
        }
        let stop = Arc::new(StopSignal::new());
        inner.stop = Arc::clone(&stop);

        let finder = Arc::clone(&self.finder);
        let transport = Arc::clone(&self.transport);
        let connected = Arc::clone(&self.connected);
        let on_connect = Arc::clone(&self.on_connect);

        let handle = std::thread::Builder::new()
            .name("beacon_supervisor".into())
            .spawn(move || reconnect_loop(&*finder, &*transport, &connected, &stop, &*on_connect))
            .expect("failed to spawn beacon_supervisor thread");
        inner.handle = Some(handle);
    }

    /// Stop the reconnect loop and tear down any active connection.
    /// `transport.stop()` is idempotent, so it's safe to call unconditionally
    /// even if the reader had already declared the connection lost on its
    /// own and torn the transport down first.
    pub fn stop(&self) {
        let (stop, handle) = {
            let mut inner = self.inner.lock().unwrap();
            (Arc::clone(&inner.stop), inner.handle.take())
        };
        stop.set();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.transport.cleanup();
        self.transport.stop();
    }
}

fn reconnect_loop<F: BeaconFinder + ?Sized, T: UdpTransport + ?Sized>(
    finder: &F,
    transport: &T,
    connected: &AtomicBool,
    stop: &StopSignal,
    on_connect: &(dyn Fn(SocketAddr) + Send + Sync),
) {
    let mut not_found_attempts: u32 = 0;

    while !stop.is_set() {
        match finder.find() {
            Ok(discovered) => {
                not_found_attempts = 0;
                info!(addr = %discovered.addr, xplane_version = discovered.beacon.xplane_version, "beacon found, connecting");
                transport.start(discovered.addr);
                on_connect(discovered.addr);
                connected.store(true, Ordering::SeqCst);

                // Transport threads run until the reader declares the
                // connection lost; poll `is_alive` so we notice that
                // without the transport having to know about `stop`.
                while transport.is_alive() && !stop.is_set() {
                    stop.wait_timeout(Duration::from_millis(250));
                }
                connected.store(false, Ordering::SeqCst);

                if !stop.is_set() {
                    warn!("connection lost, will attempt to reconnect");
                    transport.stop();
                }
            }
            Err(err) => {
                not_found_attempts += 1;
                if not_found_attempts % WARN_FREQ == 1 {
                    warn!(attempts = not_found_attempts, %err, "beacon not found");
                }
            }
        }

        if !stop.is_set() {
            stop.wait_timeout(RECONNECT_TIMEOUT);
        }
    }
}
