//! UDP reader (C6): decodes inbound RREF response packets and enqueues
//! `(index, value)` pairs for the dispatcher.

use std::io;
use std::net::UdpSocket;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use xplane_wire::decode_rref_response;

use crate::dispatcher::DispatchItem;
use crate::stop_signal::StopSignal;

pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_TIMEOUT_COUNT: u32 = 5;

/// Run the reader loop with the production socket timeout until `stop` is
/// set or the simulator is declared lost.
pub fn run(socket: &UdpSocket, tx: &Sender<DispatchItem>, stop: &StopSignal, on_lost: impl Fn()) {
    run_with_timeout(socket, tx, stop, on_lost, SOCKET_TIMEOUT);
}

/// Core loop, parameterized on the per-recv timeout so tests don't have to
/// wait out the real 5-second/25-second production values.
fn run_with_timeout(
    socket: &UdpSocket,
    tx: &Sender<DispatchItem>,
    stop: &StopSignal,
    on_lost: impl Fn(),
    timeout: Duration,
) {
    if let Err(err) = socket.set_read_timeout(Some(timeout)) {
        warn!("udp_reader: failed to set socket timeout: {err}");
        return;
    }

    let mut timeouts = 0u32;
    let mut buf = [0u8; xplane_wire::MAX_DATAGRAM_LEN];

    while !stop.is_set() {
        match socket.recv_from(&mut buf) {
            Ok((n, _from)) => {
                timeouts = 0;
                match decode_rref_response(&buf[..n]) {
                    Ok(values) => {
                        for (index, value) in values {
                            if tx.send(DispatchItem::Value(index, value as f64)).is_err() {
                                return; // dispatcher gone, nothing left to do
                            }
                        }
                    }
                    Err(err) => warn!("udp_reader: {err}"),
                }
            }
            Err(err) if is_timeout(&err) => {
                timeouts += 1;
                info!("udp_reader: socket timeout ({timeouts}/{MAX_TIMEOUT_COUNT})");
                if timeouts >= MAX_TIMEOUT_COUNT {
                    warn!("udp_reader: too many timeouts, disconnecting");
                    on_lost();
                    stop.set();
                }
            }
            Err(err) => {
                warn!("udp_reader: socket error, exiting: {err}");
                break;
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Spawn the reader loop on its own thread, handing it a clone of the
/// shared socket and stop signal.
pub fn spawn(
    socket: Arc<UdpSocket>,
    tx: Sender<DispatchItem>,
    stop: Arc<StopSignal>,
    on_lost: impl Fn() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("udp_reader".into())
        .spawn(move || run(&socket, &tx, &stop, on_lost))
        .expect("failed to spawn udp_reader thread")
}
