//! Entry point: wires the data model, transport, and lifecycle coordinator
//! together and runs until terminated.
//!
//! The real Touch Portal client connection (the source of `init`/`reinit`/
//! `terminate`/`entering_page`/`leaving_page` events, and the far end of
//! `TpSink`) is out of scope — this binary starts up against a fixed
//! dynamic-states path and a [`sink::LoggingSink`], then idles, which is
//! enough to exercise the whole bridge end to end against a real simulator.

use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tp_xplane_bridge::{
    beacon::MulticastBeaconFinder, pages::PageScopeController, sink::LoggingSink,
    subscriptions::SubscriptionMultiplexer, transport::DataPlane, BeaconSupervisor,
    LifecycleCoordinator,
};
use tracing_subscriber::EnvFilter;

fn dynamic_states_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("dynamic-states.json"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = Arc::new(bridge_model::DatarefRegistry::new());
    let sink: Arc<dyn bridge_model::TpSink> = Arc::new(LoggingSink);

    let socket = Arc::new(UdpSocket::bind("0.0.0.0:0").expect("failed to bind data-plane socket"));
    let subscriptions = Arc::new(SubscriptionMultiplexer::new(Arc::clone(&socket)));
    let pages = Arc::new(PageScopeController::new(Arc::clone(&subscriptions)));
    let transport = Arc::new(DataPlane::new(socket, Arc::clone(&registry), Arc::clone(&subscriptions)));
    let pages_for_connect = Arc::clone(&pages);
    let supervisor = Arc::new(BeaconSupervisor::with_on_connect(
        Arc::new(MulticastBeaconFinder),
        transport,
        move |addr| pages_for_connect.set_target(addr),
    ));

    let coordinator = LifecycleCoordinator::new(registry, sink, Arc::clone(&pages), Arc::clone(&supervisor));

    let path = dynamic_states_path();
    if let Err(err) = coordinator.init(&path) {
        tracing::error!(%err, "failed to initialize bridge");
        std::process::exit(1);
    }

    tracing::info!("bridge running, press Ctrl+C to exit");
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
