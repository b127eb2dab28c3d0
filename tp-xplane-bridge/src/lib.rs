//! Touch Portal ↔ X-Plane bridge runtime: beacon discovery, the UDP data
//! plane, subscription bookkeeping, page scoping, and the lifecycle that
//! ties them to a dynamic-states file.
//!
//! The data model (datarefs, states, RPN, config schema, error taxonomy)
//! lives in `bridge-model`; the wire codec lives in `xplane-wire`. Nothing
//! here talks to the real Touch Portal client — that transport is out of
//! scope, and `sink::LoggingSink` stands in for it.

pub mod beacon;
pub mod dispatcher;
pub mod lifecycle;
pub mod pages;
pub mod reader;
pub mod sink;
pub mod stop_signal;
pub mod subscriptions;
pub mod transport;

pub use beacon::{BeaconFinder, BeaconSupervisor, DiscoveredBeacon, MulticastBeaconFinder};
pub use lifecycle::LifecycleCoordinator;
pub use pages::PageScopeController;
pub use sink::{LoggingSink, MockTpSink};
pub use stop_signal::StopSignal;
pub use subscriptions::SubscriptionMultiplexer;
pub use transport::{DataPlane, UdpTransport};
