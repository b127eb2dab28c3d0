//! Data model shared by the Touch Portal ↔ X-Plane bridge: datarefs,
//! derived states, the dynamic-states config schema, the RPN evaluator, and
//! the crate-wide error taxonomy. No sockets, no threads — everything here
//! is pure data and pure computation so it can be exercised without a
//! running simulator or Touch Portal client.

pub mod config;
pub mod dataref;
pub mod error;
pub mod rpn;
pub mod sink;
pub mod state;

pub use config::{DynamicStatesFile, PageConfig, StateConfig, DYNAMIC_STATES_FILE_VERSION};
pub use dataref::{Dataref, DatarefListener, DatarefRegistry};
pub use error::{BridgeError, Result};
pub use sink::TpSink;
pub use state::TPState;
