pub mod algorithms;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod router;
pub mod routing_table;
pub mod switch_commands;

/// Datapath id of a switch. `0` is reserved by link discovery for the host side of a link.
pub type SwitchId = u64;
pub type PortNo = u32;
/// Flow table this engine is allowed to program.
pub type TableId = u8;
pub type DeviceId = String;

pub use config::RoutingConfig;
pub use error::{RoutingError, SinkError};
pub use network::{AttachmentPoint, Host, Link, Switch, Topology, TopologyStore};
pub use protocol::{EventDispatcher, TopologyEvent};
pub use router::{L3Routing, RoutingEngine, RoutingHandle};
pub use routing_table::{HostRoutes, NextHop, RouteEntry};
