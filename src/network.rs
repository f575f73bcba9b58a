pub mod host;
pub mod topology;

pub use host::{AttachmentPoint, Host};
pub use topology::{Link, Switch, Topology, TopologyStore};
