pub mod dispatcher;
pub mod events;
pub mod route_manager;
pub mod rules;

pub use dispatcher::{Dispatch, EventDispatcher, RecomputeScope};
pub use events::{DeviceUpdate, LinkOperation, LinkUpdate, PortChange, TopologyEvent};
pub use route_manager::RouteManager;
pub use rules::{Action, Field, FieldValue, FlowMatch, FlowRule, RuleCommand};
