use thiserror::Error;

use crate::SwitchId;

/// Failure reported by the switch-programming transport for a single command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("switch s{0} is not reachable")]
    SwitchUnreachable(SwitchId),

    #[error("switch s{switch} rejected rule: {reason}")]
    Rejected { switch: SwitchId, reason: String },

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("event queue is closed")]
    QueueClosed,

    #[error("event queue is full")]
    QueueFull,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
