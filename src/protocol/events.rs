use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::network::{AttachmentPoint, Link};
use crate::{DeviceId, PortNo, SwitchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOperation {
    Up,
    Down,
}

/// Link discovery report. A switch id of `0` marks the host side of a switch-to-host link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub src: SwitchId,
    pub src_port: PortNo,
    pub dst: SwitchId,
    pub dst_port: PortNo,
    pub operation: LinkOperation,
}

impl LinkUpdate {
    pub fn is_host_link(&self) -> bool {
        self.src == 0 || self.dst == 0
    }

    pub fn link(&self) -> Link {
        Link::new(self.src, self.src_port, self.dst, self.dst_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortChange {
    Add,
    Delete,
    Up,
    Down,
}

impl PortChange {
    pub fn enables(&self) -> bool {
        matches!(self, PortChange::Add | PortChange::Up)
    }
}

/// What device tracking knows about a host at the time of the notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub device: DeviceId,
    #[serde(default)]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    pub attachment: Option<AttachmentPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopologyEvent {
    SwitchAdded {
        switch: SwitchId,
        #[serde(default)]
        ports: BTreeSet<PortNo>,
    },
    SwitchRemoved {
        switch: SwitchId,
    },
    SwitchPortChanged {
        switch: SwitchId,
        port: PortNo,
        change: PortChange,
    },
    LinksUpdated {
        updates: Vec<LinkUpdate>,
    },
    HostAdded(DeviceUpdate),
    HostIpChanged(DeviceUpdate),
    HostMoved(DeviceUpdate),
    HostRemoved {
        device: DeviceId,
    },
}

impl TopologyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TopologyEvent::SwitchAdded { .. } => "switch_added",
            TopologyEvent::SwitchRemoved { .. } => "switch_removed",
            TopologyEvent::SwitchPortChanged { .. } => "switch_port_changed",
            TopologyEvent::LinksUpdated { .. } => "links_updated",
            TopologyEvent::HostAdded(_) => "host_added",
            TopologyEvent::HostIpChanged(_) => "host_ip_changed",
            TopologyEvent::HostMoved(_) => "host_moved",
            TopologyEvent::HostRemoved { .. } => "host_removed",
        }
    }
}
