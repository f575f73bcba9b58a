use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::{DeviceId, PortNo, SwitchId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHop {
    Output(PortNo),
    Unreachable,
}

/// Routing decision of one switch for one destination host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Hop count to the attachment switch, `None` when unreachable.
    pub distance: Option<u32>,
    pub next_hop: NextHop,
}

impl RouteEntry {
    pub const UNREACHABLE: RouteEntry = RouteEntry {
        distance: None,
        next_hop: NextHop::Unreachable,
    };

    pub fn output(distance: u32, port: PortNo) -> Self {
        Self {
            distance: Some(distance),
            next_hop: NextHop::Output(port),
        }
    }

    pub fn port(&self) -> Option<PortNo> {
        match self.next_hop {
            NextHop::Output(port) => Some(port),
            NextHop::Unreachable => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.distance == Some(0)
    }
}

/// Route mapping for one destination host over every switch of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoutes {
    pub device: DeviceId,
    pub ipv4: Ipv4Addr,
    pub entries: BTreeMap<SwitchId, RouteEntry>,
}

impl HostRoutes {
    pub fn entry(&self, switch: SwitchId) -> RouteEntry {
        self.entries
            .get(&switch)
            .copied()
            .unwrap_or(RouteEntry::UNREACHABLE)
    }

    pub fn reachable(&self) -> impl Iterator<Item = (SwitchId, PortNo)> + '_ {
        self.entries
            .iter()
            .filter_map(|(switch, entry)| entry.port().map(|port| (*switch, port)))
    }

    pub fn unreachable(&self) -> impl Iterator<Item = SwitchId> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.next_hop == NextHop::Unreachable)
            .map(|(switch, _)| *switch)
    }
}
