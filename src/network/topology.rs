use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::host::Host;
use crate::{DeviceId, PortNo, SwitchId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub id: SwitchId,
    pub ports: BTreeSet<PortNo>,
}

/// Directed switch-to-switch edge, cost is always one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub src: SwitchId,
    pub src_port: PortNo,
    pub dst: SwitchId,
    pub dst_port: PortNo,
}

impl Link {
    pub fn new(src: SwitchId, src_port: PortNo, dst: SwitchId, dst_port: PortNo) -> Self {
        Self { src, src_port, dst, dst_port }
    }

    pub fn touches(&self, switch: SwitchId) -> bool {
        self.src == switch || self.dst == switch
    }

    /// A port terminates at most one link, so a link sharing either endpoint is superseded.
    pub fn shares_endpoint(&self, other: &Link) -> bool {
        (self.src == other.src && self.src_port == other.src_port)
            || (self.dst == other.dst && self.dst_port == other.dst_port)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}:{} -> s{}:{}", self.src, self.src_port, self.dst, self.dst_port)
    }
}

/// Switches, links and hosts as currently known. Cloned to produce snapshots.
#[derive(Debug, Clone)]
pub struct Topology {
    switches: BTreeMap<SwitchId, Switch>,
    links: Vec<Link>,
    hosts: BTreeMap<DeviceId, Host>,
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self {
            switches: BTreeMap::new(),
            links: Vec::new(),
            hosts: BTreeMap::new(),
            generation: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn list_switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.values()
    }

    pub fn switch_ids(&self) -> Vec<SwitchId> {
        self.switches.keys().copied().collect()
    }

    pub fn switch(&self, id: SwitchId) -> Option<&Switch> {
        self.switches.get(&id)
    }

    pub fn contains_switch(&self, id: SwitchId) -> bool {
        self.switches.contains_key(&id)
    }

    /// Links in discovery order.
    pub fn list_links(&self) -> &[Link] {
        &self.links
    }

    pub fn list_hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host(&self, device: &str) -> Option<&Host> {
        self.hosts.get(device)
    }

    fn touch(&mut self) {
        self.generation += 1;
        self.updated_at = Utc::now();
    }

    pub fn add_switch(&mut self, id: SwitchId, ports: BTreeSet<PortNo>) -> bool {
        if let Some(existing) = self.switches.get_mut(&id) {
            debug!("Switch s{} already known", id);
            if existing.ports == ports {
                return false;
            }
            existing.ports = ports;
            self.touch();
            return true;
        }

        info!("Switch s{} added with {} ports", id, ports.len());
        self.switches.insert(id, Switch { id, ports });
        self.touch();
        true
    }

    /// Removes the switch together with every link touching it.
    pub fn remove_switch(&mut self, id: SwitchId) -> bool {
        if self.switches.remove(&id).is_none() {
            debug!("Switch s{} not known, nothing to remove", id);
            return false;
        }

        let before = self.links.len();
        self.links.retain(|link| !link.touches(id));
        info!("Switch s{} removed ({} links dropped)", id, before - self.links.len());
        self.touch();
        true
    }

    pub fn set_port(&mut self, id: SwitchId, port: PortNo, enabled: bool) -> bool {
        let Some(switch) = self.switches.get_mut(&id) else {
            debug!("Port change on unknown switch s{}", id);
            return false;
        };

        let changed = if enabled {
            switch.ports.insert(port)
        } else {
            switch.ports.remove(&port)
        };
        if changed {
            debug!("Switch s{} port {} {}", id, port, if enabled { "enabled" } else { "disabled" });
            self.touch();
        }
        changed
    }

    pub fn add_link(&mut self, link: Link) -> bool {
        if self.links.contains(&link) {
            debug!("Link {} already known", link);
            return false;
        }

        info!("Link {} added", link);
        self.links.push(link);
        self.touch();
        true
    }

    pub fn remove_link(&mut self, link: &Link) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l != link);
        if self.links.len() == before {
            debug!("Link {} not known, nothing to remove", link);
            return false;
        }

        info!("Link {} removed", link);
        self.touch();
        true
    }

    /// Drops every other link sharing an endpoint with `link`; `link` itself
    /// keeps its place. Returns how many were removed.
    pub fn remove_stale_links(&mut self, link: &Link) -> usize {
        let before = self.links.len();
        self.links.retain(|l| l == link || !l.shares_endpoint(link));
        let removed = before - self.links.len();
        if removed > 0 {
            info!("Removed {} stale link(s) matching {}", removed, link);
            self.touch();
        }
        removed
    }

    /// Inserts or replaces a host, returning the previous record.
    pub fn upsert_host(&mut self, host: Host) -> Option<Host> {
        let previous = self.hosts.insert(host.device.clone(), host.clone());
        match &previous {
            Some(old) if old.same_location(&host) => {
                debug!("Host {} unchanged", host);
            }
            Some(old) => {
                info!("Host {} updated (was {})", host, old);
                self.touch();
            }
            None => {
                info!("Host {} added", host);
                self.touch();
            }
        }
        previous
    }

    pub fn remove_host(&mut self, device: &str) -> Option<Host> {
        let removed = self.hosts.remove(device);
        match &removed {
            Some(host) => {
                info!("Host {} removed", host);
                self.touch();
            }
            None => debug!("Host {} not known, nothing to remove", device),
        }
        removed
    }

    /// Replaces switches and links wholesale, keeping hosts.
    pub fn replace_graph(&mut self, switches: BTreeMap<SwitchId, BTreeSet<PortNo>>, links: Vec<Link>) {
        self.switches = switches
            .into_iter()
            .map(|(id, ports)| (id, Switch { id, ports }))
            .collect();
        self.links.clear();
        for link in links {
            if !self.links.contains(&link) {
                self.links.push(link);
            }
        }
        info!(
            "Topology resynced: {} switches, {} links",
            self.switches.len(),
            self.links.len()
        );
        self.touch();
    }
}

/// Shared handle to the authoritative topology. Each mutator holds the write
/// lock for its whole update, so snapshots never see a partial change.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    inner: Arc<RwLock<Topology>>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Topology {
        self.inner.read().await.clone()
    }

    /// Runs `f` against the topology under the write lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Topology) -> R) -> R {
        let mut guard = self.inner.write().await;
        f(&mut *guard)
    }

    pub async fn add_switch(&self, id: SwitchId, ports: BTreeSet<PortNo>) -> bool {
        self.update(|t| t.add_switch(id, ports)).await
    }

    pub async fn remove_switch(&self, id: SwitchId) -> bool {
        self.update(|t| t.remove_switch(id)).await
    }

    pub async fn add_link(&self, link: Link) -> bool {
        self.update(|t| t.add_link(link)).await
    }

    pub async fn remove_link(&self, link: &Link) -> bool {
        self.update(|t| t.remove_link(link)).await
    }

    pub async fn upsert_host(&self, host: Host) -> Option<Host> {
        self.update(|t| t.upsert_host(host)).await
    }

    pub async fn remove_host(&self, device: &str) -> Option<Host> {
        self.update(|t| t.remove_host(device)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AttachmentPoint;
    use std::net::Ipv4Addr;

    fn ports(list: &[PortNo]) -> BTreeSet<PortNo> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let mut topo = Topology::new();
        assert!(topo.add_switch(1, ports(&[1, 2])));
        assert!(!topo.add_switch(1, ports(&[1, 2])));

        let link = Link::new(1, 1, 2, 1);
        assert!(topo.add_link(link));
        assert!(!topo.add_link(link));
        assert_eq!(topo.list_links().len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut topo = Topology::new();
        let generation = topo.generation;
        assert!(!topo.remove_switch(9));
        assert!(!topo.remove_link(&Link::new(1, 1, 2, 2)));
        assert!(topo.remove_host("nope").is_none());
        assert_eq!(topo.generation, generation);
    }

    #[test]
    fn test_remove_switch_prunes_links() {
        let mut topo = Topology::new();
        for id in 1..=3 {
            topo.add_switch(id, ports(&[1, 2]));
        }
        topo.add_link(Link::new(1, 2, 2, 1));
        topo.add_link(Link::new(2, 1, 1, 2));
        topo.add_link(Link::new(2, 2, 3, 1));

        assert!(topo.remove_switch(1));
        assert_eq!(topo.list_links(), &[Link::new(2, 2, 3, 1)]);
    }

    #[test]
    fn test_remove_stale_links_by_endpoint() {
        let mut topo = Topology::new();
        topo.add_link(Link::new(1, 2, 2, 1));
        topo.add_link(Link::new(2, 1, 1, 2));
        topo.add_link(Link::new(2, 2, 3, 1));

        // s1:2 now points at s4, the old s1:2 -> s2:1 link is stale
        let removed = topo.remove_stale_links(&Link::new(1, 2, 4, 1));
        assert_eq!(removed, 1);
        assert_eq!(topo.list_links().len(), 2);
    }

    #[test]
    fn test_known_link_is_not_stale_to_itself() {
        let mut topo = Topology::new();
        topo.add_link(Link::new(1, 1, 2, 1));
        topo.add_link(Link::new(1, 2, 3, 1));
        let generation = topo.generation;

        assert_eq!(topo.remove_stale_links(&Link::new(1, 1, 2, 1)), 0);
        assert!(!topo.add_link(Link::new(1, 1, 2, 1)));
        assert_eq!(topo.list_links(), &[Link::new(1, 1, 2, 1), Link::new(1, 2, 3, 1)]);
        assert_eq!(topo.generation, generation);
    }

    #[test]
    fn test_upsert_host_returns_previous() {
        let mut topo = Topology::new();
        let ap = AttachmentPoint { switch: 3, port: 1 };
        let host = Host::new("h1", Ipv4Addr::new(10, 0, 0, 1), Some(ap));

        assert!(topo.upsert_host(host.clone()).is_none());
        let generation = topo.generation;

        let previous = topo.upsert_host(host.clone()).unwrap();
        assert!(previous.same_location(&host));
        assert_eq!(topo.generation, generation);

        let moved = Host::new("h1", host.ipv4, Some(AttachmentPoint { switch: 1, port: 1 }));
        topo.upsert_host(moved);
        assert_eq!(topo.host("h1").unwrap().attachment.unwrap().switch, 1);
        assert!(topo.generation > generation);
    }

    #[test]
    fn test_set_port() {
        let mut topo = Topology::new();
        topo.add_switch(1, ports(&[1]));
        assert!(topo.set_port(1, 2, true));
        assert!(!topo.set_port(1, 2, true));
        assert!(topo.set_port(1, 1, false));
        assert_eq!(topo.switch(1).unwrap().ports, ports(&[2]));
        assert!(!topo.set_port(7, 1, true));
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let store = TopologyStore::new();
        store.add_switch(1, ports(&[1])).await;

        let snapshot = store.snapshot().await;
        store.add_switch(2, ports(&[1])).await;
        store.add_link(Link::new(1, 1, 2, 1)).await;

        assert_eq!(snapshot.switch_ids(), vec![1]);
        assert!(snapshot.list_links().is_empty());
        assert_eq!(store.snapshot().await.switch_ids(), vec![1, 2]);
    }
}
