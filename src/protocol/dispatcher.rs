use log::{debug, error, info, warn};
use std::net::Ipv4Addr;
use tokio::sync::{broadcast, mpsc};

use super::events::{DeviceUpdate, LinkOperation, LinkUpdate, TopologyEvent};
use super::route_manager::RouteManager;
use super::rules::RuleCommand;
use crate::algorithms::calculate_host_routes;
use crate::config::RoutingConfig;
use crate::network::{Host, Topology, TopologyStore};
use crate::switch_commands::{LinkFeed, SwitchRegistry};
use crate::{DeviceId, SwitchId, TableId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecomputeScope {
    None,
    Host(DeviceId),
    Full,
}

/// Result of one event: what was recomputed and the commands to push, in order.
#[derive(Debug)]
pub struct Dispatch {
    pub scope: RecomputeScope,
    pub commands: Vec<RuleCommand>,
}

impl Dispatch {
    fn none() -> Self {
        Self {
            scope: RecomputeScope::None,
            commands: Vec::new(),
        }
    }
}

/// Sole writer of the topology store and the route shadow.
///
/// Each event runs mutate, snapshot, solve and diff to completion before the
/// next one is looked at. Commands leave through an unbounded channel, so
/// switch I/O never holds up the next event.
pub struct EventDispatcher {
    store: TopologyStore,
    routes: RouteManager,
    commands: mpsc::UnboundedSender<Vec<RuleCommand>>,
}

impl EventDispatcher {
    pub fn new(
        config: &RoutingConfig,
        store: TopologyStore,
        commands: mpsc::UnboundedSender<Vec<RuleCommand>>,
    ) -> Self {
        Self {
            store,
            routes: RouteManager::new(config),
            commands,
        }
    }

    pub fn table(&self) -> TableId {
        self.routes.table()
    }

    pub fn routes(&self) -> &RouteManager {
        &self.routes
    }

    pub fn store(&self) -> &TopologyStore {
        &self.store
    }

    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<TopologyEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Event dispatcher started (table {})", self.table());

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event).await;
                    }
                    None => {
                        debug!("Event queue closed");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    while let Ok(event) = events.try_recv() {
                        self.handle_event(event).await;
                    }
                    debug!("Event dispatcher shutting down");
                    break;
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: TopologyEvent) -> RecomputeScope {
        let kind = event.kind();
        let dispatch = self.apply(event).await;
        debug!(
            "{} handled: {:?}, {} command(s)",
            kind,
            dispatch.scope,
            dispatch.commands.len()
        );
        self.publish(dispatch.commands);
        dispatch.scope
    }

    /// Rebuilds switches and links from the collaborators, keeps known hosts,
    /// then purges and recomputes everything.
    pub async fn resync(&mut self, registry: &dyn SwitchRegistry, feed: &dyn LinkFeed) -> RecomputeScope {
        let dispatch = self.apply_resync(registry, feed).await;
        self.publish(dispatch.commands);
        dispatch.scope
    }

    pub async fn apply_resync(&mut self, registry: &dyn SwitchRegistry, feed: &dyn LinkFeed) -> Dispatch {
        let switches = registry.list_connected_switches();
        let links = feed.current_links();
        let snapshot = self
            .store
            .update(|t| {
                t.replace_graph(switches, links);
                t.clone()
            })
            .await;
        self.full_recompute(&snapshot)
    }

    fn publish(&self, commands: Vec<RuleCommand>) {
        if commands.is_empty() {
            return;
        }
        let count = commands.len();
        if self.commands.send(commands).is_err() {
            error!("Rule pusher is gone, dropping {} command(s)", count);
        }
    }

    /// Applies one event and returns the resulting commands without sending them.
    pub async fn apply(&mut self, event: TopologyEvent) -> Dispatch {
        match event {
            TopologyEvent::SwitchAdded { switch, ports } => {
                info!("Switch s{} added", switch);
                let snapshot = self
                    .store
                    .update(|t| {
                        t.add_switch(switch, ports);
                        t.clone()
                    })
                    .await;
                self.full_recompute(&snapshot)
            }
            TopologyEvent::SwitchRemoved { switch } => {
                info!("Switch s{} removed", switch);
                let (removed, snapshot) = self
                    .store
                    .update(|t| (t.remove_switch(switch), t.clone()))
                    .await;
                if !removed {
                    return Dispatch::none();
                }
                self.routes.forget_switch(switch);
                self.full_recompute(&snapshot)
            }
            TopologyEvent::SwitchPortChanged { switch, port, change } => {
                // link discovery reports the consequences separately
                self.store
                    .update(|t| t.set_port(switch, port, change.enables()))
                    .await;
                Dispatch::none()
            }
            TopologyEvent::LinksUpdated { updates } => self.links_updated(&updates).await,
            TopologyEvent::HostAdded(update) | TopologyEvent::HostIpChanged(update) => {
                self.host_updated(update).await
            }
            TopologyEvent::HostMoved(update) => self.host_moved(update).await,
            TopologyEvent::HostRemoved { device } => self.host_removed(&device).await,
        }
    }

    async fn links_updated(&mut self, updates: &[LinkUpdate]) -> Dispatch {
        let mut switch_links = Vec::new();

        for update in updates {
            if update.is_host_link() {
                // host attachment is tracked through device events
                info!("Link s{}:{} -> host updated", update.src, update.src_port);
                continue;
            }

            info!(
                "Link s{}:{} -> s{}:{} {:?}",
                update.src, update.src_port, update.dst, update.dst_port, update.operation
            );
            switch_links.push((update.link(), update.operation == LinkOperation::Up));
        }

        if switch_links.is_empty() {
            return Dispatch::none();
        }

        let snapshot = self
            .store
            .update(|t| {
                for (link, up) in &switch_links {
                    t.remove_stale_links(link);
                    if *up {
                        t.add_link(*link);
                    } else {
                        t.remove_link(link);
                    }
                }
                t.clone()
            })
            .await;
        self.full_recompute(&snapshot)
    }

    async fn host_updated(&mut self, update: DeviceUpdate) -> Dispatch {
        let Some(ipv4) = update.ipv4 else {
            debug!("Host {} has no IPv4 address", update.device);
            return self.host_removed(&update.device).await;
        };

        let host = Host::new(update.device.clone(), ipv4, update.attachment);
        let (previous, snapshot) = self
            .store
            .update(|t| (t.upsert_host(host.clone()), t.clone()))
            .await;

        let mut commands = Vec::new();
        if let Some(old) = previous {
            if !old.same_location(&host) {
                commands.extend(self.routes.purge_host(old.ipv4, &snapshot.switch_ids()));
                commands.extend(self.reroute_other_holder(old.ipv4, &host.device, &snapshot));
            }
        }
        commands.extend(self.routes.sync_host(&calculate_host_routes(&snapshot, &host)));

        Dispatch {
            scope: RecomputeScope::Host(update.device),
            commands,
        }
    }

    async fn host_moved(&mut self, update: DeviceUpdate) -> Dispatch {
        let (Some(ipv4), Some(attachment)) = (update.ipv4, update.attachment) else {
            return self.host_removed(&update.device).await;
        };
        info!("Host {} moved to {}", update.device, attachment);

        let host = Host::new(update.device.clone(), ipv4, Some(attachment));
        let (previous, snapshot) = self
            .store
            .update(|t| (t.upsert_host(host.clone()), t.clone()))
            .await;

        let mut commands = Vec::new();
        if let Some(old) = previous {
            commands.extend(self.routes.purge_host(old.ipv4, &snapshot.switch_ids()));
            commands.extend(self.reroute_other_holder(old.ipv4, &host.device, &snapshot));
        }
        commands.extend(self.routes.sync_host(&calculate_host_routes(&snapshot, &host)));

        Dispatch {
            scope: RecomputeScope::Host(update.device),
            commands,
        }
    }

    async fn host_removed(&mut self, device: &str) -> Dispatch {
        let (removed, snapshot) = self
            .store
            .update(|t| (t.remove_host(device), t.clone()))
            .await;

        let Some(host) = removed else {
            return Dispatch::none();
        };
        info!("Host {} is no longer routable", host);

        let mut commands = self.routes.purge_host(host.ipv4, &snapshot.switch_ids());
        commands.extend(self.reroute_other_holder(host.ipv4, &host.device, &snapshot));

        Dispatch {
            scope: RecomputeScope::None,
            commands,
        }
    }

    /// Rules are keyed by address, so a purge also wipes any other device
    /// still claiming `ipv4`. Routes it again when one exists.
    fn reroute_other_holder(&mut self, ipv4: Ipv4Addr, device: &str, snapshot: &Topology) -> Vec<RuleCommand> {
        let Some(holder) = snapshot
            .list_hosts()
            .find(|h| h.ipv4 == ipv4 && h.device != device)
        else {
            return Vec::new();
        };
        warn!(
            "{} is also claimed by {}, rerouting it after purging {}",
            ipv4, holder.device, device
        );
        self.routes.sync_host(&calculate_host_routes(snapshot, holder))
    }

    fn full_recompute(&mut self, snapshot: &Topology) -> Dispatch {
        let switches: Vec<SwitchId> = snapshot.switch_ids();
        let hosts: Vec<&Host> = snapshot.list_hosts().collect();
        info!(
            "Full recompute of {} host(s) over {} switch(es), topology generation {} ({})",
            hosts.len(),
            switches.len(),
            snapshot.generation,
            snapshot.updated_at.format("%H:%M:%S%.3f")
        );

        let mut commands = Vec::new();
        for host in &hosts {
            commands.extend(self.routes.purge_host(host.ipv4, &switches));
        }
        for host in &hosts {
            commands.extend(self.routes.sync_host(&calculate_host_routes(snapshot, host)));
        }

        Dispatch {
            scope: RecomputeScope::Full,
            commands,
        }
    }
}
