use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use super::rules::{Action, FlowMatch, FlowRule, RuleCommand};
use crate::config::RoutingConfig;
use crate::routing_table::HostRoutes;
use crate::{PortNo, SwitchId, TableId};

/// Turns computed host routes into install/remove commands.
///
/// Keeps a shadow of what it believes each switch holds per destination IP so
/// that an unchanged route produces no command at all. At most one rule per
/// (switch, destination) is ever tracked.
#[derive(Debug)]
pub struct RouteManager {
    table: TableId,
    priority: u16,
    idle_timeout: Option<u16>,
    installed: HashMap<Ipv4Addr, BTreeMap<SwitchId, PortNo>>,
}

impl RouteManager {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            table: config.table,
            priority: config.priority,
            idle_timeout: config.idle_timeout,
            installed: HashMap::new(),
        }
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn installed_port(&self, switch: SwitchId, ip: Ipv4Addr) -> Option<PortNo> {
        self.installed.get(&ip).and_then(|rules| rules.get(&switch)).copied()
    }

    pub fn installed_count(&self) -> usize {
        self.installed.values().map(|rules| rules.len()).sum()
    }

    fn install(&self, switch: SwitchId, ip: Ipv4Addr, port: PortNo) -> RuleCommand {
        RuleCommand::Install {
            switch,
            rule: FlowRule {
                table: self.table,
                priority: self.priority,
                flow_match: FlowMatch::ipv4_destination(ip),
                actions: vec![Action::Output(port)],
                idle_timeout: self.idle_timeout,
            },
        }
    }

    fn remove(&self, switch: SwitchId, ip: Ipv4Addr) -> RuleCommand {
        RuleCommand::Remove {
            switch,
            table: self.table,
            flow_match: FlowMatch::ipv4_destination(ip),
        }
    }

    /// Commands bringing the switches in line with `routes`.
    pub fn sync_host(&mut self, routes: &HostRoutes) -> Vec<RuleCommand> {
        let ip = routes.ipv4;
        let mut current = self.installed.remove(&ip).unwrap_or_default();
        let mut commands = Vec::new();

        for (switch, entry) in &routes.entries {
            match entry.port() {
                Some(port) if current.get(switch) == Some(&port) => {
                    debug!("s{} already forwards {} to port {}", switch, ip, port);
                }
                Some(port) => {
                    commands.push(self.install(*switch, ip, port));
                    current.insert(*switch, port);
                }
                None => {
                    if current.remove(switch).is_some() {
                        debug!("{} unreachable from s{}, removing rule", ip, switch);
                        commands.push(self.remove(*switch, ip));
                    }
                }
            }
        }

        // switches gone from the snapshot took their tables with them
        current.retain(|switch, _| routes.entries.contains_key(switch));
        if !current.is_empty() {
            self.installed.insert(ip, current);
        }

        if !commands.is_empty() {
            info!("Host {} ({}): {} rule change(s)", routes.device, ip, commands.len());
        }
        commands
    }

    /// Removes every rule for `ip` from each of `switches`.
    pub fn purge_host(&mut self, ip: Ipv4Addr, switches: &[SwitchId]) -> Vec<RuleCommand> {
        self.installed.remove(&ip);
        debug!("Purging rules for {} on {} switch(es)", ip, switches.len());
        switches.iter().map(|switch| self.remove(*switch, ip)).collect()
    }

    pub fn forget_switch(&mut self, switch: SwitchId) {
        self.installed.retain(|_, rules| {
            rules.remove(&switch);
            !rules.is_empty()
        });
    }

    /// Drops the shadow entirely, e.g. after a full resync.
    pub fn reset(&mut self) {
        self.installed.clear();
    }
}
