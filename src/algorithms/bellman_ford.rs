use log::{debug, warn};
use std::collections::BTreeMap;

use crate::network::{Host, Link, Topology};
use crate::routing_table::{HostRoutes, RouteEntry};
use crate::{PortNo, SwitchId};

const INFINITY: u32 = u32::MAX;

/// Least-hop route from every switch of `topology` toward `host`.
///
/// Unit-cost Bellman-Ford: at most `|switches| - 1` relaxation rounds over the
/// links in discovery order, stopping early once a round changes nothing. A
/// switch keeps the first link that relaxed it, ties never overwrite, so the
/// result is stable across runs on the same topology.
pub fn calculate_host_routes(topology: &Topology, host: &Host) -> HostRoutes {
    let mut routes = HostRoutes {
        device: host.device.clone(),
        ipv4: host.ipv4,
        entries: topology
            .switch_ids()
            .into_iter()
            .map(|id| (id, RouteEntry::UNREACHABLE))
            .collect(),
    };

    let Some(attachment) = host.attachment else {
        debug!("Host {} is detached, no routes", host.device);
        return routes;
    };

    if !topology.contains_switch(attachment.switch) {
        debug!(
            "Host {} attached to unknown switch s{}, no routes",
            host.device, attachment.switch
        );
        return routes;
    }

    let links = usable_links(topology);
    let (distances, next_ports) = relax(topology, &links, attachment.switch);

    for (switch, entry) in routes.entries.iter_mut() {
        if *switch == attachment.switch {
            *entry = RouteEntry::output(0, attachment.port);
            continue;
        }

        let distance = distances.get(switch).copied().unwrap_or(INFINITY);
        if distance == INFINITY {
            continue;
        }
        if let Some(port) = next_ports.get(switch) {
            *entry = RouteEntry::output(distance, *port);
        }
    }

    routes
}

/// Links whose both ends are known switches. Dangling ones are skipped.
fn usable_links(topology: &Topology) -> Vec<Link> {
    topology
        .list_links()
        .iter()
        .filter(|link| {
            let known = topology.contains_switch(link.src) && topology.contains_switch(link.dst);
            if !known {
                warn!("Skipping link {} with unknown endpoint", link);
            }
            known
        })
        .copied()
        .collect()
}

fn relax(
    topology: &Topology,
    links: &[Link],
    destination: SwitchId,
) -> (BTreeMap<SwitchId, u32>, BTreeMap<SwitchId, PortNo>) {
    let mut distances: BTreeMap<SwitchId, u32> = topology
        .switch_ids()
        .into_iter()
        .map(|id| (id, if id == destination { 0 } else { INFINITY }))
        .collect();
    let mut next_ports: BTreeMap<SwitchId, PortNo> = BTreeMap::new();

    let rounds = distances.len().saturating_sub(1);
    for round in 0..rounds {
        let mut changed = false;

        for link in links {
            // link u -> v: v can reach the destination through u, leaving via v's end of the link
            let via = distances[&link.src];
            if via == INFINITY {
                continue;
            }
            if via + 1 < distances[&link.dst] {
                distances.insert(link.dst, via + 1);
                next_ports.insert(link.dst, link.dst_port);
                changed = true;
            }
        }

        if !changed {
            debug!("Relaxation converged after {} round(s)", round + 1);
            break;
        }
    }

    (distances, next_ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::AttachmentPoint;
    use crate::routing_table::NextHop;
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;

    fn bidirectional(topo: &mut Topology, a: SwitchId, a_port: PortNo, b: SwitchId, b_port: PortNo) {
        topo.add_link(Link::new(a, a_port, b, b_port));
        topo.add_link(Link::new(b, b_port, a, a_port));
    }

    /// s1:1 <-> s2:1, s2:2 <-> s3:1
    fn line() -> Topology {
        let mut topo = Topology::new();
        for id in 1..=3 {
            topo.add_switch(id, BTreeSet::from([1, 2, 3]));
        }
        bidirectional(&mut topo, 1, 1, 2, 1);
        bidirectional(&mut topo, 2, 2, 3, 1);
        topo
    }

    fn host_at(switch: SwitchId, port: PortNo) -> Host {
        Host::new("h1", Ipv4Addr::new(10, 0, 0, 1), Some(AttachmentPoint { switch, port }))
    }

    #[test]
    fn test_line_topology() {
        let topo = line();
        let routes = calculate_host_routes(&topo, &host_at(3, 3));

        assert_eq!(routes.entry(3), RouteEntry::output(0, 3));
        assert_eq!(routes.entry(2), RouteEntry::output(1, 2));
        assert_eq!(routes.entry(1), RouteEntry::output(2, 1));
    }

    #[test]
    fn test_line_topology_mirrored() {
        let topo = line();
        let routes = calculate_host_routes(&topo, &host_at(1, 3));

        assert_eq!(routes.entry(1), RouteEntry::output(0, 3));
        assert_eq!(routes.entry(2), RouteEntry::output(1, 1));
        assert_eq!(routes.entry(3), RouteEntry::output(2, 1));
    }

    #[test]
    fn test_disconnected_switch_is_unreachable() {
        let mut topo = line();
        topo.add_switch(4, BTreeSet::from([1]));

        let routes = calculate_host_routes(&topo, &host_at(3, 3));
        assert_eq!(routes.entry(4).next_hop, NextHop::Unreachable);
        assert_eq!(routes.unreachable().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_dangling_link_is_skipped() {
        let mut topo = line();
        topo.add_link(Link::new(9, 1, 1, 2));

        let routes = calculate_host_routes(&topo, &host_at(3, 3));
        assert_eq!(routes.entry(1), RouteEntry::output(2, 1));
        assert!(!routes.entries.contains_key(&9));
    }

    #[test]
    fn test_host_on_unknown_switch() {
        let topo = line();
        let routes = calculate_host_routes(&topo, &host_at(7, 1));
        assert_eq!(routes.reachable().count(), 0);
        assert_eq!(routes.entries.len(), 3);
    }

    #[test]
    fn test_detached_host() {
        let topo = line();
        let host = Host::new("h1", Ipv4Addr::new(10, 0, 0, 1), None);
        assert_eq!(calculate_host_routes(&topo, &host).reachable().count(), 0);
    }

    #[test]
    fn test_equal_cost_keeps_first_relaxing_link() {
        // square: s1-s2, s1-s3, s2-s4, s3-s4
        let mut topo = Topology::new();
        for id in 1..=4 {
            topo.add_switch(id, BTreeSet::from([1, 2, 3]));
        }
        bidirectional(&mut topo, 1, 1, 2, 1);
        bidirectional(&mut topo, 1, 2, 3, 1);
        bidirectional(&mut topo, 2, 2, 4, 1);
        bidirectional(&mut topo, 3, 2, 4, 2);

        let host = host_at(4, 3);
        let first = calculate_host_routes(&topo, &host);
        assert_eq!(first.entry(1), RouteEntry::output(2, 1));

        let second = calculate_host_routes(&topo, &host);
        assert_eq!(first, second);
    }

    #[test]
    fn test_routes_lie_on_existing_edges() {
        let topo = line();
        let host = host_at(3, 3);
        let routes = calculate_host_routes(&topo, &host);

        for (switch, port) in routes.reachable() {
            let entry = routes.entry(switch);
            if entry.is_terminal() {
                assert_eq!(port, host.attachment.unwrap().port);
            } else {
                assert!(
                    topo.list_links()
                        .iter()
                        .any(|l| l.dst == switch && l.dst_port == port)
                );
            }
        }
    }
}
