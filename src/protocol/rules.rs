use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::{PortNo, SwitchId, TableId};

pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// Header fields an action may rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    EthSrc,
    EthDst,
    Ipv4Src,
    Ipv4Dst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    Mac([u8; 6]),
    Ipv4(Ipv4Addr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Output(PortNo),
    SetField(Field, FieldValue),
    GotoTable(TableId),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Output(port) => write!(f, "output:{}", port),
            Action::SetField(field, FieldValue::Ipv4(ip)) => write!(f, "set_{:?}:{}", field, ip),
            Action::SetField(field, FieldValue::Mac(mac)) => write!(
                f,
                "set_{:?}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                field, mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
            ),
            Action::GotoTable(table) => write!(f, "goto_table:{}", table),
        }
    }
}

/// Routing rules always match on IPv4 destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    pub eth_type: u16,
    pub ipv4_dst: Ipv4Addr,
}

impl FlowMatch {
    pub fn ipv4_destination(ip: Ipv4Addr) -> Self {
        Self {
            eth_type: ETH_TYPE_IPV4,
            ipv4_dst: ip,
        }
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eth_type=0x{:04x},ipv4_dst={}", self.eth_type, self.ipv4_dst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    pub table: TableId,
    pub priority: u16,
    pub flow_match: FlowMatch,
    pub actions: Vec<Action>,
    pub idle_timeout: Option<u16>,
}

impl FlowRule {
    pub fn output_port(&self) -> Option<PortNo> {
        self.actions.iter().find_map(|action| match action {
            Action::Output(port) => Some(*port),
            _ => None,
        })
    }
}

/// One command for the switch-programming transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RuleCommand {
    Install { switch: SwitchId, rule: FlowRule },
    Remove { switch: SwitchId, table: TableId, flow_match: FlowMatch },
}

impl RuleCommand {
    pub fn switch(&self) -> SwitchId {
        match self {
            RuleCommand::Install { switch, .. } | RuleCommand::Remove { switch, .. } => *switch,
        }
    }

    pub fn destination(&self) -> Ipv4Addr {
        match self {
            RuleCommand::Install { rule, .. } => rule.flow_match.ipv4_dst,
            RuleCommand::Remove { flow_match, .. } => flow_match.ipv4_dst,
        }
    }

    pub fn is_install(&self) -> bool {
        matches!(self, RuleCommand::Install { .. })
    }
}

impl fmt::Display for RuleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCommand::Install { switch, rule } => {
                let actions: Vec<String> = rule.actions.iter().map(|a| a.to_string()).collect();
                write!(
                    f,
                    "install s{} table {} prio {} [{}] -> [{}]",
                    switch,
                    rule.table,
                    rule.priority,
                    rule.flow_match,
                    actions.join(",")
                )
            }
            RuleCommand::Remove { switch, table, flow_match } => {
                write!(f, "remove s{} table {} [{}]", switch, table, flow_match)
            }
        }
    }
}
